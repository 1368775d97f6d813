pub mod executor;
pub mod input;
pub mod pipeline;
pub mod translator;

pub use self::executor::{ActionExecutor, ExecutionReport, PointerStrategy};
pub use self::input::EnigoDriver;
pub use self::translator::GeminiTranslator;
