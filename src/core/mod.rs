pub mod action;
pub mod lib;
pub mod session;

pub use self::action::{
    Action, ActionError, ActionPlan, DecodeError, MouseButton, TurnDirection,
};
pub use self::lib::{InputDriver, MarionetteError, MarionetteResult, Translator};
pub use self::session::{LogEvent, LogSink, Session};
