pub mod terminal;

pub use self::terminal::MarionetteTerminal;
