use std::error::Error;
use std::fmt;
use std::time::Duration;

use crate::core::action::{ActionPlan, MouseButton};

#[async_trait::async_trait]
pub trait Translator {
    async fn translate<'a>(&'a self, command: &'a str) -> MarionetteResult<ActionPlan>;
}

/// Narrow seam over the OS input-injection primitives, so the executor can
/// run against a recording mock in tests.
pub trait InputDriver {
    fn key_down(&mut self, key: &str) -> MarionetteResult<()>;
    fn key_up(&mut self, key: &str) -> MarionetteResult<()>;
    fn type_text(&mut self, text: &str, per_char_delay: Duration) -> MarionetteResult<()>;
    fn click(&mut self, button: MouseButton, count: u32, interval: Duration) -> MarionetteResult<()>;
    fn move_relative(&mut self, dx: i32, dy: i32, duration: Duration) -> MarionetteResult<()>;
    fn drag_relative(&mut self, dx: i32, dy: i32, duration: Duration) -> MarionetteResult<()>;
    fn move_absolute(&mut self, x: i32, y: i32, duration: Duration) -> MarionetteResult<()>;
    fn position(&mut self) -> MarionetteResult<(i32, i32)>;
}

#[derive(Debug)]
pub enum MarionetteError {
    InputError(String),
    ModelSelectionError(String),
    TranslationError(String),
    ExecutionError(String),
}

impl fmt::Display for MarionetteError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MarionetteError::InputError(msg) => write!(f, "Input error: {}", msg),
            MarionetteError::ModelSelectionError(msg) => {
                write!(f, "Model selection error: {}", msg)
            }
            MarionetteError::TranslationError(msg) => write!(f, "Translation error: {}", msg),
            MarionetteError::ExecutionError(msg) => write!(f, "Execution error: {}", msg),
        }
    }
}

impl Error for MarionetteError {}

pub type MarionetteResult<T> = Result<T, MarionetteError>;
