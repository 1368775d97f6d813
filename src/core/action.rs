use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One primitive input-automation instruction, as the model emits it.
/// The wire discriminant is `"type"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    PressKey {
        key: String,
        duration: f64,
    },
    TypeText {
        text: String,
    },
    Click {
        button: MouseButton,
        clicks: u32,
        interval: f64,
    },
    TurnWithKeys {
        direction: TurnDirection,
        duration: f64,
    },
    MoveMouseRelative {
        x_offset: i32,
        y_offset: i32,
        duration: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnDirection {
    Left,
    Right,
}

const KINDS: [&str; 5] = [
    "press_key",
    "type_text",
    "click",
    "turn_with_keys",
    "move_mouse_relative",
];

impl Action {
    /// Decode a single raw action document. A bad document invalidates only
    /// itself, never the surrounding plan.
    pub fn decode(value: &Value) -> Result<Self, DecodeError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| DecodeError::Invalid("missing \"type\" discriminant".to_string()))?;
        if !KINDS.contains(&kind) {
            return Err(DecodeError::UnknownKind(kind.to_string()));
        }
        let action: Action = serde_json::from_value(value.clone())
            .map_err(|e| DecodeError::Invalid(e.to_string()))?;
        action.check_ranges()?;
        Ok(action)
    }

    fn check_ranges(&self) -> Result<(), DecodeError> {
        match self {
            Action::PressKey { duration, .. }
            | Action::TurnWithKeys { duration, .. }
            | Action::MoveMouseRelative { duration, .. } => {
                if *duration < 0.0 {
                    return Err(DecodeError::Invalid(format!(
                        "duration must be >= 0 (got {})",
                        duration
                    )));
                }
            }
            Action::Click { clicks, interval, .. } => {
                if *clicks < 1 {
                    return Err(DecodeError::Invalid(format!(
                        "clicks must be >= 1 (got {})",
                        clicks
                    )));
                }
                if *interval < 0.0 {
                    return Err(DecodeError::Invalid(format!(
                        "interval must be >= 0 (got {})",
                        interval
                    )));
                }
            }
            Action::TypeText { .. } => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Discriminant names no supported action kind; skipped with a warning.
    UnknownKind(String),
    /// A required field is missing, mistyped, or out of range.
    Invalid(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::UnknownKind(kind) => write!(f, "unknown action type '{}'", kind),
            DecodeError::Invalid(msg) => write!(f, "{}", msg),
        }
    }
}

/// Per-action failure collected by the executor; never aborts the plan.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionError {
    Invalid(String),
    Failed(String),
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ActionError::Invalid(msg) => write!(f, "invalid action: {}", msg),
            ActionError::Failed(msg) => write!(f, "action failed: {}", msg),
        }
    }
}

/// Ordered sequence of raw action documents from one model response.
/// Elements stay undecoded so each is validated independently at
/// execution time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionPlan {
    pub actions: Vec<Value>,
}

impl ActionPlan {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
