use crate::core::{InputDriver, MarionetteError, MarionetteResult, MouseButton};
use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use std::thread;
use std::time::Duration;

/// enigo has no paced movement, so glides interpolate over ~16 ms ticks.
const GLIDE_TICK: Duration = Duration::from_millis(16);

pub struct EnigoDriver {
    enigo: Enigo,
}

impl EnigoDriver {
    pub fn new() -> MarionetteResult<Self> {
        let enigo = Enigo::new(&Settings::default()).map_err(|e| {
            MarionetteError::ExecutionError(format!("Failed to initialise the input backend: {}", e))
        })?;
        Ok(Self { enigo })
    }

    fn glide(&mut self, dx: i32, dy: i32, duration: Duration) -> MarionetteResult<()> {
        let ticks = (duration.as_secs_f64() / GLIDE_TICK.as_secs_f64())
            .ceil()
            .max(1.0) as i32;
        let mut moved_x = 0;
        let mut moved_y = 0;
        for i in 1..=ticks {
            let target_x = (dx as f64 * i as f64 / ticks as f64).round() as i32;
            let target_y = (dy as f64 * i as f64 / ticks as f64).round() as i32;
            self.enigo
                .move_mouse(target_x - moved_x, target_y - moved_y, Coordinate::Rel)
                .map_err(input_err)?;
            moved_x = target_x;
            moved_y = target_y;
            if i < ticks {
                thread::sleep(GLIDE_TICK);
            }
        }
        Ok(())
    }
}

impl InputDriver for EnigoDriver {
    fn key_down(&mut self, key: &str) -> MarionetteResult<()> {
        self.enigo
            .key(parse_key(key)?, Direction::Press)
            .map_err(input_err)
    }

    fn key_up(&mut self, key: &str) -> MarionetteResult<()> {
        self.enigo
            .key(parse_key(key)?, Direction::Release)
            .map_err(input_err)
    }

    fn type_text(&mut self, text: &str, per_char_delay: Duration) -> MarionetteResult<()> {
        let mut chars = text.chars().peekable();
        while let Some(ch) = chars.next() {
            self.enigo.text(&ch.to_string()).map_err(input_err)?;
            if chars.peek().is_some() {
                thread::sleep(per_char_delay);
            }
        }
        Ok(())
    }

    fn click(&mut self, button: MouseButton, count: u32, interval: Duration) -> MarionetteResult<()> {
        let button = match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
        };
        for i in 0..count {
            self.enigo.button(button, Direction::Click).map_err(input_err)?;
            if i + 1 < count {
                thread::sleep(interval);
            }
        }
        Ok(())
    }

    fn move_relative(&mut self, dx: i32, dy: i32, duration: Duration) -> MarionetteResult<()> {
        self.glide(dx, dy, duration)
    }

    fn drag_relative(&mut self, dx: i32, dy: i32, duration: Duration) -> MarionetteResult<()> {
        // The button must come back up even if the glide fails mid-way.
        self.enigo
            .button(Button::Left, Direction::Press)
            .map_err(input_err)?;
        let moved = self.glide(dx, dy, duration);
        let released = self
            .enigo
            .button(Button::Left, Direction::Release)
            .map_err(input_err);
        moved.and(released)
    }

    fn move_absolute(&mut self, x: i32, y: i32, duration: Duration) -> MarionetteResult<()> {
        let (cx, cy) = self.position()?;
        self.glide(x - cx, y - cy, duration)?;
        // settle on the exact target; the glide rounds per tick
        self.enigo.move_mouse(x, y, Coordinate::Abs).map_err(input_err)
    }

    fn position(&mut self) -> MarionetteResult<(i32, i32)> {
        self.enigo.location().map_err(input_err)
    }
}

/// Key names as the prompt teaches them to the model (pyautogui-style).
fn parse_key(name: &str) -> MarionetteResult<Key> {
    let key = match name.to_lowercase().as_str() {
        "space" => Key::Space,
        "shift" => Key::Shift,
        "ctrl" | "control" => Key::Control,
        "alt" => Key::Alt,
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "esc" | "escape" => Key::Escape,
        "backspace" => Key::Backspace,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        other => match other.chars().next() {
            Some(ch) if other.chars().count() == 1 => Key::Unicode(ch),
            _ => {
                return Err(MarionetteError::ExecutionError(format!(
                    "unsupported key name: '{}'",
                    name
                )))
            }
        },
    };
    Ok(key)
}

fn input_err(e: enigo::InputError) -> MarionetteError {
    MarionetteError::ExecutionError(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_keys_map_to_enigo_keys() {
        assert_eq!(parse_key("space").unwrap(), Key::Space);
        assert_eq!(parse_key("SHIFT").unwrap(), Key::Shift);
        assert_eq!(parse_key("left").unwrap(), Key::LeftArrow);
        assert_eq!(parse_key("right").unwrap(), Key::RightArrow);
        assert_eq!(parse_key("enter").unwrap(), Key::Return);
        assert_eq!(parse_key("esc").unwrap(), Key::Escape);
    }

    #[test]
    fn single_characters_map_to_unicode_keys() {
        assert_eq!(parse_key("w").unwrap(), Key::Unicode('w'));
        assert_eq!(parse_key("E").unwrap(), Key::Unicode('e'));
        assert_eq!(parse_key("7").unwrap(), Key::Unicode('7'));
    }

    #[test]
    fn unsupported_key_names_are_rejected() {
        assert!(parse_key("hyperspace").is_err());
        assert!(parse_key("").is_err());
    }
}
