//! Input synthesis via enigo

use super::InputEmitter;
use crate::error::{Error, Result};
use crate::events::ButtonId;
use enigo::{Button, Coordinate, Direction, Enigo, Mouse, Settings};

pub struct EnigoEmitter {
    enigo: Enigo,
}

impl EnigoEmitter {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default()).map_err(|e| {
            Error::playback_unavailable(format!("Failed to connect input emitter: {}", e))
        })?;
        Ok(Self { enigo })
    }
}

impl InputEmitter for EnigoEmitter {
    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| Error::emit_failed("move_to", e))
    }

    fn move_by(&mut self, dx: i32, dy: i32) -> Result<()> {
        self.enigo
            .move_mouse(dx, dy, Coordinate::Rel)
            .map_err(|e| Error::emit_failed("move_by", e))
    }

    fn button(&mut self, button: ButtonId, pressed: bool) -> Result<()> {
        let btn = match button {
            ButtonId::Left => Button::Left,
            ButtonId::Right => Button::Right,
            ButtonId::Middle => Button::Middle,
        };
        let direction = if pressed {
            Direction::Press
        } else {
            Direction::Release
        };
        self.enigo
            .button(btn, direction)
            .map_err(|e| Error::emit_failed("button", e))
    }
}
