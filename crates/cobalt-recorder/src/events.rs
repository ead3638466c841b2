//! Recorded event types
//!
//! Events serialize to flat JSON objects tagged by `type`:
//! `{"type":"Move","x":10,"y":20,"ts":1700000000000}` and
//! `{"type":"Click","x":10,"y":20,"ts":...,"button":0,"pressed":true}`.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A named recording - metadata plus the captured events in temporal order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub events: Vec<Event>,
}

impl Recording {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            events: Vec::new(),
        }
    }

    /// Wall-clock span between the first and last event
    pub fn span(&self) -> Duration {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => delay_between(first, last),
            _ => Duration::ZERO,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Single event - absolute screen coordinates and epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    Move {
        x: i32,
        y: i32,
        ts: i64,
    },
    /// `button` is the raw code (see [`ButtonId::code`]); codes other than
    /// left/right are kept as captured and normalized at replay time.
    Click {
        x: i32,
        y: i32,
        ts: i64,
        button: u8,
        pressed: bool,
    },
}

impl Event {
    pub fn ts(&self) -> i64 {
        match *self {
            Event::Move { ts, .. } | Event::Click { ts, .. } => ts,
        }
    }

    pub fn position(&self) -> (i32, i32) {
        match *self {
            Event::Move { x, y, .. } | Event::Click { x, y, .. } => (x, y),
        }
    }
}

/// Delay between two events, clamped to zero when `next` is older than `prev`
pub fn delay_between(prev: &Event, next: &Event) -> Duration {
    let ms = next.ts().saturating_sub(prev.ts());
    Duration::from_millis(ms.max(0) as u64)
}

/// Pointer movement needed to go from `prev` to `next`
pub fn delta(prev: &Event, next: &Event) -> (i32, i32) {
    let (x0, y0) = prev.position();
    let (x1, y1) = next.position();
    (x1.wrapping_sub(x0), y1.wrapping_sub(y0))
}

/// Mouse button as understood by playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonId {
    Left,
    Right,
    Middle,
}

impl ButtonId {
    pub const LEFT_CODE: u8 = 0;
    pub const RIGHT_CODE: u8 = 1;
    pub const MIDDLE_CODE: u8 = 2;
    /// Extra buttons reported by the OS are numbered from here upward
    pub const EXTRA_BASE: u8 = 3;

    pub fn code(self) -> u8 {
        match self {
            ButtonId::Left => Self::LEFT_CODE,
            ButtonId::Right => Self::RIGHT_CODE,
            ButtonId::Middle => Self::MIDDLE_CODE,
        }
    }

    /// Anything that is not left or right replays as middle
    pub fn from_code(code: u8) -> Self {
        match code {
            Self::LEFT_CODE => ButtonId::Left,
            Self::RIGHT_CODE => ButtonId::Right,
            _ => ButtonId::Middle,
        }
    }
}

impl fmt::Display for ButtonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ButtonId::Left => "left",
            ButtonId::Right => "right",
            ButtonId::Middle => "middle",
        };
        f.write_str(s)
    }
}

impl FromStr for ButtonId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(ButtonId::Left),
            "right" => Ok(ButtonId::Right),
            "middle" | "center" => Ok(ButtonId::Middle),
            other => Err(Error::invalid_config(format!(
                "Unknown button {:?} (expected left, right or middle)",
                other
            ))),
        }
    }
}
