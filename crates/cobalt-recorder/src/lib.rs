//! cobalt-recorder - Mouse recording and playback
//!
//! Captures global mouse moves and button transitions with millisecond
//! timestamps, persists them as named recordings, and replays them by
//! synthesizing the same input with the original relative timing.
//!
//! ## Platform Support
//!
//! - **macOS / Windows**: capture via a global rdev hook, playback via enigo
//! - **Linux**: playback only; capture reports `CaptureUnavailable`

pub mod engine;
pub mod error;
pub mod events;
pub mod platform;
pub mod recorder;
pub mod replay;
pub mod storage;

pub use engine::{Engine, EngineConfig, EngineStatus, Notification, PlaybackHandle, PlaybackState};
pub use error::{Error, ErrorCode, Result};
pub use events::*;
pub use platform::{DryRunBackend, InputBackend, InputEmitter, NativeBackend};
pub use recorder::{CaptureConfig, CaptureListener};
pub use replay::{plan, CancelToken, PlaybackReport, ReplayConfig, Replayer};
pub use storage::{CatalogEntry, SessionStore};

pub mod prelude {
    pub use crate::engine::{Engine, EngineConfig, EngineStatus, Notification, PlaybackHandle};
    pub use crate::error::{Error, ErrorCode};
    pub use crate::events::*;
    pub use crate::platform::{DryRunBackend, InputBackend, NativeBackend};
    pub use crate::recorder::CaptureConfig;
    pub use crate::replay::{PlaybackReport, ReplayConfig};
    pub use crate::storage::{CatalogEntry, SessionStore};
}
