//! Platform abstraction layer
//!
//! The engine talks to the OS through [`InputBackend`]: a subscription to
//! raw mouse notifications for capture, and an [`InputEmitter`] for
//! synthesizing input during playback.

mod inject;

#[cfg(any(target_os = "macos", target_os = "windows"))]
mod hook;
#[cfg(any(target_os = "macos", target_os = "windows", test))]
mod slot;

pub use inject::EnigoEmitter;

use crate::error::Result;
use crate::events::ButtonId;
use crossbeam_channel::Receiver;
use std::time::SystemTime;

/// Mouse notification as delivered by the OS hook
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawInput {
    Moved {
        x: f64,
        y: f64,
        at: SystemTime,
    },
    /// Button transition at the last known pointer position
    Button {
        x: f64,
        y: f64,
        button: u8,
        pressed: bool,
        at: SystemTime,
    },
}

impl RawInput {
    pub fn at(&self) -> SystemTime {
        match *self {
            RawInput::Moved { at, .. } | RawInput::Button { at, .. } => at,
        }
    }
}

/// Receiving end of the OS notification stream
///
/// Dropping the subscription releases the hook so another capture can
/// subscribe.
pub struct Subscription {
    events: Receiver<RawInput>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(events: Receiver<RawInput>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            events,
            release: Some(Box::new(release)),
        }
    }

    pub fn receiver(&self) -> &Receiver<RawInput> {
        &self.events
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Synthesizes OS-level pointer input
pub trait InputEmitter {
    /// Absolute positioning
    fn move_to(&mut self, x: i32, y: i32) -> Result<()>;
    /// Relative motion from the current pointer position
    fn move_by(&mut self, dx: i32, dy: i32) -> Result<()>;
    fn button(&mut self, button: ButtonId, pressed: bool) -> Result<()>;
}

/// Source of capture subscriptions and playback emitters
pub trait InputBackend: Send + Sync {
    /// Register with the OS notification stream. Fails fast with
    /// `CaptureUnavailable`; never retries.
    fn subscribe(&self) -> Result<Subscription>;

    /// Create an emitter. Called on the playback worker thread, so the
    /// emitter itself need not be `Send`.
    fn emitter(&self) -> Result<Box<dyn InputEmitter>>;
}

/// Global rdev hook for capture, enigo for playback
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

impl InputBackend for NativeBackend {
    #[cfg(any(target_os = "macos", target_os = "windows"))]
    fn subscribe(&self) -> Result<Subscription> {
        hook::subscribe()
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    fn subscribe(&self) -> Result<Subscription> {
        Err(crate::error::Error::capture_unavailable(
            "Global mouse capture is not supported on this platform",
        ))
    }

    fn emitter(&self) -> Result<Box<dyn InputEmitter>> {
        Ok(Box::new(EnigoEmitter::new()?))
    }
}

/// Backend whose emitter only logs; capture is delegated to the native hook
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunBackend;

impl InputBackend for DryRunBackend {
    fn subscribe(&self) -> Result<Subscription> {
        NativeBackend.subscribe()
    }

    fn emitter(&self) -> Result<Box<dyn InputEmitter>> {
        Ok(Box::new(LogEmitter::default()))
    }
}

/// Emitter that only logs actions and touches no OS state
#[derive(Debug, Default)]
pub struct LogEmitter {
    pub actions: usize,
}

impl InputEmitter for LogEmitter {
    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        self.actions += 1;
        tracing::info!(x, y, "dry-run: move to");
        Ok(())
    }

    fn move_by(&mut self, dx: i32, dy: i32) -> Result<()> {
        self.actions += 1;
        tracing::info!(dx, dy, "dry-run: move by");
        Ok(())
    }

    fn button(&mut self, button: ButtonId, pressed: bool) -> Result<()> {
        self.actions += 1;
        tracing::info!(%button, pressed, "dry-run: button");
        Ok(())
    }
}
