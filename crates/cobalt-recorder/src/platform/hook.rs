//! Global mouse hook via rdev
//!
//! `rdev::listen` installs the OS hook and never returns while it is
//! healthy, so the hook lives on its own thread for the rest of the
//! process. At most one subscriber receives notifications at a time. If
//! the hook ever exits, the active capture's stream closes and every later
//! subscription fails.

use super::slot::SubscriberSlot;
use super::{RawInput, Subscription};
use crate::error::{Error, Result};
use crate::events::ButtonId;
use crossbeam_channel::{bounded, RecvTimeoutError};
use parking_lot::{const_mutex, Mutex};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// How long to wait for `rdev::listen` to report a registration failure
const STARTUP_GRACE: Duration = Duration::from_millis(150);

static SLOT: SubscriberSlot = SubscriberSlot::new();
static POINTER: Mutex<(f64, f64)> = const_mutex((0.0, 0.0));
static LISTENER: OnceLock<std::result::Result<(), String>> = OnceLock::new();

pub fn subscribe() -> Result<Subscription> {
    ensure_listener()?;
    SLOT.subscribe()
}

fn ensure_listener() -> Result<()> {
    let status = LISTENER.get_or_init(|| {
        let (err_tx, err_rx) = bounded::<String>(1);

        let spawned = thread::Builder::new()
            .name("cobalt-input-hook".into())
            .spawn(move || {
                let reason = match rdev::listen(forward) {
                    Ok(()) => "input hook exited".to_string(),
                    Err(e) => format!("{:?}", e),
                };
                tracing::error!(%reason, "input hook stopped");
                SLOT.close(reason.clone());
                let _ = err_tx.send(reason);
            });

        if let Err(e) = spawned {
            return Err(format!("failed to spawn hook thread: {}", e));
        }

        match err_rx.recv_timeout(STARTUP_GRACE) {
            Err(RecvTimeoutError::Timeout) => {
                tracing::info!("global input hook installed");
                Ok(())
            }
            Ok(reason) => Err(reason),
            Err(RecvTimeoutError::Disconnected) => Err("input hook exited".to_string()),
        }
    });

    status
        .clone()
        .map_err(|reason| Error::capture_unavailable(format!("Input hook unavailable: {}", reason)))
}

fn forward(event: rdev::Event) {
    let raw = match event.event_type {
        rdev::EventType::MouseMove { x, y } => {
            *POINTER.lock() = (x, y);
            RawInput::Moved { x, y, at: event.time }
        }
        rdev::EventType::ButtonPress(button) => button_input(button, true, event.time),
        rdev::EventType::ButtonRelease(button) => button_input(button, false, event.time),
        _ => return,
    };

    SLOT.send(raw);
}

fn button_input(button: rdev::Button, pressed: bool, at: std::time::SystemTime) -> RawInput {
    let (x, y) = *POINTER.lock();
    RawInput::Button {
        x,
        y,
        button: button_code(button),
        pressed,
        at,
    }
}

fn button_code(button: rdev::Button) -> u8 {
    match button {
        rdev::Button::Left => ButtonId::LEFT_CODE,
        rdev::Button::Right => ButtonId::RIGHT_CODE,
        rdev::Button::Middle => ButtonId::MIDDLE_CODE,
        rdev::Button::Unknown(n) => ButtonId::EXTRA_BASE.saturating_add(n),
    }
}
