//! Capture listener - turns OS mouse notifications into recorded events
//!
//! The listener owns no timer. It reacts to notifications from a
//! [`Subscription`] and blocks the calling thread until the stop gesture
//! or an external stop request, so it runs on a dedicated worker.

use crate::error::{Error, Result};
use crate::events::{ButtonId, Event};
use crate::platform::{RawInput, Subscription};
use chrono::{DateTime, Utc};
use crossbeam_channel::{select, Receiver};
use std::time::SystemTime;

/// Capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Pressing this button ends the capture and is not recorded
    pub stop_button: ButtonId,
    /// Drop moves closer than this many pixels to the last recorded move.
    /// Zero records every notification.
    pub min_move_distance: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            stop_button: ButtonId::Right,
            min_move_distance: 0.0,
        }
    }
}

impl CaptureConfig {
    pub fn stop_button(mut self, button: ButtonId) -> Self {
        self.stop_button = button;
        self
    }

    pub fn min_move_distance(mut self, pixels: f64) -> Self {
        self.min_move_distance = pixels;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.min_move_distance.is_finite() || self.min_move_distance < 0.0 {
            return Err(Error::invalid_config(format!(
                "min_move_distance must be a non-negative number, got {}",
                self.min_move_distance
            )));
        }
        Ok(())
    }
}

/// What the event consumer wants after each recorded event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing,
    Stopped,
}

/// Outcome of feeding one notification to the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Ignored,
    Recorded(Event),
    StopGesture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured stop button was pressed
    Gesture,
    /// The consumer or the control surface asked to stop
    Requested,
}

pub struct CaptureListener {
    config: CaptureConfig,
    state: CaptureState,
    last_ts: Option<i64>,
    last_move: Option<(f64, f64)>,
}

impl CaptureListener {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            state: CaptureState::Idle,
            last_ts: None,
            last_move: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Idle -> Capturing. Has no effect once stopped.
    pub fn record(&mut self) {
        if self.state == CaptureState::Idle {
            self.state = CaptureState::Capturing;
        }
    }

    /// Apply one notification to the state machine
    pub fn observe(&mut self, raw: RawInput) -> Observation {
        if self.state != CaptureState::Capturing {
            return Observation::Ignored;
        }

        match raw {
            RawInput::Moved { x, y, at } => {
                if let Some((lx, ly)) = self.last_move {
                    let dist = ((x - lx).powi(2) + (y - ly).powi(2)).sqrt();
                    if self.config.min_move_distance > 0.0 && dist < self.config.min_move_distance {
                        return Observation::Ignored;
                    }
                }
                self.last_move = Some((x, y));
                Observation::Recorded(Event::Move {
                    x: x.round() as i32,
                    y: y.round() as i32,
                    ts: self.stamp(at),
                })
            }
            RawInput::Button { x, y, button, pressed, at } => {
                if pressed && button == self.config.stop_button.code() {
                    self.state = CaptureState::Stopped;
                    return Observation::StopGesture;
                }
                Observation::Recorded(Event::Click {
                    x: x.round() as i32,
                    y: y.round() as i32,
                    ts: self.stamp(at),
                    button,
                    pressed,
                })
            }
        }
    }

    /// Block on the notification stream until the stop gesture, a `Stop`
    /// from `on_event`, or a message on `stop`. Starts capturing if idle.
    pub fn run<F>(
        &mut self,
        subscription: &Subscription,
        stop: &Receiver<()>,
        mut on_event: F,
    ) -> Result<StopReason>
    where
        F: FnMut(Event) -> ControlSignal,
    {
        self.record();
        let events = subscription.receiver();

        loop {
            select! {
                recv(events) -> msg => {
                    let Ok(raw) = msg else {
                        self.state = CaptureState::Stopped;
                        return Err(Error::capture_unavailable("Input notification stream closed"));
                    };
                    match self.observe(raw) {
                        Observation::Ignored => {}
                        Observation::StopGesture => {
                            tracing::info!(
                                button = %self.config.stop_button,
                                "stop gesture detected"
                            );
                            return Ok(StopReason::Gesture);
                        }
                        Observation::Recorded(event) => {
                            tracing::trace!(?event, "recorded");
                            if on_event(event) == ControlSignal::Stop {
                                self.state = CaptureState::Stopped;
                                return Ok(StopReason::Requested);
                            }
                        }
                    }
                }
                recv(stop) -> _ => {
                    self.state = CaptureState::Stopped;
                    return Ok(StopReason::Requested);
                }
            }
        }
    }

    /// Epoch milliseconds, never earlier than the previous recorded event
    fn stamp(&mut self, at: SystemTime) -> i64 {
        let ms = DateTime::<Utc>::from(at).timestamp_millis();
        let ts = match self.last_ts {
            Some(last) if ms < last => last,
            _ => ms,
        };
        self.last_ts = Some(ts);
        ts
    }
}
