//! Engine - the command interface a control surface drives
//!
//! The engine owns at most one active capture or playback. Each runs on its
//! own worker thread; completion is reported on the notification queue
//! returned by [`Engine::notifications`]. A worker always puts the engine
//! back to idle before it publishes, so a control surface reacting to a
//! notification can immediately start the next operation.
//!
//! Do not call back into the engine from inside a notification handler
//! that runs on a worker thread; consume notifications on the control
//! surface's own thread.

use crate::error::{Error, Result};
use crate::events::Recording;
use crate::platform::{InputBackend, Subscription};
use crate::recorder::{CaptureConfig, CaptureListener, ControlSignal, StopReason};
use crate::replay::{CancelToken, PlaybackReport, ReplayConfig, Replayer};
use crate::storage::{CatalogEntry, SessionStore};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub capture: CaptureConfig,
    pub replay: ReplayConfig,
}

impl EngineConfig {
    pub fn capture(mut self, capture: CaptureConfig) -> Self {
        self.capture = capture;
        self
    }

    pub fn replay(mut self, replay: ReplayConfig) -> Self {
        self.replay = replay;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Idle,
    Capturing,
    /// Playback accepted, waiting out the lead-in
    Armed,
    Playing,
}

/// Worker-to-control-surface messages
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Capture stopped; the recording is ready to persist
    RecordingComplete(Recording),
    CaptureFailed { name: String, error: Error },
    PlaybackComplete { name: String, description: String },
    PlaybackCancelled { name: String, description: String },
    PlaybackFailed { name: String, error: Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Armed,
    Playing,
    Finished,
}

enum Activity {
    Idle,
    Capturing { stop: Sender<()> },
    Playback {
        cancel: CancelToken,
        state: Arc<Mutex<PlaybackState>>,
    },
}

/// Cancellable promise for one playback
pub struct PlaybackHandle {
    state: Arc<Mutex<PlaybackState>>,
    cancel: CancelToken,
    done: Receiver<Result<PlaybackReport>>,
}

impl PlaybackHandle {
    pub fn state(&self) -> PlaybackState {
        *self.state.lock()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the playback finishes
    pub fn wait(self) -> Result<PlaybackReport> {
        self.done.recv().unwrap_or_else(|_| Err(worker_lost()))
    }

    /// `None` while still running. The result is delivered only once.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<PlaybackReport>> {
        match self.done.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(worker_lost())),
        }
    }
}

fn worker_lost() -> Error {
    Error::playback_unavailable("Playback worker exited without a result")
}

pub struct Engine {
    backend: Arc<dyn InputBackend>,
    store: SessionStore,
    config: EngineConfig,
    activity: Arc<Mutex<Activity>>,
    notify_tx: Sender<Notification>,
    notify_rx: Receiver<Notification>,
}

impl Engine {
    pub fn new<B>(backend: B, store: SessionStore, config: EngineConfig) -> Self
    where
        B: InputBackend + 'static,
    {
        let (notify_tx, notify_rx) = unbounded();
        Self {
            backend: Arc::new(backend),
            store,
            config,
            activity: Arc::new(Mutex::new(Activity::Idle)),
            notify_tx,
            notify_rx,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn notifications(&self) -> Receiver<Notification> {
        self.notify_rx.clone()
    }

    pub fn status(&self) -> EngineStatus {
        match &*self.activity.lock() {
            Activity::Idle => EngineStatus::Idle,
            Activity::Capturing { .. } => EngineStatus::Capturing,
            Activity::Playback { state, .. } => match *state.lock() {
                PlaybackState::Armed => EngineStatus::Armed,
                PlaybackState::Playing => EngineStatus::Playing,
                PlaybackState::Finished => EngineStatus::Idle,
            },
        }
    }

    /// Start capturing into a new recording named `name`.
    ///
    /// The hook is registered before this returns, so a registration
    /// failure surfaces here as `CaptureUnavailable`.
    pub fn begin_capture(&self, name: &str, description: &str) -> Result<()> {
        self.config.capture.validate()?;

        let mut activity = self.activity.lock();
        if !matches!(*activity, Activity::Idle) {
            return Err(Error::capture_unavailable(
                "A capture or playback is already active",
            ));
        }

        let subscription = self.backend.subscribe()?;
        let (stop_tx, stop_rx) = bounded(1);
        let recording = Recording::new(name, description);
        let config = self.config.capture.clone();
        let slot = Arc::clone(&self.activity);
        let notify = self.notify_tx.clone();

        thread::Builder::new()
            .name("cobalt-capture".into())
            .spawn(move || capture_worker(recording, config, subscription, stop_rx, slot, notify))
            .map_err(|e| {
                Error::capture_unavailable(format!("Failed to spawn capture worker: {}", e))
            })?;

        *activity = Activity::Capturing { stop: stop_tx };
        tracing::info!(%name, stop_button = %self.config.capture.stop_button, "capture started");
        Ok(())
    }

    /// Ask the active capture to finish as if the stop gesture was seen
    pub fn stop_capture(&self) -> Result<()> {
        match &*self.activity.lock() {
            Activity::Capturing { stop } => {
                let _ = stop.try_send(());
                Ok(())
            }
            _ => Err(Error::not_active("capture")),
        }
    }

    /// Save a recording and index it in the catalog
    pub fn persist(&self, recording: &Recording) -> Result<String> {
        let file_reference = self.store.save(recording)?;
        self.store
            .append_catalog_entry(CatalogEntry::for_recording(recording, file_reference.clone()))?;
        Ok(file_reference)
    }

    pub fn load(&self, file_reference: &str) -> Result<Recording> {
        self.store.load(file_reference)
    }

    pub fn list_catalog(&self) -> Result<Vec<CatalogEntry>> {
        self.store.load_catalog()
    }

    pub fn begin_playback(&self, recording: Recording) -> Result<PlaybackHandle> {
        self.config.replay.validate()?;

        let mut activity = self.activity.lock();
        if !matches!(*activity, Activity::Idle) {
            return Err(Error::playback_unavailable(
                "A capture or playback is already active",
            ));
        }

        let cancel = CancelToken::new();
        let state = Arc::new(Mutex::new(PlaybackState::Armed));
        let (done_tx, done_rx) = bounded(1);

        let worker = PlaybackWorker {
            recording,
            replayer: Replayer::with_config(self.config.replay.clone()),
            backend: Arc::clone(&self.backend),
            cancel: cancel.clone(),
            state: Arc::clone(&state),
            slot: Arc::clone(&self.activity),
            notify: self.notify_tx.clone(),
            done: done_tx,
        };
        let name = worker.recording.name.clone();

        thread::Builder::new()
            .name("cobalt-playback".into())
            .spawn(move || worker.run())
            .map_err(|e| {
                Error::playback_unavailable(format!("Failed to spawn playback worker: {}", e))
            })?;

        *activity = Activity::Playback {
            cancel: cancel.clone(),
            state: Arc::clone(&state),
        };
        tracing::info!(%name, "playback armed");

        Ok(PlaybackHandle {
            state,
            cancel,
            done: done_rx,
        })
    }

    pub fn cancel_playback(&self) -> Result<()> {
        match &*self.activity.lock() {
            Activity::Playback { cancel, .. } => {
                cancel.cancel();
                Ok(())
            }
            _ => Err(Error::not_active("playback")),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        match &*self.activity.lock() {
            Activity::Capturing { stop } => {
                let _ = stop.try_send(());
            }
            Activity::Playback { cancel, .. } => cancel.cancel(),
            Activity::Idle => {}
        }
    }
}

/// Puts the engine back to idle when the worker ends, including by panic
struct IdleOnDrop {
    slot: Arc<Mutex<Activity>>,
    playback: Option<Arc<Mutex<PlaybackState>>>,
}

impl Drop for IdleOnDrop {
    fn drop(&mut self) {
        if let Some(state) = &self.playback {
            *state.lock() = PlaybackState::Finished;
        }
        *self.slot.lock() = Activity::Idle;
        if thread::panicking() {
            tracing::error!("worker panicked, engine reset to idle");
        }
    }
}

fn capture_worker(
    mut recording: Recording,
    config: CaptureConfig,
    subscription: Subscription,
    stop: Receiver<()>,
    slot: Arc<Mutex<Activity>>,
    notify: Sender<Notification>,
) {
    let idle = IdleOnDrop { slot, playback: None };
    let mut listener = CaptureListener::new(config);
    let outcome = listener.run(&subscription, &stop, |event| {
        recording.events.push(event);
        ControlSignal::Continue
    });
    drop(subscription);
    drop(idle);

    let notification = match outcome {
        Ok(reason) => {
            tracing::info!(
                name = %recording.name,
                events = recording.events.len(),
                by_gesture = reason == StopReason::Gesture,
                "capture stopped"
            );
            Notification::RecordingComplete(recording)
        }
        Err(error) => {
            tracing::error!(name = %recording.name, %error, "capture failed");
            Notification::CaptureFailed {
                name: recording.name,
                error,
            }
        }
    };
    let _ = notify.send(notification);
}

struct PlaybackWorker {
    recording: Recording,
    replayer: Replayer,
    backend: Arc<dyn InputBackend>,
    cancel: CancelToken,
    state: Arc<Mutex<PlaybackState>>,
    slot: Arc<Mutex<Activity>>,
    notify: Sender<Notification>,
    done: Sender<Result<PlaybackReport>>,
}

impl PlaybackWorker {
    fn run(self) {
        let PlaybackWorker {
            recording,
            replayer,
            backend,
            cancel,
            state,
            slot,
            notify,
            done,
        } = self;
        let idle = IdleOnDrop {
            slot,
            playback: Some(Arc::clone(&state)),
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<PlaybackReport> {
            let mut emitter = backend.emitter()?;
            replayer.play(&recording, emitter.as_mut(), &cancel, || {
                *state.lock() = PlaybackState::Playing;
            })
        }))
        .unwrap_or_else(|_| Err(Error::playback_unavailable("Playback worker panicked")));
        drop(idle);

        let Recording { name, description, .. } = recording;
        let notification = match &outcome {
            Ok(report) if report.cancelled => Notification::PlaybackCancelled { name, description },
            Ok(_) => Notification::PlaybackComplete { name, description },
            Err(error) => {
                tracing::error!(%name, %error, "playback failed");
                Notification::PlaybackFailed {
                    name,
                    error: error.clone(),
                }
            }
        };
        let _ = notify.send(notification);
        let _ = done.send(outcome);
    }
}
