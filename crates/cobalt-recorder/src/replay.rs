//! Playback scheduler
//!
//! A recording is first turned into a [`Script`] by the pure [`plan`]
//! transform, then the script is driven against an [`InputEmitter`] with
//! the recorded relative timing. The recording itself is never touched, so
//! the same recording replays identically any number of times.
//!
//! For `n` events the script has `n - 1` steps: step `i` waits
//! `ts[i+1] - ts[i]` and then performs event `i`'s action. The last event
//! only provides the final timestamp and position.

use crate::error::{Error, Result};
use crate::events::{delay_between, delta, ButtonId, Event, Recording};
use crate::platform::InputEmitter;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One synthesized input action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    MoveTo { x: i32, y: i32 },
    MoveBy { dx: i32, dy: i32 },
    Button { button: ButtonId, pressed: bool },
}

/// Wait `delay`, then perform `action`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub delay: Duration,
    pub action: Action,
}

/// Derived playback plan for a recording
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    /// Where to put the pointer before the first step
    pub origin: Option<(i32, i32)>,
    pub steps: Vec<Step>,
}

impl Script {
    /// Sum of all step delays, saturating
    pub fn duration(&self) -> Duration {
        self.steps
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.delay))
    }
}

/// Build the playback plan for `events`
pub fn plan(events: &[Event]) -> Script {
    let origin = events.first().map(Event::position);
    let steps = events
        .windows(2)
        .map(|pair| {
            let (cur, next) = (&pair[0], &pair[1]);
            if next.ts() < cur.ts() {
                tracing::warn!(
                    prev = cur.ts(),
                    next = next.ts(),
                    "timestamps out of order, clamping delay to zero"
                );
            }
            let action = match *cur {
                Event::Move { .. } => {
                    let (dx, dy) = delta(cur, next);
                    Action::MoveBy { dx, dy }
                }
                Event::Click { button, pressed, .. } => Action::Button {
                    button: ButtonId::from_code(button),
                    pressed,
                },
            };
            Step {
                delay: delay_between(cur, next),
                action,
            }
        })
        .collect();

    Script { origin, steps }
}

/// Playback configuration
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// 1.0 = real-time, 2.0 = twice as fast
    pub speed: f64,
    /// Cancellable wait before the pointer is first positioned
    pub lead_in: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            lead_in: Duration::ZERO,
        }
    }
}

impl ReplayConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(Error::invalid_config(format!(
                "Playback speed must be a positive number, got {}",
                self.speed
            )));
        }
        Ok(())
    }
}

/// Cooperative cancellation shared between a playback worker and its owner
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            tx,
            rx,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let _ = self.tx.try_send(());
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep until `deadline`. Returns false if cancelled first.
    pub fn sleep_until(&self, deadline: Instant) -> bool {
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            // A wakeup may be stale; the flag decides.
            if let Err(RecvTimeoutError::Disconnected) = self.rx.recv_timeout(deadline - now) {
                std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one playback run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackReport {
    pub name: String,
    pub description: String,
    pub moves: usize,
    pub buttons: usize,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl PlaybackReport {
    fn for_recording(recording: &Recording) -> Self {
        Self {
            name: recording.name.clone(),
            description: recording.description.clone(),
            ..Default::default()
        }
    }

    /// Actions emitted after the initial positioning
    pub fn actions(&self) -> usize {
        self.moves + self.buttons
    }
}

/// Replays recordings against an emitter
#[derive(Debug, Clone, Default)]
pub struct Replayer {
    config: ReplayConfig,
}

impl Replayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ReplayConfig) -> Self {
        Self { config }
    }

    /// Set playback speed (1.0 = real-time, 2.0 = 2x speed)
    pub fn speed(mut self, speed: f64) -> Self {
        self.config.speed = speed;
        self
    }

    pub fn lead_in(mut self, lead_in: Duration) -> Self {
        self.config.lead_in = lead_in;
        self
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Replay `recording`, blocking until done or cancelled.
    ///
    /// `on_start` runs once the lead-in has elapsed, right before the
    /// pointer is positioned.
    pub fn play(
        &self,
        recording: &Recording,
        emitter: &mut dyn InputEmitter,
        cancel: &CancelToken,
        on_start: impl FnOnce(),
    ) -> Result<PlaybackReport> {
        self.config.validate()?;
        let mut report = PlaybackReport::for_recording(recording);

        let script = plan(&recording.events);
        let Some((x, y)) = script.origin else {
            tracing::info!(name = %recording.name, "empty recording, nothing to replay");
            return Ok(report);
        };

        let offsets = self.schedule(&script)?;

        if !self.config.lead_in.is_zero() {
            let deadline = Instant::now()
                .checked_add(self.config.lead_in)
                .ok_or_else(|| out_of_range("lead-in", self.config.lead_in))?;
            if !cancel.sleep_until(deadline) {
                report.cancelled = true;
                return Ok(report);
            }
        }

        on_start();
        tracing::info!(
            name = %recording.name,
            steps = script.steps.len(),
            speed = self.config.speed,
            "playback started"
        );

        let started = Instant::now();
        let deadlines = offsets
            .iter()
            .map(|offset| started.checked_add(*offset))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| out_of_range("playback", offsets.last().copied().unwrap_or_default()))?;
        emitter.move_to(x, y)?;

        for (step, deadline) in script.steps.iter().zip(deadlines) {
            if !cancel.sleep_until(deadline) {
                report.cancelled = true;
                break;
            }
            tracing::trace!(action = ?step.action, "emit");
            match step.action {
                Action::MoveTo { x, y } => {
                    emitter.move_to(x, y)?;
                    report.moves += 1;
                }
                Action::MoveBy { dx, dy } => {
                    emitter.move_by(dx, dy)?;
                    report.moves += 1;
                }
                Action::Button { button, pressed } => {
                    emitter.button(button, pressed)?;
                    report.buttons += 1;
                }
            }
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            name = %recording.name,
            actions = report.actions(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            cancelled = report.cancelled,
            "playback finished"
        );
        Ok(report)
    }

    /// Cumulative offset of every step from the playback start, at the
    /// configured speed
    fn schedule(&self, script: &Script) -> Result<Vec<Duration>> {
        let mut offset = Duration::ZERO;
        script
            .steps
            .iter()
            .map(|step| -> Result<Duration> {
                let secs = step.delay.as_secs_f64() / self.config.speed;
                let scaled = Duration::try_from_secs_f64(secs)
                    .map_err(|_| out_of_range("step delay", step.delay))?;
                offset = offset
                    .checked_add(scaled)
                    .ok_or_else(|| out_of_range("playback", step.delay))?;
                Ok(offset)
            })
            .collect()
    }
}

fn out_of_range(what: &str, duration: Duration) -> Error {
    Error::invalid_config(format!(
        "{} of {:?} is beyond the timer range at this speed",
        what, duration
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorded {
        start: Option<Instant>,
        actions: Vec<(Duration, Action)>,
    }

    impl Recorded {
        fn push(&mut self, action: Action) {
            let start = *self.start.get_or_insert_with(Instant::now);
            self.actions.push((start.elapsed(), action));
        }
    }

    impl InputEmitter for Recorded {
        fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
            self.push(Action::MoveTo { x, y });
            Ok(())
        }
        fn move_by(&mut self, dx: i32, dy: i32) -> Result<()> {
            self.push(Action::MoveBy { dx, dy });
            Ok(())
        }
        fn button(&mut self, button: ButtonId, pressed: bool) -> Result<()> {
            self.push(Action::Button { button, pressed });
            Ok(())
        }
    }

    struct Failing;

    impl InputEmitter for Failing {
        fn move_to(&mut self, _: i32, _: i32) -> Result<()> {
            Ok(())
        }
        fn move_by(&mut self, _: i32, _: i32) -> Result<()> {
            Err(Error::emit_failed("move_by", "display gone"))
        }
        fn button(&mut self, _: ButtonId, _: bool) -> Result<()> {
            Ok(())
        }
    }

    fn scenario() -> Recording {
        let mut rec = Recording::new("scenario", "move then click");
        rec.events = vec![
            Event::Move { x: 0, y: 0, ts: 0 },
            Event::Move { x: 5, y: 5, ts: 100 },
            Event::Click { x: 5, y: 5, ts: 150, button: 0, pressed: true },
            Event::Click { x: 5, y: 5, ts: 200, button: 0, pressed: false },
        ];
        rec
    }

    #[test]
    fn plan_has_one_step_per_adjacent_pair() {
        let script = plan(&scenario().events);
        assert_eq!(script.origin, Some((0, 0)));
        assert_eq!(
            script.steps,
            vec![
                Step { delay: Duration::from_millis(100), action: Action::MoveBy { dx: 5, dy: 5 } },
                Step { delay: Duration::from_millis(50), action: Action::MoveBy { dx: 0, dy: 0 } },
                Step {
                    delay: Duration::from_millis(50),
                    action: Action::Button { button: ButtonId::Left, pressed: true },
                },
            ]
        );
        assert_eq!(script.duration(), Duration::from_millis(200));
    }

    #[test]
    fn plan_of_empty_and_single_event() {
        assert_eq!(plan(&[]), Script::default());
        let single = plan(&[Event::Move { x: 7, y: 8, ts: 1 }]);
        assert_eq!(single.origin, Some((7, 8)));
        assert!(single.steps.is_empty());
    }

    #[test]
    fn plan_clamps_backwards_timestamps() {
        let events = [
            Event::Move { x: 0, y: 0, ts: 500 },
            Event::Move { x: 1, y: 0, ts: 400 },
            Event::Move { x: 2, y: 0, ts: 450 },
        ];
        let script = plan(&events);
        assert_eq!(script.steps[0].delay, Duration::ZERO);
        assert_eq!(script.steps[1].delay, Duration::from_millis(50));
    }

    #[test]
    fn plan_normalizes_extra_buttons_to_middle() {
        for code in [2u8, 3, 7, 255] {
            let events = [
                Event::Click { x: 0, y: 0, ts: 0, button: code, pressed: true },
                Event::Move { x: 0, y: 0, ts: 1 },
            ];
            assert_eq!(
                plan(&events).steps[0].action,
                Action::Button { button: ButtonId::Middle, pressed: true }
            );
        }
    }

    #[test]
    fn replays_scenario_with_recorded_timing() {
        let rec = scenario();
        let mut emitter = Recorded { start: Some(Instant::now()), ..Default::default() };
        let report = Replayer::new()
            .play(&rec, &mut emitter, &CancelToken::new(), || {})
            .unwrap();

        let actions: Vec<Action> = emitter.actions.iter().map(|(_, a)| *a).collect();
        assert_eq!(
            actions,
            vec![
                Action::MoveTo { x: 0, y: 0 },
                Action::MoveBy { dx: 5, dy: 5 },
                Action::MoveBy { dx: 0, dy: 0 },
                Action::Button { button: ButtonId::Left, pressed: true },
            ]
        );
        assert_eq!(report.actions(), rec.events.len() - 1);
        assert_eq!((report.moves, report.buttons), (2, 1));
        assert!(!report.cancelled);

        // Positioning happens immediately, each action no earlier than its deadline.
        assert!(emitter.actions[0].0 < Duration::from_millis(20));
        assert!(emitter.actions[1].0 >= Duration::from_millis(100));
        assert!(emitter.actions[2].0 >= Duration::from_millis(150));
        assert!(emitter.actions[3].0 >= Duration::from_millis(200));
        assert!(report.elapsed >= Duration::from_millis(200));
        assert!(report.elapsed < Duration::from_millis(600));
    }

    #[test]
    fn replaying_twice_gives_identical_actions() {
        let rec = scenario();
        let before = rec.clone();
        let replayer = Replayer::new().speed(10.0);

        let mut first = Recorded::default();
        let mut second = Recorded::default();
        replayer.play(&rec, &mut first, &CancelToken::new(), || {}).unwrap();
        replayer.play(&rec, &mut second, &CancelToken::new(), || {}).unwrap();

        let strip = |r: &Recorded| r.actions.iter().map(|(_, a)| *a).collect::<Vec<_>>();
        assert_eq!(strip(&first), strip(&second));
        assert_eq!(rec, before);
    }

    #[test]
    fn empty_recording_completes_immediately() {
        let rec = Recording::new("empty", "");
        let mut emitter = Recorded::default();
        let mut started = false;
        let report = Replayer::new()
            .lead_in(Duration::from_secs(5))
            .play(&rec, &mut emitter, &CancelToken::new(), || started = true)
            .unwrap();
        assert!(emitter.actions.is_empty());
        assert_eq!(report.actions(), 0);
        assert!(!started);
    }

    #[test]
    fn speed_scales_delays() {
        let mut rec = Recording::new("slow", "");
        rec.events = vec![
            Event::Move { x: 0, y: 0, ts: 0 },
            Event::Move { x: 1, y: 1, ts: 400 },
            Event::Move { x: 2, y: 2, ts: 800 },
        ];
        let report = Replayer::new()
            .speed(4.0)
            .play(&rec, &mut Recorded::default(), &CancelToken::new(), || {})
            .unwrap();
        assert!(report.elapsed >= Duration::from_millis(200));
        assert!(report.elapsed < Duration::from_millis(600));
    }

    #[test]
    fn invalid_speed_is_rejected() {
        let err = Replayer::new()
            .speed(0.0)
            .play(&scenario(), &mut Recorded::default(), &CancelToken::new(), || {})
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidConfig);
    }

    #[test]
    fn tiny_speed_is_an_error_before_any_action() {
        let mut emitter = Recorded::default();
        let mut started = false;
        let err = Replayer::new()
            .speed(1e-30)
            .play(&scenario(), &mut emitter, &CancelToken::new(), || started = true)
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidConfig);
        assert!(emitter.actions.is_empty());
        assert!(!started);
    }

    #[test]
    fn huge_lead_in_is_an_error() {
        let err = Replayer::new()
            .lead_in(Duration::MAX)
            .play(&scenario(), &mut Recorded::default(), &CancelToken::new(), || {})
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidConfig);
    }

    #[test]
    fn cancel_interrupts_a_long_sleep() {
        let mut rec = Recording::new("long", "");
        rec.events = vec![
            Event::Move { x: 0, y: 0, ts: 0 },
            Event::Move { x: 1, y: 1, ts: 60_000 },
        ];
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });

        let mut emitter = Recorded::default();
        let started = Instant::now();
        let report = Replayer::new().play(&rec, &mut emitter, &cancel, || {}).unwrap();
        canceller.join().unwrap();

        assert!(report.cancelled);
        assert_eq!(report.actions(), 0);
        assert_eq!(emitter.actions.len(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn cancel_during_lead_in_skips_positioning() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut emitter = Recorded::default();
        let report = Replayer::new()
            .lead_in(Duration::from_secs(30))
            .play(&scenario(), &mut emitter, &cancel, || {})
            .unwrap();
        assert!(report.cancelled);
        assert!(emitter.actions.is_empty());
    }

    #[test]
    fn emitter_failure_aborts_playback() {
        let err = Replayer::new()
            .speed(100.0)
            .play(&scenario(), &mut Failing, &CancelToken::new(), || {})
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::EmitFailed);
    }
}
