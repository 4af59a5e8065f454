//! Shared countdown timer
//!
//! The White Cell owns the countdown ([`TimerController`]). Everyone else
//! runs no countdown of their own: each poll recomputes the remaining time
//! from the stored `seconds` and `lastUpdate` ([`TimerDisplay`]).

use crate::channel::{ChannelRecord, ReadOnly, ReadWrite};
use crate::error::ChannelError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wargame_store::{keys, Clock, Notifier, SessionId, SessionKeyStore};

/// Shown when a stale running timer is reset on load
pub const MSG_TIMER_RESET: &str = "Timer was reset due to extended pause";

/// Warning threshold in seconds
pub const WARNING_SECS: u64 = 300;
/// Critical threshold in seconds
pub const CRITICAL_SECS: u64 = 60;

/// Default duration and staleness cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerPolicy {
    /// Length of a fresh countdown
    pub default_secs: u64,
    /// Elapsed time beyond which a running timer is considered abandoned
    pub stale_after_secs: u64,
}

impl Default for TimerPolicy {
    fn default() -> Self {
        Self {
            default_secs: 90 * 60,
            stale_after_secs: 24 * 60 * 60,
        }
    }
}

/// The shared timer record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    /// Remaining seconds at `last_update`
    pub seconds: u64,
    /// Whether the countdown is running
    pub running: bool,
    /// Epoch milliseconds of the write
    pub last_update: i64,
}

impl ChannelRecord for TimerState {
    fn differs(&self, previous: &Self) -> bool {
        self.seconds != previous.seconds || self.running != previous.running
    }
}

impl TimerState {
    /// Fresh stopped timer
    #[must_use]
    pub fn fresh(policy: &TimerPolicy, now_ms: i64) -> Self {
        Self {
            seconds: policy.default_secs,
            running: false,
            last_update: now_ms,
        }
    }

    /// Whole seconds since the write (never negative)
    #[must_use]
    pub fn elapsed_secs(&self, now_ms: i64) -> u64 {
        u64::try_from((now_ms - self.last_update).max(0) / 1000).unwrap_or(0)
    }

    /// Whether a running timer has gone unattended past the cap
    #[must_use]
    pub fn is_stale(&self, now_ms: i64, policy: &TimerPolicy) -> bool {
        self.running && self.elapsed_secs(now_ms) > policy.stale_after_secs
    }

    /// Remaining seconds as seen at `now_ms`
    #[must_use]
    pub fn remaining_at(&self, now_ms: i64, policy: &TimerPolicy) -> u64 {
        if !self.running {
            return self.seconds;
        }
        let elapsed = self.elapsed_secs(now_ms);
        if elapsed > policy.stale_after_secs {
            return policy.default_secs;
        }
        self.seconds.saturating_sub(elapsed.min(policy.stale_after_secs))
    }
}

/// Display urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    /// More than five minutes left
    Normal,
    /// Five minutes or less
    Warning,
    /// One minute or less
    Critical,
}

impl Urgency {
    /// Urgency for a remaining time
    #[must_use]
    pub fn for_remaining(seconds: u64) -> Self {
        if seconds <= CRITICAL_SECS {
            Self::Critical
        } else if seconds <= WARNING_SECS {
            Self::Warning
        } else {
            Self::Normal
        }
    }
}

/// A recomputed timer value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerReading {
    /// Seconds left
    pub remaining: u64,
    /// Whether the countdown is running
    pub running: bool,
    /// Display urgency
    pub urgency: Urgency,
}

impl TimerReading {
    /// `mm:ss`
    #[must_use]
    pub fn formatted(&self) -> String {
        format!("{:02}:{:02}", self.remaining / 60, self.remaining % 60)
    }
}

/// Read-only timer for non-owning pages
pub struct TimerDisplay {
    channel: ReadOnly<TimerState>,
    clock: Arc<dyn Clock>,
    policy: TimerPolicy,
}

impl TimerDisplay {
    /// Display for a session's timer
    #[must_use]
    pub fn new(store: Arc<SessionKeyStore>, session: &SessionId, policy: TimerPolicy) -> Self {
        let clock = Arc::clone(store.clock());
        Self {
            channel: ReadOnly::open(store, keys::shared_timer(session)),
            clock,
            policy,
        }
    }

    /// Recompute from the stored record; a missing record shows the default
    #[must_use]
    pub fn reading(&self) -> TimerReading {
        let now = self.clock.now_ms();
        let state = self
            .channel
            .read()
            .unwrap_or_else(|| TimerState::fresh(&self.policy, now));
        let remaining = state.remaining_at(now, &self.policy);
        TimerReading {
            remaining,
            running: state.running && !state.is_stale(now, &self.policy),
            urgency: Urgency::for_remaining(remaining),
        }
    }

    /// Underlying channel view
    #[must_use]
    pub fn channel(&self) -> &ReadOnly<TimerState> {
        &self.channel
    }
}

/// Owning countdown for the White Cell
pub struct TimerController {
    channel: ReadWrite<TimerState>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    policy: TimerPolicy,
    state: Mutex<TimerState>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl TimerController {
    /// Controller for a session's timer, starting from a fresh stopped state
    #[must_use]
    pub fn new(store: Arc<SessionKeyStore>, session: &SessionId, policy: TimerPolicy) -> Arc<Self> {
        let clock = Arc::clone(store.clock());
        let notifier = Arc::clone(store.notifier());
        let state = TimerState::fresh(&policy, clock.now_ms());
        Arc::new(Self {
            channel: ReadWrite::open(store, keys::shared_timer(session)),
            clock,
            notifier,
            policy,
            state: Mutex::new(state),
            ticker: Mutex::new(None),
        })
    }

    /// Current local state
    #[must_use]
    pub fn state(&self) -> TimerState {
        *self.state.lock()
    }

    /// Owning channel view
    #[must_use]
    pub fn channel(&self) -> &ReadWrite<TimerState> {
        &self.channel
    }

    /// Read-only view for co-located displays
    #[must_use]
    pub fn read_only(&self) -> ReadOnly<TimerState> {
        self.channel.read_only()
    }

    /// Load the stored timer, subtracting time spent while no page was open
    ///
    /// Returns the restored state. A stale running timer is reset and
    /// stopped. Call [`Self::start`] afterwards if the result is running.
    pub fn restore(&self) -> Result<TimerState, ChannelError> {
        let Some(stored) = self.channel.read() else {
            return Ok(self.state());
        };
        let now = self.clock.now_ms();
        let mut restored = stored;
        if stored.running {
            if stored.is_stale(now, &self.policy) {
                warn!(elapsed = stored.elapsed_secs(now), "timer left running too long, resetting");
                restored = TimerState::fresh(&self.policy, now);
                self.notifier.warning(MSG_TIMER_RESET);
            } else {
                restored.seconds = stored.remaining_at(now, &self.policy);
                restored.running = restored.seconds > 0;
            }
            restored.last_update = now;
            *self.state.lock() = restored;
            self.persist()?;
        } else {
            *self.state.lock() = restored;
        }
        Ok(restored)
    }

    /// Begin (or resume) the once-per-second countdown
    pub fn start(self: &Arc<Self>) -> Result<(), ChannelError> {
        let mut ticker = self.ticker.lock();
        if ticker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }
        {
            let mut state = self.state.lock();
            if state.seconds == 0 {
                return Ok(());
            }
            state.running = true;
        }
        self.persist()?;
        info!(seconds = self.state().seconds, "timer started");

        let controller = Arc::clone(self);
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.tick().await;
            loop {
                interval.tick().await;
                match controller.tick() {
                    Ok(state) if state.running => {}
                    Ok(_) => break,
                    Err(e) => warn!(error = %e, "timer tick not persisted"),
                }
            }
            debug!("timer countdown finished");
        }));
        Ok(())
    }

    /// Advance one second; stops at zero
    pub fn tick(&self) -> Result<TimerState, ChannelError> {
        {
            let mut state = self.state.lock();
            if !state.running {
                return Ok(*state);
            }
            state.seconds = state.seconds.saturating_sub(1);
            if state.seconds == 0 {
                state.running = false;
            }
        }
        self.persist()?;
        Ok(self.state())
    }

    /// Stop the countdown, keeping the remaining time
    pub fn pause(&self) -> Result<TimerState, ChannelError> {
        self.stop_ticker();
        self.state.lock().running = false;
        self.persist()?;
        info!(seconds = self.state().seconds, "timer paused");
        Ok(self.state())
    }

    /// Stop and return to the default duration
    pub fn reset(&self) -> Result<TimerState, ChannelError> {
        self.stop_ticker();
        {
            let mut state = self.state.lock();
            state.running = false;
            state.seconds = self.policy.default_secs;
        }
        self.persist()?;
        info!("timer reset");
        Ok(self.state())
    }

    /// Remaining time with urgency
    #[must_use]
    pub fn reading(&self) -> TimerReading {
        let state = self.state();
        TimerReading {
            remaining: state.seconds,
            running: state.running,
            urgency: Urgency::for_remaining(state.seconds),
        }
    }

    /// Persist the current state with a fresh `lastUpdate`
    pub fn persist(&self) -> Result<(), ChannelError> {
        let snapshot = {
            let mut state = self.state.lock();
            state.last_update = self.clock.now_ms();
            *state
        };
        self.channel.publish(&snapshot)
    }

    fn stop_ticker(&self) {
        if let Some(handle) = self.ticker.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for TimerController {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wargame_store::{ManualClock, MemoryBackend, RecordingNotifier};

    const T: i64 = 1_700_000_000_000;

    fn env() -> (Arc<SessionKeyStore>, Arc<ManualClock>, Arc<RecordingNotifier>) {
        let clock = Arc::new(ManualClock::at(T));
        let notifier = Arc::new(RecordingNotifier::new());
        let store = Arc::new(
            SessionKeyStore::new(Arc::new(MemoryBackend::new()))
                .with_clock(clock.clone())
                .with_notifier(notifier.clone()),
        );
        (store, clock, notifier)
    }

    #[test]
    fn reader_recomputes_from_last_update() {
        let policy = TimerPolicy::default();
        let state = TimerState {
            seconds: 600,
            running: true,
            last_update: T,
        };
        assert_eq!(state.remaining_at(T + 60_000, &policy), 540);
        assert_eq!(state.remaining_at(T + 700_000, &policy), 0);
        assert_eq!(state.remaining_at(T + 90_000_000, &policy), 5_400);
        let paused = TimerState {
            running: false,
            ..state
        };
        assert_eq!(paused.remaining_at(T + 700_000, &policy), 600);
    }

    #[test]
    fn display_follows_writer_without_counting() {
        let (store, clock, _) = env();
        let s = SessionId::new("s");
        let controller = TimerController::new(Arc::clone(&store), &s, TimerPolicy::default());
        let display = TimerDisplay::new(Arc::clone(&store), &s, TimerPolicy::default());

        {
            let mut state = controller.state.lock();
            state.seconds = 600;
            state.running = true;
        }
        controller.persist().unwrap();
        clock.advance(Duration::from_secs(60));
        let reading = display.reading();
        assert_eq!(reading.remaining, 540);
        assert_eq!(reading.formatted(), "09:00");
        assert_eq!(reading.urgency, Urgency::Normal);
    }

    #[test]
    fn tick_stops_at_zero() {
        let (store, _, _) = env();
        let controller = TimerController::new(store, &SessionId::new("s"), TimerPolicy::default());
        {
            let mut state = controller.state.lock();
            state.seconds = 2;
            state.running = true;
        }
        assert_eq!(controller.tick().unwrap().seconds, 1);
        let last = controller.tick().unwrap();
        assert_eq!(last.seconds, 0);
        assert!(!last.running);
        assert_eq!(controller.tick().unwrap().seconds, 0);
    }

    #[test]
    fn restore_subtracts_elapsed_time() {
        let (store, clock, _) = env();
        let s = SessionId::new("s");
        store.set(
            &keys::shared_timer(&s),
            &TimerState {
                seconds: 600,
                running: true,
                last_update: T,
            },
        );
        clock.advance(Duration::from_secs(100));
        let controller = TimerController::new(Arc::clone(&store), &s, TimerPolicy::default());
        let restored = controller.restore().unwrap();
        assert_eq!(restored.seconds, 500);
        assert!(restored.running);
    }

    #[test]
    fn restore_resets_stale_timer() {
        let (store, clock, notifier) = env();
        let s = SessionId::new("s");
        store.set(
            &keys::shared_timer(&s),
            &TimerState {
                seconds: 600,
                running: true,
                last_update: T,
            },
        );
        clock.advance(Duration::from_secs(25 * 3600));
        let controller = TimerController::new(Arc::clone(&store), &s, TimerPolicy::default());
        let restored = controller.restore().unwrap();
        assert_eq!(restored.seconds, 5_400);
        assert!(!restored.running);
        assert_eq!(notifier.messages(), vec![MSG_TIMER_RESET.to_string()]);
        let stored: TimerState = store.get_opt(&keys::shared_timer(&s)).unwrap();
        assert!(!stored.running);
    }

    #[test]
    fn urgency_thresholds() {
        assert_eq!(Urgency::for_remaining(301), Urgency::Normal);
        assert_eq!(Urgency::for_remaining(300), Urgency::Warning);
        assert_eq!(Urgency::for_remaining(60), Urgency::Critical);
    }

    #[tokio::test]
    async fn start_and_pause() {
        let (store, _, _) = env();
        let controller = TimerController::new(store, &SessionId::new("s"), TimerPolicy::default());
        controller.start().unwrap();
        assert!(controller.state().running);
        let paused = controller.pause().unwrap();
        assert!(!paused.running);
        let reset = controller.reset().unwrap();
        assert_eq!(reset.seconds, 5_400);
    }
}
