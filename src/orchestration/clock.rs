//! # Clock
//!
//! Every wait in the orchestration loop is an explicit suspension point on a
//! [`Clock`]. Production uses tokio timers; tests use [`ManualClock`], whose
//! sleeps advance virtual time instantly so a twelve-hour poll ceiling runs in
//! microseconds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the caller for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Real time backed by `tokio::time`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug)]
struct ManualClockState {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

impl ManualClockState {
    /// Move `now` forward, saturating at the latest representable instant
    fn advance(&mut self, duration: Duration) {
        self.now = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|delta| self.now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
    }
}

/// Virtual clock: `sleep` returns immediately after advancing `now`
///
/// ```
/// use batch_orchestrator::orchestration::{Clock, ManualClock};
/// use chrono::{TimeZone, Utc};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
/// let clock = ManualClock::new(start);
///
/// clock.sleep(Duration::from_secs(12 * 3600)).await;
///
/// assert_eq!(clock.now() - start, chrono::Duration::hours(12));
/// assert_eq!(clock.sleeps(), vec![Duration::from_secs(12 * 3600)]);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualClockState>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualClockState {
                now: start,
                sleeps: Vec::new(),
            })),
        }
    }

    /// Move virtual time forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        self.lock().advance(duration);
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    /// Total virtual time spent sleeping
    pub fn total_slept(&self) -> Duration {
        self.lock().sleeps.iter().sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualClockState> {
        // A poisoned clock only means a test already panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.lock().now
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.advance(duration);
        state.sleeps.push(duration);
    }
}
