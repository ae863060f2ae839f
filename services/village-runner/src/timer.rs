//! Named cooldown timers and the clock they are evaluated against

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Source of monotonic time
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Tokio's clock. Follows the paused test clock when time is paused.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Eligibility timer for a sub-policy that does not run every tick
#[derive(Debug, Clone)]
pub struct CooldownTimer {
    name: &'static str,
    next_eligible: Option<Instant>,
    last_interval: Option<Duration>,
}

impl CooldownTimer {
    /// Create a timer that is eligible immediately
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_eligible: None,
            last_interval: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_eligible(&self, now: Instant) -> bool {
        self.next_eligible.map(|next| now >= next).unwrap_or(true)
    }

    /// Record that the guarded action ran at `now`; it becomes eligible again
    /// after `next_interval`
    pub fn mark_triggered(&mut self, now: Instant, next_interval: Duration) {
        self.next_eligible = Some(now + next_interval);
        self.last_interval = Some(next_interval);
        debug!(
            "Timer '{}' re-armed for {}s",
            self.name,
            next_interval.as_secs()
        );
    }

    /// Time until eligible, zero if already eligible
    pub fn remaining(&self, now: Instant) -> Duration {
        self.next_eligible
            .map(|next| next.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    pub fn last_interval(&self) -> Option<Duration> {
        self.last_interval
    }
}
