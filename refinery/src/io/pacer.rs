//! Request pacing for oracle calls.
//!
//! A [`Pacer`] enforces two independent lower bounds on when the next call may
//! start: a minimum spacing after the previous call, and a cap on calls inside a
//! trailing window. [`Pacer::admit`] blocks for whichever bound is larger.

use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Time source used by the pacer.
///
/// `now` is measured from an arbitrary fixed origin.
pub trait Clock {
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant`] and [`thread::sleep`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacerConfig {
    pub min_interval: Duration,
    pub max_calls_per_window: usize,
    pub window: Duration,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(6),
            max_calls_per_window: 10,
            window: Duration::from_secs(60),
        }
    }
}

/// Snapshot returned by [`Pacer::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacerStats {
    pub max_calls_per_window: usize,
    pub min_interval: Duration,
    pub calls_in_window: usize,
    pub since_last_call: Option<Duration>,
    pub until_available: Duration,
    pub can_proceed: bool,
}

pub struct Pacer {
    config: PacerConfig,
    clock: Box<dyn Clock>,
    // Admission times, oldest first, at most `max_calls_per_window` entries.
    history: VecDeque<Duration>,
}

impl Pacer {
    pub fn new(config: PacerConfig) -> Self {
        Self::with_clock(config, Box::new(SystemClock::new()))
    }

    pub fn with_clock(config: PacerConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            history: VecDeque::with_capacity(config.max_calls_per_window),
        }
    }

    pub fn config(&self) -> PacerConfig {
        self.config
    }

    /// Wait until a call may start, record it, and return how long we waited.
    pub fn admit(&mut self) -> Duration {
        let wait = self.required_wait(self.clock.now());
        if !wait.is_zero() {
            info!(wait_ms = wait.as_millis() as u64, "pacing oracle call");
            self.clock.sleep(wait);
        }

        self.history.push_back(self.clock.now());
        while self.history.len() > self.capacity() {
            self.history.pop_front();
        }
        debug!(in_history = self.history.len(), "call admitted");
        wait
    }

    /// Current pacing state. Does not record a call.
    pub fn stats(&self) -> PacerStats {
        let now = self.clock.now();
        let until_available = self.required_wait(now);
        PacerStats {
            max_calls_per_window: self.config.max_calls_per_window,
            min_interval: self.config.min_interval,
            calls_in_window: self
                .history
                .iter()
                .filter(|stamp| now.saturating_sub(**stamp) < self.config.window)
                .count(),
            since_last_call: self.history.back().map(|last| now.saturating_sub(*last)),
            until_available,
            can_proceed: until_available.is_zero(),
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    fn capacity(&self) -> usize {
        self.config.max_calls_per_window.max(1)
    }

    fn required_wait(&self, now: Duration) -> Duration {
        let spacing = self
            .history
            .back()
            .map(|last| (*last + self.config.min_interval).saturating_sub(now))
            .unwrap_or_default();

        let window = if self.history.len() >= self.capacity() {
            self.history
                .front()
                .map(|oldest| (*oldest + self.config.window).saturating_sub(now))
                .unwrap_or_default()
        } else {
            Duration::ZERO
        };

        spacing.max(window)
    }
}
