//! Single-slot timers for the client event loop
//!
//! Both timers are owned by the actor and polled from `tokio::select!`.
//! Scheduling replaces whatever was pending, so at most one reconnect and one
//! countdown can ever be outstanding. An idle timer is a future that never
//! completes, which keeps its `select!` branch dormant.

use std::future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior, Sleep};

/// One-shot reconnect timer
#[derive(Debug, Default)]
pub struct ReconnectTimer {
    deadline: Option<Pin<Box<Sleep>>>,
}

impl ReconnectTimer {
    /// Idle timer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer, replacing any pending deadline
    pub fn schedule(&mut self, delay: Duration) {
        self.deadline = Some(Box::pin(time::sleep(delay)));
    }

    /// Disarm the timer
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Whether a deadline is pending
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves when the armed deadline passes, then disarms
    ///
    /// Cancel safe: dropping the future keeps the deadline armed.
    pub async fn fired(&mut self) {
        match self.deadline.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.deadline = None;
            }
            None => future::pending().await,
        }
    }
}

/// Once-per-second ticker driving the reconnect countdown
#[derive(Debug, Default)]
pub struct CountdownTicker {
    interval: Option<Interval>,
}

impl CountdownTicker {
    /// Idle ticker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking every second, first tick one second from now
    pub fn start(&mut self) {
        let period = Duration::from_secs(1);
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    /// Stop ticking
    pub fn cancel(&mut self) {
        self.interval = None;
    }

    /// Whether the ticker is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Resolves on the next tick; never resolves while stopped
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => future::pending().await,
        }
    }
}
