//! Resettable one-shot timer used for the end-of-call grace period.
//!
//! The timer is polled from the coordinator's `select!` loop, so arming,
//! rearming and cancelling never race with expiry: at most one deadline is
//! pending and only the latest one can fire.

use std::future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{self, Instant, Sleep};

/// Single reschedulable deferred action
pub struct DebounceTimer {
    sleep: Pin<Box<Sleep>>,
    period: Duration,
    armed: bool,
}

impl DebounceTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            sleep: Box::pin(time::sleep(period)),
            period,
            armed: false,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Arm (or rearm) the timer one period from now
    pub fn arm(&mut self) {
        self.arm_from(Instant::now());
    }

    /// Arm (or rearm) the timer one period from `start`.
    ///
    /// Any previously pending deadline is replaced.
    pub fn arm_from(&mut self, start: Instant) {
        self.sleep.as_mut().reset(start + self.period);
        self.armed = true;
    }

    pub fn cancel(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Pending deadline, if armed
    pub fn deadline(&self) -> Option<Instant> {
        self.armed.then(|| self.sleep.deadline())
    }

    /// Resolve when the armed deadline passes; never resolves while disarmed.
    ///
    /// Cancel-safe: dropping the future leaves the timer untouched.
    pub async fn expired(&mut self) {
        if !self.armed {
            future::pending::<()>().await;
        }
        self.sleep.as_mut().await;
        self.armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_period() {
        let mut timer = DebounceTimer::new(Duration::from_millis(1500));
        let start = Instant::now();
        timer.arm();

        timer.expired().await;
        assert!(start.elapsed() >= Duration::from_millis(1500));
        assert!(start.elapsed() < Duration::from_millis(1510));
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_deadline() {
        let mut timer = DebounceTimer::new(Duration::from_millis(1500));
        let start = Instant::now();
        timer.arm();

        time::advance(Duration::from_millis(1000)).await;
        timer.arm();

        timer.expired().await;
        assert!(start.elapsed() >= Duration::from_millis(2500));
        assert!(start.elapsed() < Duration::from_millis(2510));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let mut timer = DebounceTimer::new(Duration::from_millis(100));
        timer.arm();
        timer.cancel();

        let fired = time::timeout(Duration::from_secs(10), timer.expired()).await;
        assert!(fired.is_err());
        assert!(timer.deadline().is_none());
    }
}
