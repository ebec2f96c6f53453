//! Handshake / liveness deadline.

use std::time::Duration;

use tokio::time::Instant;

/// Single sliding deadline owned by the guest controller.
///
/// Armed or disarmed; re-arming replaces the previous deadline rather than
/// adding to it. The timer itself never fires anything: the controller's
/// driver awaits [`HandshakeTimer::expired`].
#[derive(Debug, Default)]
pub struct HandshakeTimer {
    deadline: Option<Instant>,
    arms: u64,
}

impl HandshakeTimer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            deadline: None,
            arms: 0,
        }
    }

    /// Schedule expiry `duration` from now, replacing any pending deadline.
    pub fn arm(&mut self, duration: Duration) {
        self.deadline = Some(Instant::now() + duration);
        self.arms += 1;
    }

    /// Cancel the pending deadline. No-op when nothing is pending.
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Disarm then arm again.
    pub fn reset(&mut self, duration: Duration) {
        self.disarm();
        self.arm(duration);
    }

    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// How many times the timer has been armed.
    #[must_use]
    pub const fn arm_count(&self) -> u64 {
        self.arms
    }

    /// Resolves when the armed deadline passes; never resolves while
    /// disarmed.
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    const LIMIT: Duration = Duration::from_millis(100);

    #[test]
    fn test_disarm_when_idle_is_noop() {
        let mut timer = HandshakeTimer::new();
        timer.disarm();
        assert!(!timer.is_armed());
        assert_eq!(timer.arm_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_after_limit() {
        let mut timer = HandshakeTimer::new();
        let start = Instant::now();
        timer.arm(LIMIT);
        timer.expired().await;
        assert_eq!(start.elapsed(), LIMIT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restarts_window() {
        let mut timer = HandshakeTimer::new();
        timer.arm(LIMIT);
        tokio::time::advance(Duration::from_millis(60)).await;

        let reset_at = Instant::now();
        timer.reset(LIMIT);
        assert_eq!(timer.arm_count(), 2);
        assert_eq!(timer.deadline(), Some(reset_at + LIMIT));

        timer.expired().await;
        assert_eq!(reset_at.elapsed(), LIMIT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarmed_timer_never_fires() {
        let mut timer = HandshakeTimer::new();
        timer.arm(LIMIT);
        timer.disarm();

        let mut fut = task::spawn(timer.expired());
        assert_pending!(fut.poll());
        tokio::time::advance(LIMIT * 10).await;
        assert_pending!(fut.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn test_armed_timer_ready_after_deadline() {
        let mut timer = HandshakeTimer::new();
        timer.arm(LIMIT);

        let mut fut = task::spawn(timer.expired());
        assert_pending!(fut.poll());
        tokio::time::advance(LIMIT).await;
        assert_ready!(fut.poll());
    }
}
