//! Heartbeat Liveness Tracking
//!
//! Tracks the last sign of life on a connection and whether an
//! outstanding keepalive has gone unanswered. The connection manager
//! drives the interval; this clock only keeps the state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Shared liveness state for one connection.
#[derive(Debug)]
pub struct HeartbeatClock {
    timeout: Duration,
    last_activity: RwLock<Instant>,
    awaiting_ack: AtomicBool,
}

impl HeartbeatClock {
    /// Clock that declares the connection dead after `timeout` of
    /// silence following a keepalive.
    #[must_use]
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            timeout,
            last_activity: RwLock::new(Instant::now()),
            awaiting_ack: AtomicBool::new(false),
        })
    }

    /// Record any inbound traffic. Every frame counts as life, not just
    /// pongs; busy venues may deprioritize control frames.
    pub fn record_activity(&self) {
        *self.last_activity.write() = Instant::now();
        self.awaiting_ack.store(false, Ordering::SeqCst);
    }

    /// Record that a keepalive was just sent.
    pub fn mark_ping_sent(&self) {
        self.awaiting_ack.store(true, Ordering::SeqCst);
    }

    /// Whether the connection has gone silent past the timeout while a
    /// keepalive is outstanding.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.awaiting_ack.load(Ordering::SeqCst)
            && self.last_activity.read().elapsed() > self.timeout
    }

    /// Time since the last inbound frame. Venues that ping first get
    /// judged on raw silence instead of unanswered keepalives.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity.read().elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_clock_is_alive() {
        let clock = HeartbeatClock::new(Duration::from_millis(10));
        assert!(!clock.is_expired());
    }

    #[test]
    fn silence_without_outstanding_ping_is_fine() {
        let clock = HeartbeatClock::new(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(!clock.is_expired());
    }

    #[test]
    fn unanswered_ping_expires() {
        let clock = HeartbeatClock::new(Duration::from_millis(1));
        clock.mark_ping_sent();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.is_expired());
    }

    #[test]
    fn activity_clears_outstanding_ping() {
        let clock = HeartbeatClock::new(Duration::from_millis(1));
        clock.mark_ping_sent();
        clock.record_activity();
        std::thread::sleep(Duration::from_millis(5));
        assert!(!clock.is_expired());
    }
}
