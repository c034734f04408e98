//! Reconnection Backoff
//!
//! Exponential backoff with jitter for reconnecting venue sockets.
//! Delays grow per failed attempt and reset on a healthy session.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::CrawlerSettings;

const JITTER_FRACTION: f64 = 0.1;

/// Exponential backoff schedule with ±10% jitter.
#[derive(Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    /// Backoff tuned from crawler settings.
    #[must_use]
    pub const fn new(settings: &CrawlerSettings) -> Self {
        Self {
            initial: settings.reconnect_delay_initial,
            max: settings.reconnect_delay_max,
            multiplier: settings.reconnect_multiplier,
            max_attempts: settings.max_reconnect_attempts,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are
    /// exhausted. Advances the attempt counter.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts > 0 && self.attempt >= self.max_attempts {
            return None;
        }
        let exponent = self.attempt;
        self.attempt += 1;

        #[allow(clippy::cast_precision_loss)]
        let base_ms = self.initial.as_millis() as f64 * self.multiplier.powi(exponent as i32);
        #[allow(clippy::cast_precision_loss)]
        let capped_ms = base_ms.min(self.max.as_millis() as f64);

        Some(jittered(capped_ms))
    }

    /// 1-based attempt counter since the last reset.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Forget accumulated failures after a healthy session.
    pub const fn reset(&mut self) {
        self.attempt = 0;
    }
}

fn jittered(base_ms: f64) -> Duration {
    let spread = base_ms * JITTER_FRACTION;
    let jitter: f64 = if spread > 0.0 {
        rand::rng().random_range(-spread..=spread)
    } else {
        0.0
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Duration::from_millis((base_ms + jitter).max(1.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(initial_ms: u64, max_secs: u64, max_attempts: u32) -> CrawlerSettings {
        CrawlerSettings {
            reconnect_delay_initial: Duration::from_millis(initial_ms),
            reconnect_delay_max: Duration::from_secs(max_secs),
            reconnect_multiplier: 2.0,
            max_reconnect_attempts: max_attempts,
            ..CrawlerSettings::default()
        }
    }

    fn within_jitter(delay: Duration, base_ms: u64) {
        let ms = delay.as_millis() as u64;
        let spread = base_ms / 10;
        assert!(
            ms >= base_ms - spread && ms <= base_ms + spread,
            "{ms}ms outside {base_ms}ms ±10%"
        );
    }

    #[test]
    fn delays_double_per_attempt() {
        let mut backoff = Backoff::new(&settings(1000, 64, 0));
        within_jitter(backoff.next_delay().unwrap(), 1000);
        within_jitter(backoff.next_delay().unwrap(), 2000);
        within_jitter(backoff.next_delay().unwrap(), 4000);
    }

    #[test]
    fn delays_cap_at_max() {
        let mut backoff = Backoff::new(&settings(1000, 2, 0));
        let _ = backoff.next_delay();
        let _ = backoff.next_delay();
        // 4000ms uncapped, capped to 2000ms.
        within_jitter(backoff.next_delay().unwrap(), 2000);
        within_jitter(backoff.next_delay().unwrap(), 2000);
    }

    #[test]
    fn attempts_exhaust() {
        let mut backoff = Backoff::new(&settings(10, 1, 2));
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn reset_restarts_the_schedule() {
        let mut backoff = Backoff::new(&settings(1000, 64, 0));
        let _ = backoff.next_delay();
        let _ = backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        within_jitter(backoff.next_delay().unwrap(), 1000);
    }

    #[test]
    fn zero_max_attempts_means_unlimited() {
        let mut backoff = Backoff::new(&settings(1, 1, 0));
        for _ in 0..500 {
            assert!(backoff.next_delay().is_some());
        }
    }
}
