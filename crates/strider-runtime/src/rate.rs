//! [`ControlRate`] – fixed-frequency pacing for the host tick loop.
//!
//! Sleeps the remainder of each period. When a tick overruns, the
//! schedule resynchronizes from now instead of trying to catch up
//! with a burst of back-to-back ticks.

use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
#[error("control rate must be positive, got {0} hz")]
pub struct InvalidRate(pub f64);

/// Paces a loop at a fixed frequency.
pub struct ControlRate {
    period: Duration,
    next_tick: Instant,
}

impl ControlRate {
    /// # Errors
    ///
    /// [`InvalidRate`] when `hz` is zero, negative, or not finite.
    pub fn new(hz: f64) -> Result<Self, InvalidRate> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(InvalidRate(hz));
        }
        let period = Duration::from_secs_f64(1.0 / hz);
        Ok(Self {
            period,
            next_tick: Instant::now() + period,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Sleep out the rest of the current period.
    pub fn sleep(&mut self) {
        let now = Instant::now();
        if now < self.next_tick {
            thread::sleep(self.next_tick - now);
            self.next_tick += self.period;
        } else {
            let behind = now - self.next_tick;
            warn!(?behind, "control tick overran its period, resynchronizing");
            self.next_tick = now + self.period;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_rates() {
        assert!(ControlRate::new(0.0).is_err());
        assert!(ControlRate::new(-50.0).is_err());
        assert!(ControlRate::new(f64::NAN).is_err());
    }

    #[test]
    fn period_matches_frequency() {
        let rate = ControlRate::new(50.0).unwrap();
        assert_eq!(rate.period(), Duration::from_millis(20));
    }

    #[test]
    fn sleep_paces_the_loop() {
        let mut rate = ControlRate::new(200.0).unwrap();
        let start = Instant::now();
        rate.sleep();
        rate.sleep();
        assert!(start.elapsed() >= Duration::from_millis(9));
    }

    #[test]
    fn overrun_resynchronizes_instead_of_bursting() {
        let mut rate = ControlRate::new(500.0).unwrap();
        thread::sleep(Duration::from_millis(10));
        // The schedule is behind; this call must return promptly and
        // re-anchor rather than sleeping a negative duration.
        let start = Instant::now();
        rate.sleep();
        assert!(start.elapsed() < Duration::from_millis(5));
    }
}
