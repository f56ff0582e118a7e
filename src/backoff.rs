/// Restart delay policy for a player that keeps dying.
///
/// Each failure sleeps for the current delay, then the delay grows by
/// `growth_factor`, capped at `max`. Address switches and stable sessions
/// reset it to `initial`.
use crate::config::BackoffConfig;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    growth_factor: f64,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, growth_factor: f64) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            growth_factor,
            current: initial,
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_secs_f64(config.initial_delay_secs),
            Duration::from_secs_f64(config.max_delay_secs),
            config.growth_factor,
        )
    }

    /// Delay that the next failure will sleep for.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Consume the current delay and grow it for the following failure.
    ///
    /// Returns the delay to sleep now.
    pub fn advance(&mut self) -> Duration {
        let delay = self.current;
        self.current = grow(self.current, self.growth_factor, self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// `min(current * factor, max)`, saturating on overflow or a bad factor.
fn grow(current: Duration, factor: f64, max: Duration) -> Duration {
    let next = current.as_secs_f64() * factor;
    if !next.is_finite() || next < 0.0 || next > max.as_secs_f64() {
        max
    } else {
        Duration::from_secs_f64(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    fn approx(a: Duration, b: f64) -> bool {
        (a.as_secs_f64() - b).abs() < 1e-6
    }

    #[test]
    fn test_three_failures_sequence() {
        let mut b = Backoff::new(secs(3.0), secs(30.0), 1.6);
        assert!(approx(b.advance(), 3.0));
        assert!(approx(b.advance(), 4.8));
        assert!(approx(b.advance(), 7.68));
    }

    #[test]
    fn test_never_exceeds_max_and_non_decreasing() {
        let mut b = Backoff::new(secs(3.0), secs(30.0), 1.6);
        let mut prev = Duration::ZERO;
        for _ in 0..50 {
            let d = b.advance();
            assert!(d >= prev, "delay shrank: {d:?} < {prev:?}");
            assert!(d <= secs(30.0), "delay {d:?} over cap");
            prev = d;
        }
        assert_eq!(b.current(), secs(30.0));
    }

    #[test]
    fn test_reset_returns_to_initial() {
        let mut b = Backoff::new(secs(3.0), secs(30.0), 1.6);
        b.advance();
        b.advance();
        assert!(b.current() > secs(3.0));
        b.reset();
        assert_eq!(b.current(), secs(3.0));
        assert!(approx(b.advance(), 3.0));
    }

    #[test]
    fn test_initial_above_max_is_clamped() {
        let mut b = Backoff::new(secs(60.0), secs(30.0), 2.0);
        assert_eq!(b.advance(), secs(30.0));
        assert_eq!(b.advance(), secs(30.0));
    }

    #[test]
    fn test_factor_one_is_constant() {
        let mut b = Backoff::new(secs(5.0), secs(30.0), 1.0);
        for _ in 0..5 {
            assert_eq!(b.advance(), secs(5.0));
        }
    }

    #[test]
    fn test_huge_factor_saturates() {
        let mut b = Backoff::new(secs(1.0), secs(30.0), f64::MAX);
        b.advance();
        assert_eq!(b.current(), secs(30.0));
    }

    #[test]
    fn test_from_config_defaults() {
        let b = Backoff::from_config(&BackoffConfig::default());
        assert_eq!(b.current(), secs(3.0));
    }
}
