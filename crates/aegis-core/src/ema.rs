//! Exponentially-weighted moving average.

/// Smoothing factor used by the workspace for success rates and timings.
pub const DEFAULT_SMOOTHING: f64 = 0.1;

/// An exponentially-weighted moving average.
///
/// The first observation seeds the average directly; each subsequent
/// observation moves it by `alpha * (sample - value)`.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    /// Creates an empty average with the given smoothing factor.
    pub fn new(alpha: f64) -> Self {
        Self { alpha, value: None }
    }

    /// Creates an average seeded with an initial value.
    pub fn seeded(alpha: f64, initial: f64) -> Self {
        Self {
            alpha,
            value: Some(initial),
        }
    }

    /// Folds a sample into the average and returns the new value.
    pub fn observe(&mut self, sample: f64) -> f64 {
        let next = match self.value {
            None => sample,
            Some(current) => self.alpha * sample + (1.0 - self.alpha) * current,
        };
        self.value = Some(next);
        next
    }

    /// Current value, if any sample has been observed.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Current value, or `default` before the first sample.
    pub fn value_or(&self, default: f64) -> f64 {
        self.value.unwrap_or(default)
    }
}

impl Default for Ema {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_seeds_the_average() {
        let mut ema = Ema::new(0.1);
        assert_eq!(ema.value(), None);
        assert_eq!(ema.observe(10.0), 10.0);
    }

    #[test]
    fn subsequent_samples_are_smoothed() {
        let mut ema = Ema::new(0.5);
        ema.observe(10.0);
        assert_eq!(ema.observe(20.0), 15.0);
        assert_eq!(ema.observe(15.0), 15.0);
    }

    #[test]
    fn seeded_average_starts_at_initial() {
        let ema = Ema::seeded(0.1, 1.0);
        assert_eq!(ema.value_or(0.0), 1.0);
    }
}
