use rand::Rng;
use std::time::Duration;

/// Randomized logarithmic retry delay: `ln(1 + attempt) * base * rand[0, 1)`,
/// clamped to `max_secs` so unbounded attempt counts stay schedulable.
#[derive(Clone, Debug)]
pub struct Backoff {
    base_secs: f64,
    max_secs: f64,
}

impl Backoff {
    pub fn new(base_secs: f64, max_secs: f64) -> Self {
        Self {
            base_secs,
            max_secs,
        }
    }

    pub fn next(&self, attempt: u32) -> Duration {
        self.delay_for(attempt, rand::thread_rng().gen::<f64>())
    }

    fn delay_for(&self, attempt: u32, unit: f64) -> Duration {
        let secs = (1.0 + f64::from(attempt)).ln() * self.base_secs * unit;
        Duration::from_secs_f64(secs.min(self.max_secs))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(30.0, 900.0)
    }
}
