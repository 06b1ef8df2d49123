use rand::Rng;
use std::time::Duration;

/// Exponential delay between `base` and `max`, optionally jittered.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self { base, max, jitter }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let mut rng = rand::thread_rng();
        self.delay_with_rng(attempt, &mut rng)
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        let shift = attempt.min(16);
        let exp = base_ms.saturating_mul(1u64 << shift).min(max_ms);
        let delay_ms = if self.jitter {
            // Keep at least half of the exponential step so a settle wait never collapses to zero.
            rng.gen_range(exp / 2..=exp)
        } else {
            exp
        };
        Duration::from_millis(delay_ms)
    }

    /// Upper bound of the total time spent sleeping over `attempts` delays.
    pub fn worst_case(&self, attempts: u32) -> Duration {
        (0..attempts).fold(Duration::ZERO, |acc, attempt| {
            let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
            let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
            let step = base_ms.saturating_mul(1u64 << attempt.min(16)).min(max_ms);
            acc.saturating_add(Duration::from_millis(step))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn backoff_without_jitter_is_exponential() {
        let backoff = Backoff::new(
            Duration::from_millis(100),
            Duration::from_millis(800),
            false,
        );
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            backoff.delay_with_rng(0, &mut rng),
            Duration::from_millis(100)
        );
        assert_eq!(
            backoff.delay_with_rng(1, &mut rng),
            Duration::from_millis(200)
        );
        assert_eq!(
            backoff.delay_with_rng(2, &mut rng),
            Duration::from_millis(400)
        );
        assert_eq!(
            backoff.delay_with_rng(3, &mut rng),
            Duration::from_millis(800)
        );
        assert_eq!(
            backoff.delay_with_rng(4, &mut rng),
            Duration::from_millis(800)
        );
    }

    #[test]
    fn backoff_with_jitter_stays_within_half_step_and_cap() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(800), true);
        let mut rng = StdRng::seed_from_u64(42);
        let delay = backoff.delay_with_rng(3, &mut rng);
        assert!(delay <= Duration::from_millis(800));
        assert!(delay >= Duration::from_millis(400));
    }

    #[test]
    fn worst_case_sums_capped_steps() {
        let backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(1), true);
        assert_eq!(backoff.worst_case(3), Duration::from_millis(2500));
        assert_eq!(backoff.worst_case(0), Duration::ZERO);
    }
}
