use tarn_common::QueuePolicy;

use crate::monitor::HealthZone;

/// Pure function over policy and health score (C2). Consulted once per poll
/// tick; the worker pool applies the result only to future dispatch, never
/// to tasks already in flight.
pub struct AdaptiveScaler;

impl AdaptiveScaler {
    pub fn target_concurrency(policy: &QueuePolicy, score: u8) -> usize {
        if !policy.enable_adaptive {
            return policy.max;
        }

        match HealthZone::from_score(score) {
            HealthZone::Safe => policy.max,
            HealthZone::Warning => {
                let midpoint = (policy.min + policy.max) as f64 / 2.0;
                (midpoint.round() as usize).clamp(policy.min, policy.max)
            }
            HealthZone::Critical => policy.min,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(min: usize, max: usize, adaptive: bool) -> QueuePolicy {
        QueuePolicy {
            min,
            max,
            batch_size: 10,
            poll_interval_secs: 5,
            lease_ttl_secs: 300,
            enable_adaptive: adaptive,
        }
    }

    #[test]
    fn target_concurrency_scales_between_min_and_max_by_zone() {
        let p = policy(50, 500, true);
        assert_eq!(AdaptiveScaler::target_concurrency(&p, 80), 500);
        assert_eq!(AdaptiveScaler::target_concurrency(&p, 50), 275);
        assert_eq!(AdaptiveScaler::target_concurrency(&p, 10), 50);
    }

    #[test]
    fn disabled_adaptive_always_returns_max() {
        let p = policy(1, 16, false);
        assert_eq!(AdaptiveScaler::target_concurrency(&p, 0), 16);
        assert_eq!(AdaptiveScaler::target_concurrency(&p, 100), 16);
    }

    #[test]
    fn output_always_within_bounds() {
        let p = policy(3, 20, true);
        for score in 0..=100u8 {
            let target = AdaptiveScaler::target_concurrency(&p, score);
            assert!(target >= p.min && target <= p.max);
        }
    }
}
