use std::time::Duration;

use crate::error::ConfigError;

/// Thresholds after which an idle device is unreachable, then evicted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    reachable_after: Duration,
    evict_after: Duration,
}

impl StalenessPolicy {
    pub fn new(reachable_after: Duration, evict_after: Duration) -> Result<Self, ConfigError> {
        if evict_after <= reachable_after {
            return Err(ConfigError::Staleness {
                reachable_after,
                evict_after,
            });
        }

        Ok(StalenessPolicy {
            reachable_after,
            evict_after,
        })
    }

    /// Thresholds expressed as multiples of the read interval
    pub fn from_interval(
        interval: Duration,
        reachable_multiplier: u32,
        evict_multiplier: u32,
    ) -> Result<Self, ConfigError> {
        Self::new(
            interval * reachable_multiplier,
            interval * evict_multiplier,
        )
    }

    pub fn reachable_after(&self) -> Duration {
        self.reachable_after
    }

    pub fn evict_after(&self) -> Duration {
        self.evict_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn historical_ratios_are_both_valid() {
        let interval = Duration::from_secs(60);

        let short = StalenessPolicy::from_interval(interval, 5, 10).unwrap();
        assert_eq!(short.reachable_after(), Duration::from_secs(300));
        assert_eq!(short.evict_after(), Duration::from_secs(600));

        let long = StalenessPolicy::from_interval(interval, 10, 20).unwrap();
        assert_eq!(long.reachable_after(), Duration::from_secs(600));
        assert_eq!(long.evict_after(), Duration::from_secs(1200));
    }

    #[test]
    fn evict_must_exceed_reachable() {
        let interval = Duration::from_secs(60);

        assert!(matches!(
            StalenessPolicy::from_interval(interval, 10, 10),
            Err(ConfigError::Staleness { .. })
        ));
        assert!(StalenessPolicy::new(Duration::from_secs(10), Duration::from_secs(5)).is_err());
    }
}
