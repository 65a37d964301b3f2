use std::time::Duration;

/// Bounded exponential backoff between reconnect attempts.
///
/// The delay starts at `initial_delay`, doubles for every further attempt and
/// is capped at `max_delay`. After `max_attempts` the policy gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
            max_attempts: 6,
        }
    }
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Swaps inverted bounds and keeps delays at 1ms or more.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.initial_delay = self.initial_delay.max(Duration::from_millis(1));
        self.max_delay = self.max_delay.max(Duration::from_millis(1));
        if self.initial_delay > self.max_delay {
            std::mem::swap(&mut self.initial_delay, &mut self.max_delay);
        }
        self
    }

    /// Delay before attempt number `attempt` (1-based), or `None` to stop.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if !self.enabled || attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        Some(self.initial_delay.saturating_mul(factor).min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1, Some(1))]
    #[case(2, Some(2))]
    #[case(4, Some(8))]
    #[case(6, Some(32))]
    #[case(7, None)]
    #[case(0, None)]
    fn doubles_until_capped_then_gives_up(#[case] attempt: u32, #[case] seconds: Option<u64>) {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(attempt), seconds.map(Duration::from_secs));
    }

    #[test]
    fn cap_applies_before_attempts_run_out() {
        let policy = ReconnectPolicy {
            max_attempts: 40,
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.delay_for(40), Some(Duration::from_secs(32)));
    }

    #[test]
    fn disabled_policy_never_retries() {
        assert_eq!(ReconnectPolicy::disabled().delay_for(1), None);
    }

    #[test]
    fn normalized_swaps_inverted_bounds() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::ZERO,
            ..ReconnectPolicy::default()
        }
        .normalized();
        assert_eq!(policy.initial_delay, Duration::from_millis(1));
        assert_eq!(policy.max_delay, Duration::from_secs(5));
    }
}
