//! Escalation policy
//!
//! Decides what happens to a billing job after one charge attempt. Kept free
//! of I/O so the retry state machine can be checked on its own:
//!
//! ```text
//! Scheduled(n) --charged------------------> Scheduled(0)
//! Scheduled(n) --refused, n+1 <= max------> Scheduled(n+1)
//! Scheduled(n) --refused, n+1 >  max------> Removed
//! ```

use chrono::Duration;
use classbill_core::config::BillingConfig;
use classbill_core::models::BillingJobState;

/// Retry limits applied to failed charges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    /// Failed charges tolerated before the listing is removed
    pub max_retries: u32,

    /// Bring the next attempt forward after a failure instead of waiting
    /// for the next natural period
    pub retry_delay: Option<Duration>,
}

impl EscalationPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            retry_delay: None,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Build from validated config; a delay chrono cannot represent is dropped
    pub fn from_config(config: &BillingConfig) -> Self {
        let policy = Self::new(config.max_retries);
        let delay = config
            .retry_delay_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds);
        match delay {
            Some(delay) => policy.with_retry_delay(delay),
            None => policy,
        }
    }
}

/// What to do with the job after a charge attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingDecision {
    /// Charge went through. `reset` carries the zeroed state when the stored
    /// state still records earlier failures and must be rewritten.
    Paid { reset: Option<BillingJobState> },

    /// Charge refused; store `next` and try again on the next fire
    Retry { next: BillingJobState },

    /// Charge refused and retries are exhausted; disable and unschedule
    Escalate { failures: u32 },
}

/// Apply the policy to the outcome of one charge attempt
pub fn decide(state: BillingJobState, charged: bool, policy: &EscalationPolicy) -> BillingDecision {
    if charged {
        let reset = (state.failure_count > 0).then(|| state.reset());
        return BillingDecision::Paid { reset };
    }

    let next = state.with_failure();
    if next.failure_count <= policy.max_retries {
        BillingDecision::Retry { next }
    } else {
        BillingDecision::Escalate {
            failures: next.failure_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn state(failure_count: u32) -> BillingJobState {
        BillingJobState {
            listing_id: Uuid::nil(),
            failure_count,
        }
    }

    #[test]
    fn test_success_without_history_needs_no_write() {
        let decision = decide(state(0), true, &EscalationPolicy::new(3));
        assert_eq!(decision, BillingDecision::Paid { reset: None });
    }

    #[test]
    fn test_success_after_failures_resets() {
        let decision = decide(state(2), true, &EscalationPolicy::new(3));
        assert_eq!(
            decision,
            BillingDecision::Paid {
                reset: Some(state(0))
            }
        );
    }

    #[test]
    fn test_failures_climb_until_threshold() {
        let policy = EscalationPolicy::new(3);
        let mut current = state(0);

        for expected in 1..=3 {
            match decide(current, false, &policy) {
                BillingDecision::Retry { next } => {
                    assert_eq!(next.failure_count, expected);
                    current = next;
                }
                other => panic!("expected retry, got {:?}", other),
            }
        }

        assert_eq!(
            decide(current, false, &policy),
            BillingDecision::Escalate { failures: 4 }
        );
    }

    #[test]
    fn test_zero_retries_escalates_on_first_failure() {
        assert_eq!(
            decide(state(0), false, &EscalationPolicy::new(0)),
            BillingDecision::Escalate { failures: 1 }
        );
    }

    #[test]
    fn test_policy_from_config() {
        let config = BillingConfig {
            max_retries: 5,
            retry_delay_secs: Some(3600),
            ..BillingConfig::default()
        };

        let policy = EscalationPolicy::from_config(&config);
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.retry_delay, Some(Duration::hours(1)));
        assert_eq!(
            EscalationPolicy::from_config(&BillingConfig::default()).retry_delay,
            None
        );
    }

    #[test]
    fn test_unrepresentable_retry_delay_is_dropped() {
        let config = BillingConfig {
            retry_delay_secs: Some(u64::MAX),
            ..BillingConfig::default()
        };
        assert_eq!(EscalationPolicy::from_config(&config).retry_delay, None);

        let config = BillingConfig {
            retry_delay_secs: Some(i64::MAX as u64),
            ..BillingConfig::default()
        };
        assert_eq!(EscalationPolicy::from_config(&config).retry_delay, None);
    }
}
