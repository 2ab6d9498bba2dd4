//! The per-thread tool circuit breaker (`spec.md` §4.7).

use serde::{Deserialize, Serialize};

/// `{failureThreshold, cooldownSteps}`.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerPolicy {
    pub failure_threshold: u32,
    pub cooldown_steps: u64,
}

/// The breaker's checkpointed state: `failureStreak` and
/// `circuitOpenedAtStep`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub failure_streak: u32,
    pub opened_at_step: Option<u64>,
}

impl CircuitBreakerState {
    /// Returns whether the circuit is open at `current_step`, resetting
    /// it first if the cooldown has elapsed.
    pub fn check(&mut self, policy: &CircuitBreakerPolicy, current_step: u64) -> bool {
        match self.opened_at_step {
            Some(opened_at) if current_step.saturating_sub(opened_at) >= policy.cooldown_steps => {
                self.opened_at_step = None;
                self.failure_streak = 0;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Records a tool failure, opening the circuit if the streak now
    /// meets `failure_threshold`.
    pub fn record_failure(&mut self, policy: &CircuitBreakerPolicy, current_step: u64) {
        self.failure_streak += 1;
        if self.failure_streak >= policy.failure_threshold && self.opened_at_step.is_none() {
            self.opened_at_step = Some(current_step);
        }
    }

    /// Any success resets the streak.
    pub fn record_success(&mut self) {
        self.failure_streak = 0;
        self.opened_at_step = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CircuitBreakerPolicy {
        CircuitBreakerPolicy {
            failure_threshold: 3,
            cooldown_steps: 2,
        }
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let policy = policy();
        let mut state = CircuitBreakerState::default();
        for step in 0..3 {
            assert!(!state.check(&policy, step));
            state.record_failure(&policy, step);
        }
        assert!(state.check(&policy, 3));
    }

    #[test]
    fn success_resets_streak() {
        let policy = policy();
        let mut state = CircuitBreakerState::default();
        state.record_failure(&policy, 0);
        state.record_failure(&policy, 1);
        state.record_success();
        assert_eq!(state.failure_streak, 0);
        state.record_failure(&policy, 2);
        assert!(!state.check(&policy, 2));
    }

    #[test]
    fn closes_after_cooldown_elapses() {
        let policy = policy();
        let mut state = CircuitBreakerState::default();
        for step in 0..3 {
            state.record_failure(&policy, step);
        }
        assert!(state.check(&policy, 3));
        assert!(!state.check(&policy, 4));
        assert!(!state.check(&policy, 5));
        assert_eq!(state.failure_streak, 0);
    }
}
