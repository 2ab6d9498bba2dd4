//! The tool-execution retry policy and its external-config bridge
//! (`spec.md` §4.7.2).

use crate::clock::Clock;
use crate::error::RuntimeError;

/// `{initial-ns, factor, max-attempts, max-ns}`. `max_attempts == 0`
/// is the "zero-attempt" pass-through case: the call runs once with no
/// retry wrapping and no backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_ns: u64,
    pub factor: f64,
    pub max_attempts: u32,
    pub max_ns: u64,
}

impl RetryPolicy {
    pub fn passthrough() -> Self {
        Self {
            initial_ns: 0,
            factor: 1.0,
            max_attempts: 0,
            max_ns: 0,
        }
    }

    fn delay_before_attempt(&self, attempt: u32) -> u64 {
        if attempt <= 1 {
            return 0;
        }
        let exponent = (attempt - 2) as i32;
        let scaled = self.initial_ns as f64 * self.factor.powi(exponent);
        if !scaled.is_finite() || scaled < 0.0 {
            return self.max_ns;
        }
        (scaled as u64).min(self.max_ns)
    }

    /// Runs `attempt` up to `max_attempts` times (or once, if
    /// `max_attempts == 0`), sleeping via `clock` between attempts.
    /// Returns the first success. On the zero-attempt pass-through the
    /// last error is propagated as-is; otherwise it's wrapped in
    /// `retries-exhausted(attempts, cause)`.
    pub async fn run<T, E, F, Fut>(&self, clock: &dyn Clock, mut attempt: F) -> Result<T, RuntimeError>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: Into<RuntimeError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error: Option<RuntimeError> = None;
        for n in 1..=attempts {
            if n > 1 {
                let delay = self.delay_before_attempt(n);
                tracing::debug!(attempt = n, max_attempts = attempts, delay_ns = delay, "retrying after delay");
                clock.sleep(delay).await;
            }
            match attempt(n).await {
                Ok(value) => return Ok(value),
                Err(e) => last_error = Some(e.into()),
            }
        }
        let last_error = last_error.expect("loop runs at least once");
        if self.max_attempts == 0 {
            Err(last_error)
        } else {
            tracing::warn!(attempts, error = %last_error, "retries exhausted");
            Err(RuntimeError::RetriesExhausted {
                attempts,
                cause: last_error.to_string(),
            })
        }
    }
}

/// Normalizes an externally-supplied duration in (possibly
/// non-finite) seconds into nanoseconds: negative or `NaN` clamps to
/// `0`; positive finite values saturating-cast to `u64` nanoseconds.
pub fn normalize_duration_seconds(seconds: f64) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    let nanos = seconds * 1_000_000_000.0;
    if nanos >= u64::MAX as f64 {
        u64::MAX
    } else {
        nanos as u64
    }
}

/// The backoff shape an external, domain-specific retry config
/// declares.
#[derive(Debug, Clone)]
pub enum ExternalBackoff {
    /// A standard exponential schedule in domain units (seconds).
    Exponential {
        initial_seconds: f64,
        factor: f64,
        max_seconds: f64,
    },
    /// A backoff shape this runtime doesn't model; named for the
    /// lossy-mapping debug event.
    Custom(String),
}

/// An externally-supplied retry configuration, in domain units.
#[derive(Debug, Clone)]
pub struct ExternalRetryConfig {
    pub backoff: ExternalBackoff,
    pub max_attempts: u32,
}

/// The fixed schedule unsupported custom backoff variants are bridged
/// to: `{1s, ×2.0, maxAttempts, 60s}`.
const CUSTOM_BACKOFF_INITIAL_SECONDS: f64 = 1.0;
const CUSTOM_BACKOFF_FACTOR: f64 = 2.0;
const CUSTOM_BACKOFF_MAX_SECONDS: f64 = 60.0;

/// Bridges an [`ExternalRetryConfig`] into a [`RetryPolicy`]. Returns a
/// `customDebug("retry.policy.lossy")` warning message when the
/// external config named an unsupported backoff variant.
pub fn bridge_retry_policy(config: &ExternalRetryConfig) -> (RetryPolicy, Option<String>) {
    match &config.backoff {
        ExternalBackoff::Exponential {
            initial_seconds,
            factor,
            max_seconds,
        } => (
            RetryPolicy {
                initial_ns: normalize_duration_seconds(*initial_seconds),
                factor: *factor,
                max_attempts: config.max_attempts,
                max_ns: normalize_duration_seconds(*max_seconds),
            },
            None,
        ),
        ExternalBackoff::Custom(name) => (
            RetryPolicy {
                initial_ns: normalize_duration_seconds(CUSTOM_BACKOFF_INITIAL_SECONDS),
                factor: CUSTOM_BACKOFF_FACTOR,
                max_attempts: config.max_attempts,
                max_ns: normalize_duration_seconds(CUSTOM_BACKOFF_MAX_SECONDS),
            },
            Some(format!("retry.policy.lossy: unsupported backoff `{name}`")),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn normalize_clamps_negative_and_nan_to_zero() {
        assert_eq!(normalize_duration_seconds(-1.0), 0);
        assert_eq!(normalize_duration_seconds(f64::NAN), 0);
        assert_eq!(normalize_duration_seconds(0.0), 0);
    }

    #[test]
    fn normalize_casts_positive_seconds_to_nanoseconds() {
        assert_eq!(normalize_duration_seconds(1.0), 1_000_000_000);
    }

    #[test]
    fn custom_backoff_emits_lossy_warning() {
        let config = ExternalRetryConfig {
            backoff: ExternalBackoff::Custom("decorrelatedJitter".to_string()),
            max_attempts: 5,
        };
        let (policy, warning) = bridge_retry_policy(&config);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_ns, 1_000_000_000);
        assert!(warning.unwrap().contains("retry.policy.lossy"));
    }

    #[tokio::test]
    async fn retries_exhausted_counts_every_attempt() {
        let clock = SimulatedClock::new();
        let policy = RetryPolicy {
            initial_ns: 10,
            factor: 2.0,
            max_attempts: 3,
            max_ns: 1000,
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), RuntimeError> = policy
            .run(&clock, |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), RuntimeError>(RuntimeError::ToolFailed {
                        tool: "t".to_string(),
                        cause: "boom".to_string(),
                    })
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(RuntimeError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected retries-exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn passthrough_policy_invokes_exactly_once() {
        let clock = SimulatedClock::new();
        let policy = RetryPolicy::passthrough();
        let calls = AtomicU32::new(0);
        let _: Result<(), RuntimeError> = policy
            .run(&clock, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), RuntimeError>(RuntimeError::ToolFailed {
                        tool: "t".to_string(),
                        cause: "boom".to_string(),
                    })
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_without_exhausting_retries() {
        let clock = SimulatedClock::new();
        let policy = RetryPolicy {
            initial_ns: 10,
            factor: 2.0,
            max_attempts: 3,
            max_ns: 1000,
        };
        let result: Result<i32, RuntimeError> = policy
            .run(&clock, |attempt| async move {
                if attempt < 2 {
                    Err(RuntimeError::ToolFailed {
                        tool: "t".to_string(),
                        cause: "boom".to_string(),
                    })
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
    }
}
