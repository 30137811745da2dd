//! Retry state machine for Outline API calls.
//!
//! The policy decision (`RetryPolicy::decide`) is pure so the suspension
//! logic is testable without network timing; `drive` is the async loop
//! that actually sleeps between attempts.
//!
//! Protocol: a rate-limit signal always waits out the server-supplied
//! hint and retries, with no attempt cap. Any other failure retries with
//! capped exponential backoff up to a fixed attempt count, then surfaces
//! an API error carrying the operation's identity.

use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::ClientConfig;

/// Classified outcome of a single request attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    /// Request succeeded
    Success(T),
    /// Server signaled rate limiting with a wait hint
    RateLimited { retry_after: Duration },
    /// Request failed (non-rate-limit status or transport error)
    Failed {
        status: Option<u16>,
        message: String,
    },
}

/// Retry behavior knobs.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempt count for non-rate-limit failures
    pub max_attempts: u32,
    /// First backoff delay; doubles per failure
    pub backoff_base: Duration,
    /// Upper bound on a single backoff delay
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_cap: Duration::from_millis(config.backoff_cap_ms),
        }
    }

    /// Decide the next step after a non-success attempt.
    pub fn decide<T>(&self, state: &mut RetryState, attempt: &Attempt<T>) -> RetryStep {
        match attempt {
            Attempt::Success(_) => RetryStep::Done,
            Attempt::RateLimited { retry_after } => RetryStep::Wait(*retry_after),
            Attempt::Failed { status, message } => {
                state.failures += 1;
                if state.failures >= self.max_attempts {
                    return RetryStep::GiveUp {
                        status: *status,
                        message: message.clone(),
                    };
                }
                let exp = state.failures.saturating_sub(1).min(16);
                let delay = self
                    .backoff_base
                    .saturating_mul(1u32 << exp)
                    .min(self.backoff_cap);
                RetryStep::Wait(delay)
            }
        }
    }
}

/// Progress of one logical operation through its retries.
///
/// Rate-limit waits do not consume the failure budget.
#[derive(Debug, Default)]
pub struct RetryState {
    failures: u32,
}

/// Next action decided by the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStep {
    /// Attempt succeeded; nothing left to do
    Done,
    /// Suspend for the given duration, then retry
    Wait(Duration),
    /// Retries exhausted; surface the failure
    GiveUp {
        status: Option<u16>,
        message: String,
    },
}

/// Run `attempt` under the policy until it succeeds or the policy gives
/// up. `context` identifies the operation in errors and log output.
pub async fn drive<T, F, Fut>(policy: &RetryPolicy, context: &str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Attempt<T>>>,
{
    let mut state = RetryState::default();
    loop {
        let outcome = match attempt().await? {
            Attempt::Success(value) => return Ok(value),
            other => other,
        };
        match policy.decide(&mut state, &outcome) {
            RetryStep::Done => unreachable!("success handled above"),
            RetryStep::Wait(delay) => {
                match &outcome {
                    Attempt::RateLimited { retry_after } => log::warn!(
                        "Rate limited on {context}; waiting {:.1}s",
                        retry_after.as_secs_f64()
                    ),
                    Attempt::Failed { message, .. } => log::warn!(
                        "Attempt failed on {context} ({message}); retrying in {:.1}s",
                        delay.as_secs_f64()
                    ),
                    Attempt::Success(_) => {}
                }
                tokio::time::sleep(delay).await;
            }
            RetryStep::GiveUp { status, message } => {
                return Err(AppError::api(context, message, status));
            }
        }
    }
}
