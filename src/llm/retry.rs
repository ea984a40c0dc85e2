use std::future::Future;

use crate::core::errors::{FailureKind, PipelineError, PipelineResult, TransientFailure};

/// Outcome of one failed attempt.
#[derive(Debug)]
pub enum AttemptError {
    /// Worth another try against a freshly chosen endpoint.
    Transient(TransientFailure),
    /// Stops the loop immediately.
    Fatal(PipelineError),
}

impl From<TransientFailure> for AttemptError {
    fn from(failure: TransientFailure) -> Self {
        AttemptError::Transient(failure)
    }
}

impl From<PipelineError> for AttemptError {
    fn from(err: PipelineError) -> Self {
        AttemptError::Fatal(err)
    }
}

/// Run `attempt` up to `max_retries` times (at least once), sequentially.
///
/// Every failure class is retried the same way; the class only changes the
/// log line. On exhaustion the last failure is carried in the error.
pub async fn with_retries<F, Fut, T>(
    provider: &str,
    max_retries: u32,
    mut attempt: F,
) -> PipelineResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let attempts = max_retries.max(1);
    let mut last: Option<TransientFailure> = None;

    for n in 1..=attempts {
        match attempt(n).await {
            Ok(value) => {
                if n > 1 {
                    tracing::info!("{} call succeeded on attempt {}/{}", provider, n, attempts);
                }
                return Ok(value);
            }
            Err(AttemptError::Fatal(err)) => return Err(err),
            Err(AttemptError::Transient(failure)) => {
                match failure.kind {
                    FailureKind::Unreachable => tracing::warn!(
                        "{} attempt {}/{}: server unreachable: {}",
                        provider,
                        n,
                        attempts,
                        failure.message
                    ),
                    FailureKind::RateLimited => tracing::warn!(
                        "{} attempt {}/{}: rate limited: {}",
                        provider,
                        n,
                        attempts,
                        failure.message
                    ),
                    FailureKind::ApiStatus(status) => tracing::warn!(
                        "{} attempt {}/{}: API status {}: {}",
                        provider,
                        n,
                        attempts,
                        status,
                        failure.message
                    ),
                }
                last = Some(failure);
            }
        }
    }

    Err(PipelineError::ProviderExhausted {
        provider: provider.to_string(),
        attempts,
        last: last.unwrap_or_else(|| TransientFailure::unreachable("no attempt was made")),
    })
}
