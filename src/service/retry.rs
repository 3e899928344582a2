//! Bounded-retry combinator.
//!
//! [`bounded`] runs an attempt closure up to `max_attempts` times,
//! back-to-back, and reports a tagged [`RetryOutcome`] instead of throwing
//! on the last iteration.

use std::future::Future;

/// Classification of one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure<E> {
    /// Another attempt may succeed.
    Retryable(E),
    /// Stop now; further attempts are pointless.
    Fatal(E),
}

/// Result of a bounded retry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    /// An attempt succeeded.
    Succeeded {
        /// Value from the successful attempt.
        value: T,
        /// Attempts performed, including the successful one.
        attempts: u32,
    },
    /// Every allowed attempt failed with a retryable error.
    Exhausted {
        /// Error of the final attempt.
        error: E,
        /// Attempts performed.
        attempts: u32,
    },
    /// An attempt failed fatally before the bound was reached.
    Aborted {
        /// The fatal error.
        error: E,
        /// Attempts performed, including the fatal one.
        attempts: u32,
    },
}

impl<T, E> RetryOutcome<T, E> {
    /// Number of attempts performed.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Aborted { attempts, .. } => *attempts,
        }
    }
}

/// Runs `attempt(n)` for `n = 1..=max_attempts` until it succeeds, fails
/// fatally, or the bound is reached.
///
/// `on_retry(n, &error)` is called after every retryable failure that will
/// be followed by another attempt. A `max_attempts` of zero is treated as
/// one.
pub async fn bounded<T, E, F, Fut>(
    max_attempts: u32,
    mut attempt: F,
    mut on_retry: impl FnMut(u32, &E),
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Failure<E>>>,
{
    let max_attempts = max_attempts.max(1);
    let mut n = 1;
    loop {
        match attempt(n).await {
            Ok(value) => return RetryOutcome::Succeeded { value, attempts: n },
            Err(Failure::Fatal(error)) => return RetryOutcome::Aborted { error, attempts: n },
            Err(Failure::Retryable(error)) if n >= max_attempts => {
                return RetryOutcome::Exhausted { error, attempts: n };
            }
            Err(Failure::Retryable(error)) => {
                on_retry(n, &error);
                n = n.saturating_add(1);
            }
        }
    }
}
