use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },
    #[error("non-retryable failure on attempt {attempt}: {error}")]
    NonRetryable { attempt: u32, error: E },
    #[error("fallback failed after {attempts} primary attempts: {error}")]
    FallbackFailed { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::FallbackFailed { attempts, .. } => {
                *attempts
            }
            RetryError::NonRetryable { attempt, .. } => *attempt,
        }
    }

    /// The underlying operation error.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::NonRetryable { error, .. } | RetryError::FallbackFailed { error, .. } => error,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

/// Failure reported by a task executor. Only failures explicitly marked
/// retryable are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct TaskFailure {
    pub message: String,
    pub retryable: bool,
}

impl TaskFailure {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl Retryable for TaskFailure {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl Retryable for anyhow::Error {
    fn is_retryable(&self) -> bool {
        self.downcast_ref::<TaskFailure>()
            .is_some_and(|failure| failure.retryable)
    }
}
