// Retry/Fallback executor
//
// Backoff waits are tokio sleeps, so a retrying operation yields to the
// runtime instead of blocking a worker thread.

pub mod config;
pub mod error;
pub mod executor;

pub use config::{RetryConfig, RetryStrategy};
pub use error::{RetryError, Retryable, TaskFailure};
pub use executor::{execute_with_retry, execute_with_retry_and_fallback, RetryExecutor};
