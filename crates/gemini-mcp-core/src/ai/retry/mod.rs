//! Rate limiting and retry logic
//!
//! Provides exponential backoff with jitter for handling API rate limits and transient errors.
//! Every dispatcher-level backend call goes through [`with_retry`] with its own state.

mod backoff;

pub use backoff::{with_retry, IsRetryable, RetryConfig, RetryError};
