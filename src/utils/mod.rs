//! Utility modules supporting library operations.
//!
//! - [`RetryConfig`]: Configuration for retry logic with exponential backoff
//! - [`with_retry`]: Execute an operation with automatic retry on transient errors
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use bibcite::library::CollectionPathResolver;
//! use bibcite::utils::{with_retry, RetryConfig};
//!
//! # async fn example(resolver: CollectionPathResolver) -> Result<(), bibcite::library::LibraryError> {
//! let libraries = with_retry(RetryConfig::with_retries(3), || resolver.fetch_libraries()).await?;
//! # Ok(())
//! # }
//! ```

mod retry;

pub use retry::{with_retry, RetryConfig};
