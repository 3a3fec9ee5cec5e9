//! Request policies shared by every provider client.
//!
//! ```text
//! request → [RateLimiter] → send → [RetryPolicy on transient error] → response
//! ```

pub mod rate_limiter;
pub mod retry;

pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use retry::{RetryConfig, RetryPolicy};
