//! Sync-level error types.

use thiserror::Error;

/// Errors from a chain-data provider request.
///
/// None of these are fatal to a sync: the affected address or transaction is
/// skipped for this pass and retried on the next one.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection refused, reset, non-2xx status and similar.
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Rate limit exceeded (provider: {provider})")]
    RateLimited { provider: String },

    /// The provider answered, but with an error payload.
    #[error("{provider} error: {message}")]
    Provider { provider: String, message: String },

    #[error("Malformed response: {reason}")]
    Malformed { reason: String },

    #[error("Transaction {hash} not found")]
    NotFound { hash: String },

    /// A fetched record failed structural validation.
    #[error("Invalid transaction: {0}")]
    Invalid(String),
}

impl FetchError {
    /// Transient errors worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Timeout { .. } | Self::RateLimited { .. }
        )
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        Self::malformed(e.to_string())
    }
}

/// Errors raised while building a synchronizer. The only errors surfaced
/// synchronously to the caller.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No chain data fetcher configured: an Etherscan key or an Alchemy url is required")]
    MissingFetcher,

    #[error("Missing API key for {provider}")]
    MissingApiKey { provider: String },

    #[error("Invalid provider url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No {provider} endpoint known for chain {chain}")]
    UnsupportedChain { provider: String, chain: String },

    #[error("HTTP client error: {0}")]
    Client(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(FetchError::Http("reset".into()).is_retryable());
        assert!(FetchError::Timeout { ms: 30_000 }.is_retryable());
        assert!(FetchError::RateLimited { provider: "etherscan".into() }.is_retryable());
        assert!(!FetchError::NotFound { hash: "0x".into() }.is_retryable());
        assert!(!FetchError::Provider {
            provider: "alchemy".into(),
            message: "invalid params".into()
        }
        .is_retryable());
    }
}
