//! JSON-over-HTTP client shared by the provider fetchers.
//!
//! Every request passes the rate limiter, carries a bounded timeout and is
//! retried on transient errors. The provider-specific `check` closure turns
//! error payloads (eg an Etherscan "Max rate limit reached" body) into a
//! [`FetchError`] so they are retried like transport errors.

use serde_json::Value;
use std::time::Duration;

use crate::error::{ConfigError, FetchError};
use crate::policy::{RateLimiter, RateLimiterConfig, RetryConfig, RetryPolicy};

/// Transport settings for one provider.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub retry: RetryConfig,
    pub rate_limit: RateLimiterConfig,
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            rate_limit: RateLimiterConfig::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct HttpClient {
    provider: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    limiter: RateLimiter,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(provider: impl Into<String>, config: HttpConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Self {
            provider: provider.into(),
            http,
            retry: RetryPolicy::new(config.retry),
            limiter: RateLimiter::new(config.rate_limit),
            timeout: config.timeout,
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// GET `url` with query parameters.
    pub async fn get<F>(&self, url: &str, query: &[(&str, &str)], check: F) -> Result<Value, FetchError>
    where
        F: Fn(Value) -> Result<Value, FetchError>,
    {
        self.execute(|| self.http.get(url).query(query), check).await
    }

    /// POST a JSON body to `url`.
    pub async fn post<F>(&self, url: &str, body: &Value, check: F) -> Result<Value, FetchError>
    where
        F: Fn(Value) -> Result<Value, FetchError>,
    {
        self.execute(|| self.http.post(url).json(body), check).await
    }

    async fn execute<B, F>(&self, build: B, check: F) -> Result<Value, FetchError>
    where
        B: Fn() -> reqwest::RequestBuilder,
        F: Fn(Value) -> Result<Value, FetchError>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.limiter.acquire().await;
            let result = match self.send_once(build()).await {
                Ok(body) => check(body),
                Err(e) => Err(e),
            };
            let error = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            match self.retry.delay_for(&error, attempt) {
                Some(delay) => {
                    tracing::warn!(
                        provider = %self.provider,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    if error.is_retryable() {
                        tracing::error!(provider = %self.provider, attempt, error = %error, "max retries exceeded");
                    }
                    return Err(error);
                }
            }
        }
    }

    async fn send_once(&self, request: reqwest::RequestBuilder) -> Result<Value, FetchError> {
        let resp = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                provider: self.provider.clone(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Http(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        resp.json::<Value>().await.map_err(|e| self.transport_error(e))
    }

    fn transport_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                ms: self.timeout.as_millis() as u64,
            }
        } else if e.is_decode() {
            FetchError::malformed(e.to_string())
        } else {
            FetchError::Http(e.to_string())
        }
    }
}
