//! LLM provider errors and retry policy.

use std::fmt;
use std::time::Duration;

/// Broad classification used to decide whether a failed call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    RateLimited,
    ServerError,
    ClientError,
    Network,
    Parse,
}

impl fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RateLimited => "rate limit",
            Self::ServerError => "server error",
            Self::ClientError => "client error",
            Self::Network => "network error",
            Self::Parse => "parse error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub status: Option<u16>,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl LlmError {
    fn new(kind: LlmErrorKind, status: Option<u16>, message: String) -> Self {
        Self {
            kind,
            status,
            message,
            retry_after: None,
        }
    }

    pub fn rate_limited(message: String, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(LlmErrorKind::RateLimited, Some(429), message)
        }
    }

    pub fn server_error(status: u16, message: String) -> Self {
        Self::new(LlmErrorKind::ServerError, Some(status), message)
    }

    pub fn client_error(status: u16, message: String) -> Self {
        Self::new(LlmErrorKind::ClientError, Some(status), message)
    }

    pub fn network_error(message: String) -> Self {
        Self::new(LlmErrorKind::Network, None, message)
    }

    pub fn parse_error(message: String) -> Self {
        Self::new(LlmErrorKind::Parse, None, message)
    }

    /// Delay before retry `attempt` (0-based): the server's `Retry-After` when
    /// given, else exponential backoff from one second.
    pub fn suggested_delay(&self, attempt: u32) -> Duration {
        if let Some(after) = self.retry_after {
            return after;
        }
        Duration::from_secs(1u64 << attempt.min(6))
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}): {}", self.kind, status, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for LlmError {}

pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        429 => LlmErrorKind::RateLimited,
        500..=599 => LlmErrorKind::ServerError,
        _ => LlmErrorKind::ClientError,
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub max_retry_duration: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_retry_duration: Duration::from_secs(45),
        }
    }
}

impl RetryConfig {
    pub fn should_retry(&self, error: &LlmError) -> bool {
        matches!(
            error.kind,
            LlmErrorKind::RateLimited | LlmErrorKind::ServerError | LlmErrorKind::Network
        )
    }
}
