//! Errors raised while talking to a chat-completions provider.

use std::time::Duration;

use pipeline::CapabilityError;
use thiserror::Error;

/// Longest slice of a provider error body kept in an error message.
const BODY_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Settings are unusable (missing API key, bad URL). Raised at startup.
    #[error("LLM misconfiguration: {0}")]
    Misconfiguration(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP 401 or 403.
    #[error("provider rejected credentials (HTTP {status}): {body}")]
    ProviderAuth { status: u16, body: String },

    /// HTTP 429.
    #[error("provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// HTTP 5xx.
    #[error("provider outage (HTTP {status}): {body}")]
    ProviderOutage { status: u16, body: String },

    /// Any other non-success status.
    #[error("unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The response arrived but could not be turned into domain data.
    #[error("malformed provider response: {0}")]
    Parse(String),
}

impl LlmError {
    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16, body: &str) -> Self {
        let body: String = body.chars().take(BODY_EXCERPT_CHARS).collect();
        match status {
            401 | 403 => Self::ProviderAuth { status, body },
            429 => Self::ProviderQuota(body),
            500..=599 => Self::ProviderOutage { status, body },
            _ => Self::UnexpectedStatus { status, body },
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<LlmError> for CapabilityError {
    fn from(err: LlmError) -> Self {
        let message = err.to_string();
        match err {
            LlmError::ProviderAuth { .. } => CapabilityError::Auth(message),
            LlmError::ProviderQuota(_)
            | LlmError::ProviderOutage { .. }
            | LlmError::Misconfiguration(_) => CapabilityError::Unavailable(message),
            LlmError::Parse(_) => CapabilityError::Parse(message),
            LlmError::Transport(_)
            | LlmError::Timeout(_)
            | LlmError::UnexpectedStatus { .. } => CapabilityError::Transport(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_capability_errors() {
        let cases = [
            (401, "auth"),
            (403, "auth"),
            (429, "unavailable"),
            (500, "unavailable"),
            (503, "unavailable"),
            (404, "transport"),
        ];
        for (status, expected) in cases {
            let mapped: CapabilityError = LlmError::from_status(status, "nope").into();
            let kind = match mapped {
                CapabilityError::Auth(_) => "auth",
                CapabilityError::Unavailable(_) => "unavailable",
                CapabilityError::Transport(_) => "transport",
                CapabilityError::Parse(_) => "parse",
            };
            assert_eq!(kind, expected, "status {status}");
        }
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1000);
        match LlmError::from_status(500, &body) {
            LlmError::ProviderOutage { body, .. } => assert_eq!(body.len(), BODY_EXCERPT_CHARS),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_failures_stay_parse_failures() {
        let mapped: CapabilityError = LlmError::Parse("bad json".into()).into();
        assert!(matches!(mapped, CapabilityError::Parse(m) if m.contains("bad json")));
    }
}
