use std::time::Duration;

use pipeline::CapabilityError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("integration misconfigured: {0}")]
    Misconfiguration(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("{service} answered HTTP {status}")]
    Status { service: &'static str, status: u16 },

    #[error("unexpected response from {service}: {message}")]
    Parse {
        service: &'static str,
        message: String,
    },
}

impl IntegrationError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<IntegrationError> for CapabilityError {
    fn from(err: IntegrationError) -> Self {
        let message = err.to_string();
        match err {
            IntegrationError::Status {
                status: 401 | 403, ..
            } => CapabilityError::Auth(message),
            IntegrationError::Status {
                status: 429 | 500..=599,
                ..
            }
            | IntegrationError::Misconfiguration(_) => CapabilityError::Unavailable(message),
            IntegrationError::Parse { .. } => CapabilityError::Parse(message),
            IntegrationError::Status { .. }
            | IntegrationError::Transport(_)
            | IntegrationError::Timeout(_) => CapabilityError::Transport(message),
        }
    }
}
