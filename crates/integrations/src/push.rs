//! Downstream webhook push.

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{CapabilityError, DownstreamPusher, RunRecord};
use reqwest::Url;
use tracing::{info, instrument};

use crate::error::IntegrationError;

const SERVICE: &str = "downstream webhook";

/// Posts a finished run record as JSON to a tracker webhook.
#[derive(Debug, Clone)]
pub struct WebhookPusher {
    http: reqwest::Client,
    push_url: Url,
    timeout: Duration,
}

impl WebhookPusher {
    pub fn new(push_url: &str, timeout: Duration) -> Result<Self, IntegrationError> {
        let push_url = Url::parse(push_url)
            .map_err(|e| IntegrationError::Misconfiguration(format!("{push_url}: {e}")))?;
        if !matches!(push_url.scheme(), "http" | "https") {
            return Err(IntegrationError::Misconfiguration(format!(
                "{push_url} is not an HTTP(S) URL"
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IntegrationError::Misconfiguration(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            push_url,
            timeout,
        })
    }
}

#[async_trait]
impl DownstreamPusher for WebhookPusher {
    #[instrument(skip_all, fields(run_id = %record.run_id))]
    async fn push_downstream(&self, record: &RunRecord) -> Result<(), CapabilityError> {
        let response = self
            .http
            .post(self.push_url.clone())
            .json(record)
            .send()
            .await
            .map_err(|e| IntegrationError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IntegrationError::Status {
                service: SERVICE,
                status: status.as_u16(),
            }
            .into());
        }

        info!(status = status.as_u16(), "Pushed run downstream");
        Ok(())
    }
}
