//! Minimal OpenAI-compatible chat-completions client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LlmError;

fn default_timeout_secs() -> u64 {
    60
}

/// Connection settings for one chat-completions endpoint.
///
/// The API key is never stored in settings; `api_key_env` names the
/// environment variable it is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettings {
    /// Base URL, e.g. `https://api.openai.com/v1`. `/chat/completions` is appended.
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// A chat-completions client bound to one endpoint, model and credential.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    /// Builds a client, reading the API key from `settings.api_key_env`.
    ///
    /// # Errors
    ///
    /// [`LlmError::Misconfiguration`] if the variable is unset or empty.
    pub fn from_env(settings: &ChatSettings) -> Result<Self, LlmError> {
        let api_key = std::env::var(&settings.api_key_env).map_err(|_| {
            LlmError::Misconfiguration(format!(
                "environment variable {} is not set",
                settings.api_key_env
            ))
        })?;
        Self::new(settings, api_key)
    }

    /// Builds a client with an explicit API key.
    pub fn new(settings: &ChatSettings, api_key: String) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::Misconfiguration(format!(
                "API key for {} is empty",
                settings.base_url
            )));
        }
        if settings.model.trim().is_empty() {
            return Err(LlmError::Misconfiguration("model is empty".into()));
        }
        let timeout = Duration::from_secs(settings.timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Misconfiguration(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: completions_url(&settings.base_url),
            model: settings.model.clone(),
            api_key,
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends a system and user message, asking for a JSON object back.
    /// Returns the raw message content.
    pub async fn complete_json(&self, system: &str, user: &str) -> Result<String, LlmError> {
        self.complete(system, user, Some(ResponseFormat::json_object()))
            .await
    }

    /// Sends a system and user message and returns the free-text reply.
    pub async fn complete_text(&self, system: &str, user: &str) -> Result<String, LlmError> {
        self.complete(system, user, None).await
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        response_format: Option<ResponseFormat>,
    ) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format,
            stream: false,
        };

        debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            prompt_chars = user.len(),
            "Sending chat completion request"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), &text));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| self.transport_error(e))?;
        let content = first_content(parsed)?;

        debug!(
            model = %self.model,
            response_chars = content.len(),
            "Received chat completion"
        );
        Ok(content)
    }

    fn transport_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout(self.timeout)
        } else {
            err.into()
        }
    }
}

fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

fn first_content(response: ChatResponse) -> Result<String, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Parse("response has no choices".into()))?;
    choice
        .message
        .content
        .ok_or_else(|| LlmError::Parse("first choice has no content".into()))
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl ResponseFormat {
    fn json_object() -> Self {
        Self {
            kind: "json_object",
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
