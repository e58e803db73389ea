//! Reasoning engine adapter.
//!
//! One stateless call per task: a system instruction plus the user's task in,
//! generated text out. Provider wire formats are selected from configuration.

use std::time::Duration;

use async_trait::async_trait;
use progear_core::config::{LlmConfig, LlmProvider};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReasoningEngineError {
    #[error("reasoning engine timed out after {0}s")]
    Timeout(u64),
    #[error("reasoning engine transport failure: {0}")]
    Transport(String),
    #[error("reasoning provider returned {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("reasoning provider returned no text")]
    EmptyResponse,
    #[error("malformed reasoning provider response: {0}")]
    MalformedResponse(String),
}

#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn generate(&self, system: &str, task: &str) -> Result<String, ReasoningEngineError>;
}

#[derive(Clone, Debug)]
pub struct ReasoningSettings {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl ReasoningSettings {
    pub fn from_config(config: &LlmConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string());
        Self {
            provider: config.provider,
            api_key: config.api_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

pub fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::OpenAi => "https://api.openai.com",
        LlmProvider::Ollama => "http://localhost:11434",
    }
}

#[derive(Debug)]
pub struct HttpReasoningEngine {
    settings: ReasoningSettings,
    http: Client,
}

impl HttpReasoningEngine {
    pub fn new(settings: ReasoningSettings) -> Result<Self, ReasoningEngineError> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|error| ReasoningEngineError::Transport(error.to_string()))?;
        Ok(Self { settings, http })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ReasoningEngineError> {
        Self::new(ReasoningSettings::from_config(config))
    }

    pub fn settings(&self) -> &ReasoningSettings {
        &self.settings
    }

    async fn post(
        &self,
        request: reqwest::RequestBuilder,
        body: Value,
    ) -> Result<Value, ReasoningEngineError> {
        let response = request.json(&body).send().await.map_err(|error| self.send_error(error))?;
        let status = response.status();
        let text = response.text().await.map_err(|error| self.send_error(error))?;

        if !status.is_success() {
            return Err(ReasoningEngineError::Provider {
                status: status.as_u16(),
                message: provider_message(&text),
            });
        }

        serde_json::from_str(&text)
            .map_err(|error| ReasoningEngineError::MalformedResponse(error.to_string()))
    }

    fn send_error(&self, error: reqwest::Error) -> ReasoningEngineError {
        if error.is_timeout() {
            ReasoningEngineError::Timeout(self.settings.timeout.as_secs())
        } else {
            ReasoningEngineError::Transport(error.to_string())
        }
    }

    async fn anthropic(&self, system: &str, task: &str) -> Result<String, ReasoningEngineError> {
        let mut request = self
            .http
            .post(format!("{}/v1/messages", self.settings.base_url))
            .header("anthropic-version", ANTHROPIC_VERSION);
        if let Some(api_key) = &self.settings.api_key {
            request = request.header("x-api-key", api_key.expose_secret());
        }

        let body = json!({
            "model": self.settings.model,
            "max_tokens": self.settings.max_tokens,
            "temperature": self.settings.temperature,
            "system": system,
            "messages": [{"role": "user", "content": task}],
        });
        let response = self.post(request, body).await?;

        let blocks = response["content"].as_array().ok_or_else(|| {
            ReasoningEngineError::MalformedResponse("missing `content` array".to_string())
        })?;
        let text = blocks
            .iter()
            .filter(|block| block["type"] == "text")
            .filter_map(|block| block["text"].as_str())
            .collect::<Vec<_>>()
            .join("");
        non_empty(text)
    }

    async fn chat_completions(
        &self,
        system: &str,
        task: &str,
    ) -> Result<String, ReasoningEngineError> {
        let mut request =
            self.http.post(format!("{}/v1/chat/completions", self.settings.base_url));
        if let Some(api_key) = &self.settings.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let body = json!({
            "model": self.settings.model,
            "max_tokens": self.settings.max_tokens,
            "temperature": self.settings.temperature,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": task},
            ],
        });
        let response = self.post(request, body).await?;

        let text = response["choices"][0]["message"]["content"].as_str().ok_or_else(|| {
            ReasoningEngineError::MalformedResponse(
                "missing `choices[0].message.content`".to_string(),
            )
        })?;
        non_empty(text.to_string())
    }
}

#[async_trait]
impl ReasoningEngine for HttpReasoningEngine {
    async fn generate(&self, system: &str, task: &str) -> Result<String, ReasoningEngineError> {
        debug!(
            event_name = "agent.reasoning.request",
            provider = ?self.settings.provider,
            model = %self.settings.model,
            "calling reasoning provider"
        );
        match self.settings.provider {
            LlmProvider::Anthropic => self.anthropic(system, task).await,
            LlmProvider::OpenAi | LlmProvider::Ollama => self.chat_completions(system, task).await,
        }
    }
}

fn non_empty(text: String) -> Result<String, ReasoningEngineError> {
    if text.trim().is_empty() {
        Err(ReasoningEngineError::EmptyResponse)
    } else {
        Ok(text)
    }
}

fn provider_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value["error"]["message"]
                .as_str()
                .or_else(|| value["error"].as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}
