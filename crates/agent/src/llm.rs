use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use haggle_core::config::{LlmConfig, LlmProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 1_024;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Chat-completion client for OpenAI, Anthropic and Ollama endpoints.
#[derive(Clone)]
pub struct HttpLlmClient {
    provider: LlmProvider,
    model: String,
    base_url: String,
    api_key: Option<SecretString>,
    max_retries: u32,
    client: Client,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        if config.provider != LlmProvider::Ollama && config.api_key.is_none() {
            bail!("llm provider {:?} requires an api key", config.provider);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("building http client")?;

        Ok(Self {
            provider: config.provider,
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base_url(config.provider).to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
            client,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    async fn send_once(&self, system: &str, prompt: &str) -> Result<Attempt> {
        let url = endpoint(self.provider, &self.base_url);
        let body = request_body(self.provider, &self.model, system, prompt);
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = match self.provider {
                LlmProvider::Anthropic => request
                    .header("x-api-key", key.expose_secret())
                    .header("anthropic-version", ANTHROPIC_VERSION),
                LlmProvider::OpenAi | LlmProvider::Ollama => {
                    request.bearer_auth(key.expose_secret())
                }
            };
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) if error.is_timeout() || error.is_connect() => {
                return Ok(Attempt::Retry(anyhow!(error).context("llm request failed")));
            }
            Err(error) => return Err(anyhow!(error).context("llm request failed")),
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let error = anyhow!("llm endpoint returned {status}: {}", truncate(&text, 300));
            let attempt =
                if is_retryable(status) { Attempt::Retry(error) } else { Attempt::Fail(error) };
            return Ok(attempt);
        }

        let payload: Value = response.json().await.context("decoding llm response")?;
        Ok(Attempt::Done(extract_text(self.provider, &payload)?))
    }
}

enum Attempt {
    Done(String),
    Retry(anyhow::Error),
    Fail(anyhow::Error),
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff(attempt)).await;
            }
            match self.send_once(system, prompt).await? {
                Attempt::Done(text) => {
                    debug!(
                        event_name = "llm.completion.succeeded",
                        provider = ?self.provider,
                        model = %self.model,
                        attempt,
                        chars = text.len(),
                        "llm completion succeeded"
                    );
                    return Ok(text);
                }
                Attempt::Fail(error) => return Err(error),
                Attempt::Retry(error) => {
                    warn!(
                        event_name = "llm.completion.retrying",
                        provider = ?self.provider,
                        attempt,
                        error = %error,
                        "transient llm failure"
                    );
                    last_error = Some(error);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("llm completion failed")))
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com/v1",
        LlmProvider::Anthropic => "https://api.anthropic.com/v1",
        LlmProvider::Ollama => "http://localhost:11434",
    }
}

fn endpoint(provider: LlmProvider, base_url: &str) -> String {
    match provider {
        LlmProvider::OpenAi => format!("{base_url}/chat/completions"),
        LlmProvider::Anthropic => format!("{base_url}/messages"),
        LlmProvider::Ollama => format!("{base_url}/api/chat"),
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(250 * 2u64.saturating_pow(attempt.saturating_sub(1)).min(16))
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

fn request_body(provider: LlmProvider, model: &str, system: &str, prompt: &str) -> Value {
    let user = ChatMessage { role: "user", content: prompt };
    match provider {
        LlmProvider::OpenAi => serde_json::json!({
            "model": model,
            "messages": [ChatMessage { role: "system", content: system }, user],
            "temperature": 0.2,
        }),
        LlmProvider::Anthropic => serde_json::json!({
            "model": model,
            "system": system,
            "max_tokens": ANTHROPIC_MAX_TOKENS,
            "messages": [user],
        }),
        LlmProvider::Ollama => serde_json::json!({
            "model": model,
            "stream": false,
            "messages": [ChatMessage { role: "system", content: system }, user],
        }),
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: ReplyMessage,
}

fn extract_text(provider: LlmProvider, payload: &Value) -> Result<String> {
    let text = match provider {
        LlmProvider::OpenAi => {
            let response: OpenAiResponse = serde_json::from_value(payload.clone())?;
            response.choices.into_iter().next().and_then(|choice| choice.message.content)
        }
        LlmProvider::Anthropic => {
            let response: AnthropicResponse = serde_json::from_value(payload.clone())?;
            let text = response
                .content
                .into_iter()
                .filter(|block| block.kind == "text")
                .filter_map(|block| block.text)
                .collect::<Vec<_>>()
                .join("");
            Some(text)
        }
        LlmProvider::Ollama => {
            let response: OllamaResponse = serde_json::from_value(payload.clone())?;
            response.message.content
        }
    };

    text.filter(|text| !text.trim().is_empty()).ok_or_else(|| anyhow!("llm reply had no text"))
}
