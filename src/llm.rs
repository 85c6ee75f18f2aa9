//! llm.rs: Chat-completion client used to translate questions into SQL.
//!
//! OpenRouter is OpenAI-API-compatible: same /chat/completions endpoint
//! as a local Ollama / llama.cpp / LM Studio server, different base URL and
//! auth. Exactly one provider is called per question: no retries, no streaming.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::TranslationError;
use crate::prompt::ChatPrompt;

/// Highest temperature accepted; translation must stay near-deterministic.
pub const MAX_TEMPERATURE: f32 = 0.2;

/// Turns a prompt into a raw completion.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, TranslationError>;

    /// Provider label for logs.
    fn name(&self) -> String;
}

// ─── Provider config ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum LlmProvider {
    /// OpenRouter, https://openrouter.ai
    OpenRouter {
        base_url: String,
        api_key:  String,
        model:    String,
    },
    /// Any local OpenAI-compatible server
    Local {
        base_url: String,  // e.g. "http://localhost:11434/v1"
        model:    String,
    },
}

impl LlmProvider {
    /// OpenRouter when a key is configured, otherwise the local server.
    pub fn from_config(cfg: &LlmConfig) -> Option<Self> {
        let openrouter = cfg.api_key.as_ref()
            .filter(|k| !k.is_empty())
            .map(|key| LlmProvider::OpenRouter {
                base_url: cfg.base_url.clone(),
                api_key:  key.clone(),
                model:    cfg.model.clone(),
            });

        openrouter.or_else(|| {
            cfg.local_base_url.as_ref()
                .filter(|u| !u.is_empty())
                .map(|url| LlmProvider::Local {
                    base_url: url.clone(),
                    model:    cfg.local_model.clone(),
                })
        })
    }

    pub fn label(&self) -> String {
        match self {
            LlmProvider::OpenRouter { model, .. } => format!("OpenRouter/{}", model),
            LlmProvider::Local { model, .. }      => format!("Local/{}", model),
        }
    }

    fn endpoint(&self) -> String {
        let base = match self {
            LlmProvider::OpenRouter { base_url, .. } | LlmProvider::Local { base_url, .. } => base_url,
        };
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }

    fn model(&self) -> &str {
        match self {
            LlmProvider::OpenRouter { model, .. } | LlmProvider::Local { model, .. } => model,
        }
    }

    fn bearer(&self) -> String {
        match self {
            LlmProvider::OpenRouter { api_key, .. } => format!("Bearer {}", api_key),
            LlmProvider::Local { .. } => "Bearer local".to_string(), // Ollama ignores auth
        }
    }
}

// ─── Request / response types (OpenAI-compatible) ────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model:       &'a str,
    messages:    [Message<'a>; 2],
    max_tokens:  u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role:    &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull the first choice's text out of a completion body.
fn extract_content(body: &str) -> Result<String, TranslationError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| TranslationError::MalformedResponse(format!("{e}: {}", truncate(body, 200))))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content.unwrap_or_default())
        .ok_or_else(|| TranslationError::MalformedResponse(format!("no choices: {}", truncate(body, 200))))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ─── Client ──────────────────────────────────────────────────────────────────

pub struct LlmClient {
    http:        Client,
    provider:    Option<LlmProvider>,
    temperature: f32,
    max_tokens:  u32,
}

impl LlmClient {
    pub fn from_config(cfg: &LlmConfig) -> Result<Self, TranslationError> {
        let provider = LlmProvider::from_config(cfg);
        match &provider {
            Some(p) => info!("LLM provider: {}", p.label()),
            None => warn!("No LLM provider configured; every question will use the default query"),
        }

        let temperature = cfg.temperature.clamp(0.0, MAX_TEMPERATURE);
        if temperature != cfg.temperature {
            warn!("LLM temperature {} clamped to {}", cfg.temperature, temperature);
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            provider,
            temperature,
            max_tokens: cfg.max_tokens,
        })
    }
}

#[async_trait]
impl Translator for LlmClient {
    async fn complete(&self, prompt: &ChatPrompt) -> Result<String, TranslationError> {
        let provider = self.provider.as_ref().ok_or(TranslationError::NotConfigured)?;
        let url = provider.endpoint();

        let request = ChatRequest {
            model: provider.model(),
            messages: [
                Message { role: "system", content: &prompt.system },
                Message { role: "user", content: &prompt.user },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!("LLM call → {}", url);

        let resp = self.http
            .post(&url)
            .header("Authorization", provider.bearer())
            .header("Content-Type", "application/json")
            // OpenRouter uses these to identify the app
            .header("HTTP-Referer", "https://github.com/video-stats-bot")
            .header("X-Title", "video-stats-bot")
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(TranslationError::Status { status, body: truncate(&body, 300) });
        }

        let text = extract_content(&body)?;
        debug!("LLM response received (text_len={})", text.len());
        Ok(text)
    }

    fn name(&self) -> String {
        self.provider.as_ref().map(|p| p.label()).unwrap_or_else(|| "none".into())
    }
}
