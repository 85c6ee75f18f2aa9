use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm:      LlmConfig,
    pub telegram: TelegramConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file. Bare filenames live in the local app data directory.
    pub path:            String,
    pub max_connections: usize,
    pub busy_timeout_ms: u64,
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "video_stats.db".into(), max_connections: 4, busy_timeout_ms: 5_000 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    // ── OpenRouter (used when a key is present) ──────────────────────────
    /// Prefer env OPENROUTER_API_KEY
    pub api_key:  Option<String>,
    pub base_url: String,
    pub model:    String,

    // ── Local OpenAI-compatible server (Ollama / llama.cpp / LM Studio) ──
    pub local_base_url: Option<String>,
    pub local_model:    String,

    /// Kept near zero: the same question should give the same SQL.
    pub temperature:  f32,
    pub max_tokens:   u32,
    pub timeout_secs: u64,
}
impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key:        None,
            base_url:       "https://openrouter.ai/api/v1".into(),
            model:          "google/gemini-2.0-flash-exp:free".into(),
            local_base_url: Some("http://localhost:11434/v1".into()),
            local_model:    "llama3.1:8b".into(),
            temperature:    0.0,
            max_tokens:     300,
            timeout_secs:   30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelegramConfig {
    /// Prefer env TELEGRAM_BOT_TOKEN
    pub token:             Option<String>,
    pub api_base:          String,
    /// Long-polling timeout passed to getUpdates
    pub poll_timeout_secs: u64,
}
impl Default for TelegramConfig {
    fn default() -> Self {
        Self { token: None, api_base: "https://api.telegram.org".into(), poll_timeout_secs: 30 }
    }
}

impl AppConfig {
    /// Convenience variables without the VIDEO_STATS__ prefix.
    /// They only fill values the layered sources left unset.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.telegram.token.is_none() {
            self.telegram.token = non_empty("TELEGRAM_BOT_TOKEN");
        }
        if self.llm.api_key.is_none() {
            self.llm.api_key = non_empty("OPENROUTER_API_KEY");
        }
        if let Some(model) = non_empty("LLM_MODEL") {
            self.llm.model = model.clone();
            self.llm.local_model = model;
        }
        if let Some(path) = non_empty("DATABASE_PATH") {
            self.database.path = path;
        }
    }
}

fn builder() -> config::ConfigBuilder<config::builder::DefaultState> {
    config::Config::builder()
}

pub fn load_config() -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let cfg = builder()
        .add_source(config::File::with_name("video-stats-bot").required(false))
        .add_source(
            config::Environment::with_prefix("VIDEO_STATS")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    let mut app: AppConfig = cfg.try_deserialize()?;
    app.apply_env_overrides(|key| std::env::var(key).ok());

    Ok(app)
}

/// Parse a TOML document on top of the defaults.
pub fn from_toml_str(toml: &str) -> Result<AppConfig> {
    let cfg = builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?;
    Ok(cfg.try_deserialize()?)
}
