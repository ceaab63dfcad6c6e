use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub rag: RagConfig,
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
    /// Create the chat tables at startup when they are missing.
    #[serde(default)]
    pub ensure_schema: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    pub model: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub dimension: usize,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    pub max_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RagConfig {
    /// Chunks returned per query.
    pub match_count: usize,
    pub match_threshold: f32,
    /// Characters kept from each chunk in the prompt.
    pub preview_chars: usize,
    pub max_context_chars: usize,
    /// Recent conversation messages forwarded to the model.
    pub history_window: usize,
    #[serde(default)]
    pub fallback: RetrievalFallback,
}

/// What retrieval does when the ranked vector query fails.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalFallback {
    /// Most recent chunks in scope, unranked.
    #[default]
    Recent,
    /// Propagate the ranked query error.
    #[serde(rename = "none")]
    Disabled,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptsConfig {
    /// Persona template; `{{CONTEXT}}` is replaced by the assembled context.
    pub system_prompt: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AuthConfig {
    /// HS256 secret used to verify bearer tokens. Empty disables verification.
    #[serde(default)]
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `json` or `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Daily rolling log files are written here when set.
    #[serde(default)]
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            directory: None,
        }
    }
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_temperature() -> f32 {
    0.7
}

fn default_log_level() -> String {
    "info,plant_chat_server=debug".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(true))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from an in-memory TOML document, without env overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.rag.match_count == 0 {
            anyhow::bail!("rag.match_count must be positive");
        }
        if !(0.0..=1.0).contains(&self.rag.match_threshold) {
            anyhow::bail!("rag.match_threshold must be within [0, 1]");
        }
        if self.embedding.dimension == 0 {
            anyhow::bail!("embedding.dimension must be positive");
        }
        if !self.prompts.system_prompt.contains("{{CONTEXT}}") {
            tracing::warn!("prompts.system_prompt has no {{{{CONTEXT}}}} placeholder; retrieved context will be ignored");
        }
        Ok(())
    }
}
