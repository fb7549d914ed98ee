use crate::error::AppError;
use crate::llm::gemini;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    Proxy,
}

/// Startup configuration, built once and handed to the store and clients.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            proxy_url: None,
            data_dir: default_data_dir(),
        }
    }
}

impl AppConfig {
    /// `urdu-gpt.toml` in the working directory (optional), overridden by
    /// `URDU_GPT__*` environment variables (e.g. `URDU_GPT__API_KEY`).
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(File::with_name("urdu-gpt").required(false))
    }

    pub fn load_from(file: File<config::FileSourceFile, config::FileFormat>) -> Result<Self, AppError> {
        let builder = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("URDU_GPT").separator("__"));

        builder
            .build()
            .and_then(|config| config.try_deserialize::<AppConfig>())
            .map_err(map_config_error)
    }
}

fn map_config_error(err: ConfigError) -> AppError {
    AppError::Configuration(format!("failed to load configuration: {}", err))
}

fn default_base_url() -> String {
    gemini::DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    gemini::DEFAULT_MODEL.to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("urdu-gpt"))
        .unwrap_or_else(|| PathBuf::from("./var"))
}
