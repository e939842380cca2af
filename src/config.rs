use crate::error::{PipelineError, PipelineResult};
use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "/app/config.json";
pub const DEFAULT_DB_HOST: &str = "postgres";
pub const DEFAULT_DB_PORT: u16 = 5432;

/// Runtime configuration shared by both jobs.
///
/// Built once at startup from the JSON config file, then adjusted by
/// environment overrides. Keys in the file use the upper-case names the
/// deployment already ships (`ALPHA_VANTAGE_API_KEY`, `POSTGRES_DB`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(rename = "ALPHA_VANTAGE_API_KEY")]
    pub alpha_vantage_api_key: String,
    #[serde(rename = "NEWS_API_KEY")]
    pub news_api_key: String,
    #[serde(rename = "POSTGRES_USER")]
    pub db_user: String,
    #[serde(rename = "POSTGRES_PASSWORD")]
    pub db_password: String,
    #[serde(rename = "POSTGRES_DB")]
    pub db_name: String,
    #[serde(rename = "POSTGRES_HOST", default = "default_db_host")]
    pub db_host: String,
    #[serde(rename = "POSTGRES_PORT", default = "default_db_port")]
    pub db_port: u16,
    #[serde(rename = "STOCK_SYMBOL", default = "default_symbol")]
    pub stock_symbol: String,
    #[serde(rename = "STOCK_INTERVAL", default = "default_interval")]
    pub stock_interval: String,
    #[serde(rename = "NEWS_QUERY", default = "default_symbol")]
    pub news_query: String,
    #[serde(rename = "ALPHA_VANTAGE_BASE_URL", default = "default_alpha_vantage_url")]
    pub alpha_vantage_base_url: String,
    #[serde(rename = "NEWS_API_BASE_URL", default = "default_news_api_url")]
    pub news_api_base_url: String,
}

fn default_db_host() -> String {
    DEFAULT_DB_HOST.to_string()
}

fn default_db_port() -> u16 {
    DEFAULT_DB_PORT
}

fn default_symbol() -> String {
    "AAPL".to_string()
}

fn default_interval() -> String {
    "1min".to_string()
}

fn default_alpha_vantage_url() -> String {
    "https://www.alphavantage.co".to_string()
}

fn default_news_api_url() -> String {
    "https://newsapi.org".to_string()
}

impl PipelineConfig {
    /// Resolves the config file location: explicit path, then the
    /// `PIPELINE_CONFIG` variable, then `/app/config.json`.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| env::var("PIPELINE_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Loads the config file and applies `POSTGRES_HOST` / `POSTGRES_PORT`
    /// from the process environment.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_json(&raw)?;
        config.apply_env_overrides(|key| env::var(key).ok())?;

        debug!(
            "Loaded configuration from {} (db host {}:{})",
            path.display(),
            config.db_host,
            config.db_port
        );
        Ok(config)
    }

    pub fn from_json(raw: &str) -> PipelineResult<Self> {
        serde_json::from_str(raw).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Applies environment overrides through `lookup` so tests need not touch
    /// the real process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> PipelineResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("POSTGRES_HOST").filter(|h| !h.is_empty()) {
            self.db_host = host;
        }

        if let Some(port) = lookup("POSTGRES_PORT").filter(|p| !p.is_empty()) {
            self.db_port = port
                .parse()
                .map_err(|_| PipelineError::Config(format!("invalid POSTGRES_PORT: {}", port)))?;
        }

        Ok(())
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.db_host)
            .port(self.db_port)
            .username(&self.db_user)
            .password(&self.db_password)
            .database(&self.db_name)
    }
}
