use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Workspace opened at startup, before any `workspace.select`.
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
    pub generation: GenerationConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let workspace = non_empty_var("ROSTERD_WORKSPACE").map(PathBuf::from);
        let log_filter =
            non_empty_var("ROSTERD_LOG").unwrap_or_else(|| "rosterd=info".to_string());

        let api_key = non_empty_var("ROSTERD_GEMINI_API_KEY")
            .or_else(|| non_empty_var("GEMINI_API_KEY"))
            .or_else(|| non_empty_var("API_KEY"));
        let model =
            non_empty_var("ROSTERD_GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
        let base_url = non_empty_var("ROSTERD_GEMINI_BASE_URL")
            .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let timeout_secs = match non_empty_var("ROSTERD_GENERATION_TIMEOUT_SECS") {
            Some(v) => v
                .parse::<u64>()
                .with_context(|| format!("ROSTERD_GENERATION_TIMEOUT_SECS is not a number: {v}"))?,
            None => 30,
        };

        Ok(Self {
            workspace,
            log_filter,
            generation: GenerationConfig {
                api_key,
                model,
                base_url,
                timeout: Duration::from_secs(timeout_secs),
            },
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
