use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;
use shared::domain::Locale;

use crate::{auth::FileTokenStore, retry::RetryPolicy};

pub const SETTINGS_FILE: &str = "analyst.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub token_path: Option<PathBuf>,
    pub locale: Locale,
    pub retry_max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000/api".into(),
            request_timeout_secs: 600,
            token_path: None,
            locale: Locale::En,
            retry_max_retries: 2,
            retry_base_delay_ms: 1500,
        }
    }
}

impl Settings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    /// Configured path, else the per-user config dir, else the working dir.
    pub fn token_store_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .or_else(FileTokenStore::default_path)
            .unwrap_or_else(|| PathBuf::from(".analyst_token"))
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    token_path: Option<PathBuf>,
    locale: Option<String>,
    retry_max_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
}

/// Defaults, then `analyst.toml` in the working directory, then environment.
pub fn load_settings() -> anyhow::Result<Settings> {
    let settings = load_settings_from(Path::new(SETTINGS_FILE))?;
    Ok(apply_env_overrides(settings, |key| std::env::var(key).ok()))
}

/// Defaults overlaid with `path`. A missing file is not an error.
pub fn load_settings_from(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(settings),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    };
    let file_cfg: FileSettings = toml::from_str(&raw)
        .with_context(|| format!("failed to parse settings file '{}'", path.display()))?;

    if let Some(v) = file_cfg.api_base_url {
        settings.api_base_url = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.token_path {
        settings.token_path = Some(v);
    }
    if let Some(v) = file_cfg.locale {
        settings.locale = Locale::from_code_or_default(&v);
    }
    if let Some(v) = file_cfg.retry_max_retries {
        settings.retry_max_retries = v;
    }
    if let Some(v) = file_cfg.retry_base_delay_ms {
        settings.retry_base_delay_ms = v;
    }

    Ok(settings)
}

/// Environment overrides. Unparseable numbers are ignored.
pub fn apply_env_overrides(
    mut settings: Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Settings {
    if let Some(v) = lookup("ANALYST_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }

    if let Some(v) = lookup("APP__TOKEN_PATH") {
        settings.token_path = Some(PathBuf::from(v));
    }

    if let Some(v) = lookup("APP__LOCALE") {
        settings.locale = Locale::from_code_or_default(&v);
    }

    if let Some(v) = lookup("APP__RETRY_MAX_RETRIES") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.retry_max_retries = parsed;
        }
    }
    if let Some(v) = lookup("APP__RETRY_BASE_DELAY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.retry_base_delay_ms = parsed;
        }
    }

    settings
}
