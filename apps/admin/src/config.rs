use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use client_core::ClientOptions;
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "salon-admin.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub search_debounce_ms: u64,
    pub page_size: u32,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:3000".into(),
            request_timeout_secs: 15,
            search_debounce_ms: 300,
            page_size: 25,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            search_debounce: Duration::from_millis(self.search_debounce_ms),
            page_size: self.page_size.max(1),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_url: Option<String>,
    request_timeout_secs: Option<u64>,
    search_debounce_ms: Option<u64>,
    page_size: Option<u32>,
    log_filter: Option<String>,
}

/// Defaults, then the config file, then the environment.
///
/// An explicitly named config file must exist; the default one is optional.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match config_path {
        Some(path) => (path, true),
        None => (Path::new(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(path) {
        Ok(raw) => {
            let file: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
            apply_file(&mut settings, file);
        }
        Err(err) if required => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()));
        }
        Err(_) => {}
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings.api_url = normalize_api_url(&settings.api_url)?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, file: FileSettings) {
    if let Some(v) = file.api_url {
        settings.api_url = v;
    }
    if let Some(v) = file.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file.search_debounce_ms {
        settings.search_debounce_ms = v;
    }
    if let Some(v) = file.page_size {
        settings.page_size = v;
    }
    if let Some(v) = file.log_filter {
        settings.log_filter = v;
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SALON_API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = var("APP__API_URL") {
        settings.api_url = v;
    }

    if let Some(v) = var("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }
    if let Some(v) = var("APP__SEARCH_DEBOUNCE_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.search_debounce_ms = parsed;
        }
    }
    if let Some(v) = var("APP__PAGE_SIZE") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.page_size = parsed;
        }
    }

    if let Some(v) = var("RUST_LOG") {
        settings.log_filter = v;
    }
}

/// Reduce a user-supplied API address to the origin the client appends
/// `/api/...` to.
pub fn normalize_api_url(raw: &str) -> anyhow::Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        bail!("api url is empty");
    }
    let trimmed = trimmed.strip_suffix("/api").unwrap_or(trimmed);
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let url = Url::parse(&with_scheme).with_context(|| format!("invalid api url '{raw}'"))?;
    if url.host_str().is_none() {
        bail!("api url '{raw}' has no host");
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}
