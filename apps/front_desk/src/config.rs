use std::{fs, io::ErrorKind, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "front_desk.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub log_filter: String,
    pub request_timeout_secs: Option<u64>,
    pub page_title: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".into(),
            log_filter: "info".into(),
            request_timeout_secs: None,
            page_title: "New appointment".into(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    server_url: Option<String>,
    log_filter: Option<String>,
    request_timeout_secs: Option<u64>,
    page_title: Option<String>,
}

/// Defaults, then the config file, then environment overrides.
///
/// An explicitly named file must exist; the default file is optional.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match path {
        Some(path) => (path, true),
        None => (Path::new(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid config file '{}'", path.display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound && !required => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileConfig = toml::from_str(raw)?;
    if let Some(v) = file_cfg.server_url {
        settings.server_url = normalize_server_url(&v);
    }
    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = Some(v);
    }
    if let Some(v) = file_cfg.page_title {
        settings.page_title = v;
    }
    Ok(())
}

/// `APP__*` wins over the short `FRONT_DESK_*` names.
fn apply_env(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    let pick = |short: &str, long: &str| lookup(long).or_else(|| lookup(short));

    if let Some(v) = pick("FRONT_DESK_SERVER_URL", "APP__SERVER_URL") {
        settings.server_url = normalize_server_url(&v);
    }
    if let Some(v) = pick("FRONT_DESK_LOG", "APP__LOG_FILTER") {
        settings.log_filter = v;
    }
    if let Some(v) = pick("FRONT_DESK_TIMEOUT_SECS", "APP__REQUEST_TIMEOUT_SECS") {
        let parsed = v
            .trim()
            .parse::<u64>()
            .with_context(|| format!("request timeout must be a whole number of seconds, got '{v}'"))?;
        settings.request_timeout_secs = Some(parsed);
    }
    if let Some(v) = pick("FRONT_DESK_PAGE_TITLE", "APP__PAGE_TITLE") {
        settings.page_title = v;
    }
    Ok(())
}

pub fn normalize_server_url(raw_server_url: &str) -> String {
    let raw_server_url = raw_server_url.trim();

    if raw_server_url.is_empty() {
        return Settings::default().server_url;
    }

    let with_scheme = if raw_server_url.contains("://") {
        raw_server_url.to_string()
    } else {
        format!("http://{raw_server_url}")
    };

    with_scheme.trim_end_matches('/').to_string()
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
