//! Configuration loader and validator for the call dashboard.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub app: App,
    pub retell: Retell,
    pub webhooks: Webhooks,
}

/// Where the call list is paged from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallSource {
    #[default]
    Retell,
    Webhook,
}

/// Loader and cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    pub cache_ttl_seconds: u64,
    pub page_size: u32,
    pub max_page_requests: u32,
    pub page_failure_limit: u32,
    pub retry_delay_ms: u64,
    pub resource_attempt_limit: u32,
    pub call_source: CallSource,
}

impl Default for App {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 15 * 60,
            page_size: 1000,
            max_page_requests: 100,
            page_failure_limit: 3,
            retry_delay_ms: 1000,
            resource_attempt_limit: 3,
            call_source: CallSource::Retell,
        }
    }
}

/// Voice platform REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Retell {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Tenant webhook endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Webhooks {
    pub identity_url: String,
    pub calls_url: String,
    pub dashboard_url: String,
    pub agendas_url: String,
}

/// Knobs shared by every loader, derived from `app`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderSettings {
    pub cache_ttl: Duration,
    pub page_size: u32,
    pub max_page_requests: u32,
    pub page_failure_limit: u32,
    pub retry_delay: Duration,
    pub resource_attempt_limit: u32,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        App::default().loader_settings()
    }
}

impl App {
    pub fn loader_settings(&self) -> LoaderSettings {
        LoaderSettings {
            cache_ttl: Duration::from_secs(self.cache_ttl_seconds),
            page_size: self.page_size,
            max_page_requests: self.max_page_requests,
            page_failure_limit: self.page_failure_limit,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            resource_attempt_limit: self.resource_attempt_limit,
        }
    }
}

impl Config {
    pub fn loader_settings(&self) -> LoaderSettings {
        self.app.loader_settings()
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.cache_ttl_seconds == 0 {
        return Err(ConfigError::Invalid("app.cache_ttl_seconds must be > 0"));
    }
    if cfg.app.page_size == 0 {
        return Err(ConfigError::Invalid("app.page_size must be > 0"));
    }
    if cfg.app.max_page_requests == 0 {
        return Err(ConfigError::Invalid("app.max_page_requests must be > 0"));
    }
    if cfg.app.page_failure_limit == 0 {
        return Err(ConfigError::Invalid("app.page_failure_limit must be > 0"));
    }
    if cfg.app.resource_attempt_limit == 0 {
        return Err(ConfigError::Invalid("app.resource_attempt_limit must be > 0"));
    }

    if !is_http_url(&cfg.retell.base_url) {
        return Err(ConfigError::Invalid("retell.base_url must be an http(s) URL"));
    }
    if let Some(key) = &cfg.retell.api_key {
        if key.trim().is_empty() {
            return Err(ConfigError::Invalid("retell.api_key must be non-empty when set"));
        }
    }

    let hooks = &cfg.webhooks;
    if !is_http_url(&hooks.identity_url) {
        return Err(ConfigError::Invalid("webhooks.identity_url must be an http(s) URL"));
    }
    if !is_http_url(&hooks.calls_url) {
        return Err(ConfigError::Invalid("webhooks.calls_url must be an http(s) URL"));
    }
    if !is_http_url(&hooks.dashboard_url) {
        return Err(ConfigError::Invalid("webhooks.dashboard_url must be an http(s) URL"));
    }
    if !is_http_url(&hooks.agendas_url) {
        return Err(ConfigError::Invalid("webhooks.agendas_url must be an http(s) URL"));
    }

    Ok(())
}

fn is_http_url(raw: &str) -> bool {
    match reqwest::Url::parse(raw.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host().is_some(),
        Err(_) => false,
    }
}

/// Returns the example YAML shipped with the binary.
pub fn example() -> &'static str {
    r#"app:
  cache_ttl_seconds: 900
  page_size: 1000
  max_page_requests: 100
  page_failure_limit: 3
  retry_delay_ms: 1000
  resource_attempt_limit: 3
  call_source: retell

retell:
  base_url: "https://api.retellai.com/"

webhooks:
  identity_url: "https://hooks.example.com/webhook/client-by-email"
  calls_url: "https://hooks.example.com/webhook/calls"
  dashboard_url: "https://hooks.example.com/webhook/dashboard"
  agendas_url: "https://hooks.example.com/webhook/agendas"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app, App::default());
        assert_eq!(cfg.retell.api_key, None);
    }

    #[test]
    fn app_section_defaults_when_missing() {
        let yaml = example().split("retell:").nth(1).unwrap();
        let cfg: Config = serde_yaml::from_str(&format!("retell:{}", yaml)).unwrap();
        assert_eq!(cfg.app.cache_ttl_seconds, 900);
        assert_eq!(cfg.app.call_source, CallSource::Retell);
        let settings = cfg.loader_settings();
        assert_eq!(settings.cache_ttl, Duration::from_secs(900));
        assert_eq!(settings.retry_delay, Duration::from_millis(1000));
    }

    #[test]
    fn invalid_page_size() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.page_size = 0;
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("page_size")), _ => panic!("wrong error") }
    }

    #[test]
    fn invalid_urls() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.retell.base_url = "api.retellai.com".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("retell.base_url")), _ => panic!("wrong error") }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.webhooks.dashboard_url = "".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("dashboard_url")), _ => panic!("wrong error") }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.webhooks.calls_url = "ftp://hooks.example.com/calls".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn blank_api_key_rejected() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.retell.api_key = Some("  ".into());
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example().replace("call_source: retell", "call_source: webhook")).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.call_source, CallSource::Webhook);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let td = tempdir().unwrap();
        let err = load(Some(&td.path().join("nope.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
