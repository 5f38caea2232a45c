//! Chat client configuration.
//!
//! Loaded from TOML; every section and field is optional. Environment
//! variables override the file:
//!
//! | Variable                   | Field                      |
//! |----------------------------|----------------------------|
//! | `DOM_API_BASE_URL`         | `api.base_url`             |
//! | `DOM_REQUEST_TIMEOUT_SECS` | `api.request_timeout_secs` |
//! | `DOM_ACCESS_TOKEN`         | `api.access_token`         |
//! | `DOM_MAX_UPLOAD_BYTES`     | `uploads.max_bytes`        |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::attachments::MAX_UPLOAD_BYTES;
use crate::error::{ChatError, ChatResult};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_TITLE: &str = "New chat";

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL including the API prefix
    pub base_url: String,
    /// Timeout for request/response calls (0 = none). Never applied to the reply stream.
    pub request_timeout_secs: u64,
    /// Bearer token sent with every request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 60,
            access_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadConfig {
    /// Size ceiling checked before any upload starts
    pub max_bytes: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Title given to sessions created on start
    pub default_title: String,
    /// Whether turns request research mode unless told otherwise
    pub research_mode: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_title: DEFAULT_TITLE.to_string(),
            research_mode: false,
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub api: ApiConfig,
    pub uploads: UploadConfig,
    pub session: SessionConfig,
}

impl ChatConfig {
    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> ChatResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env()?;
        debug!(path = %path.display(), "Loaded chat configuration");
        Ok(config)
    }

    /// Parse and validate TOML without consulting the environment.
    pub fn from_toml_str(content: &str) -> ChatResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> ChatResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `DOM_*` environment variables.
    pub fn apply_env(&mut self) -> ChatResult<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Override fields from any variable source.
    pub fn apply_vars<F>(&mut self, lookup: F) -> ChatResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup("DOM_API_BASE_URL") {
            self.api.base_url = url;
        }
        if let Some(secs) = lookup("DOM_REQUEST_TIMEOUT_SECS") {
            self.api.request_timeout_secs = parse_number("DOM_REQUEST_TIMEOUT_SECS", &secs)?;
        }
        if let Some(token) = lookup("DOM_ACCESS_TOKEN") {
            self.api.access_token = Some(token);
        }
        if let Some(bytes) = lookup("DOM_MAX_UPLOAD_BYTES") {
            self.uploads.max_bytes = parse_number("DOM_MAX_UPLOAD_BYTES", &bytes)?;
        }

        self.validate()
    }

    pub fn validate(&self) -> ChatResult<()> {
        let base = self.api.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ChatError::InvalidUrl(self.api.base_url.clone()));
        }
        if self.uploads.max_bytes == 0 {
            return Err(ChatError::Config("uploads.max_bytes must be greater than zero".into()));
        }
        if self.uploads.max_bytes > MAX_UPLOAD_BYTES {
            return Err(ChatError::Config(format!(
                "uploads.max_bytes must not exceed {} bytes",
                MAX_UPLOAD_BYTES
            )));
        }
        Ok(())
    }

    /// Request timeout, if one is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.api.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.api.base_url = url.into();
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.api.request_timeout_secs = seconds;
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.api.access_token = Some(token.into());
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.uploads.max_bytes = bytes;
        self
    }

    pub fn default_title(mut self, title: impl Into<String>) -> Self {
        self.session.default_title = title.into();
        self
    }

    pub fn research_mode(mut self, enabled: bool) -> Self {
        self.session.research_mode = enabled;
        self
    }
}

fn parse_number(key: &str, value: &str) -> ChatResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| ChatError::Config(format!("{} must be a non-negative integer, got '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.uploads.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.session.default_title, "New chat");
        assert!(!config.session.research_mode);
    }

    #[test]
    fn test_partial_toml() {
        let config = ChatConfig::from_toml_str(
            r#"
            [api]
            base_url = "https://chat.example.com/api"

            [session]
            research_mode = true
            "#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, "https://chat.example.com/api");
        assert_eq!(config.api.request_timeout_secs, 60);
        assert!(config.session.research_mode);
        assert_eq!(config.session.default_title, DEFAULT_TITLE);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[uploads]\nmax_bytes = 1024").unwrap();

        let config = ChatConfig::load(file.path()).unwrap();
        assert_eq!(config.uploads.max_bytes, 1024);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ChatConfig::load(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ChatError::Io(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DOM_API_BASE_URL", "http://10.0.0.5:9000/api"),
            ("DOM_REQUEST_TIMEOUT_SECS", "0"),
            ("DOM_MAX_UPLOAD_BYTES", "2048"),
            ("DOM_ACCESS_TOKEN", ""),
        ]
        .into_iter()
        .collect();

        let mut config = ChatConfig::default();
        config
            .apply_vars(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.api.base_url, "http://10.0.0.5:9000/api");
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.uploads.max_bytes, 2048);
        assert!(config.api.access_token.is_none());
    }

    #[test]
    fn test_invalid_values() {
        let mut config = ChatConfig::default();
        let result = config.apply_vars(|key| {
            (key == "DOM_MAX_UPLOAD_BYTES").then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(ChatError::Config(_))));

        let result = ChatConfig::from_toml_str("[api]\nbase_url = \"localhost:8000\"");
        assert!(matches!(result, Err(ChatError::InvalidUrl(_))));

        let result = ChatConfig::from_toml_str("[api]\nrequest_timeout_secs = \"soon\"");
        assert!(matches!(result, Err(ChatError::ConfigParse(_))));
    }

    #[test]
    fn test_upload_limit_only_lowers() {
        let config = ChatConfig::default().max_upload_bytes(100 * 1024 * 1024);
        assert!(matches!(config.validate(), Err(ChatError::Config(_))));

        let result = ChatConfig::from_toml_str("[uploads]\nmax_bytes = 5242881");
        assert!(matches!(result, Err(ChatError::Config(_))));

        let mut config = ChatConfig::default();
        let result = config.apply_vars(|key| {
            (key == "DOM_MAX_UPLOAD_BYTES").then(|| "6291456".to_string())
        });
        assert!(matches!(result, Err(ChatError::Config(_))));

        let config = ChatConfig::default().max_upload_bytes(MAX_UPLOAD_BYTES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ChatConfig::default()
            .base_url("https://example.com/api")
            .timeout(5)
            .max_upload_bytes(10)
            .research_mode(true);

        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.uploads.max_bytes, 10);
    }
}
