//! Application settings
//!
//! Loaded once at startup from a JSON file, then overridden by environment
//! variables and CLI flags. Every field has a default, so a missing file or
//! a partial one is fine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::extraction::{Extractor, PdfBackend, DEFAULT_MAX_CHARS};

pub const ENV_CONFIG: &str = "NEXUS_CONFIG";
pub const ENV_BIND: &str = "NEXUS_BIND";
pub const ENV_MODEL: &str = "NEXUS_MODEL";
pub const ENV_API_KEY: &str = "OPENROUTER_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse settings {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to write settings {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// OpenRouter-compatible chat completions endpoint
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Sent as HTTP-Referer for OpenRouter attribution
    #[serde(default = "default_site_url")]
    pub site_url: String,
    /// Sent as X-Title for OpenRouter attribution
    #[serde(default = "default_site_name")]
    pub site_name: String,
    /// Characters kept per document
    #[serde(default = "default_max_doc_chars")]
    pub max_doc_chars: usize,
    /// Message pairs kept in the LLM context
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Larger uploads are rejected before extraction
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default = "default_extract_timeout_secs")]
    pub extract_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub pdf_backend: PdfBackend,
    /// Directory holding `templates/index.html` and `static/`
    #[serde(default = "default_static_root")]
    pub static_root: PathBuf,
    /// Used when a chat request carries no key of its own
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_api_base_url() -> String {
    "https://openrouter.ai/api/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "nvidia/nemotron-nano-12b-v2-vl:free".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.3
}

fn default_site_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_site_name() -> String {
    "Nexus Enterprise Bot".to_string()
}

fn default_max_doc_chars() -> usize {
    DEFAULT_MAX_CHARS
}

fn default_history_limit() -> usize {
    10
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024 // 20MB
}

fn default_extract_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_static_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_base_url: default_api_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            site_url: default_site_url(),
            site_name: default_site_name(),
            max_doc_chars: default_max_doc_chars(),
            history_limit: default_history_limit(),
            max_upload_bytes: default_max_upload_bytes(),
            extract_timeout_secs: default_extract_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            pdf_backend: PdfBackend::default(),
            static_root: default_static_root(),
            api_key: None,
        }
    }
}

impl Settings {
    /// Load settings from disk; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save settings to disk
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let write_err = |source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        };

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| SettingsError::Invalid(format!("cannot serialize settings: {}", e)))?;
        fs::write(path, content).map_err(write_err)
    }

    /// Apply environment overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), SettingsError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides from an arbitrary lookup (empty values are ignored)
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bind) = get(ENV_BIND) {
            self.set_bind(&bind)?;
        }
        if let Some(model) = get(ENV_MODEL) {
            self.model = model;
        }
        // Environment variable takes precedence over the stored key
        if let Some(key) = get(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        Ok(())
    }

    /// Set host and port from a `host:port` string
    pub fn set_bind(&mut self, bind: &str) -> Result<(), SettingsError> {
        let (host, port) = bind
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| SettingsError::Invalid(format!("bind address '{}' is not host:port", bind)))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| SettingsError::Invalid(format!("bad port in '{}': {}", bind, e)))?;
        if host.is_empty() {
            return Err(SettingsError::Invalid(format!("bind address '{}' has no host", bind)));
        }
        self.host = host.to_string();
        self.port = port;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_doc_chars == 0 {
            return Err(SettingsError::Invalid("max_doc_chars must be at least 1".into()));
        }
        if self.history_limit == 0 {
            return Err(SettingsError::Invalid("history_limit must be at least 1".into()));
        }
        if self.max_upload_bytes == 0 {
            return Err(SettingsError::Invalid("max_upload_bytes must be at least 1".into()));
        }
        if self.extract_timeout_secs == 0 {
            return Err(SettingsError::Invalid("extract_timeout_secs must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(SettingsError::Invalid("request_timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Configured API key, if any and non-empty
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn extractor(&self) -> Extractor {
        Extractor::new(self.max_doc_chars, self.pdf_backend)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// `<config dir>/nexus/settings.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("nexus").join("settings.json"))
}

/// Settings file to use: explicit path, then `NEXUS_CONFIG`, then the default location
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(ENV_CONFIG) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    default_config_path()
}
