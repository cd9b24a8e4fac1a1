//! modelbridge configuration — deserialization and validation.

use crate::error::BridgeError;
use serde::Deserialize;
use std::path::PathBuf;

/// Top-level modelbridge configuration, parsed from TOML.
///
/// Every field has a default matching the backend's built-in behavior, so a
/// missing config file is equivalent to `BridgeConfig::default()`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub desktop: DesktopConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    /// Override of the API-key file location [default: ~/.modelbridge/config.json].
    /// Point this at a temporary directory to isolate tests.
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Settings for locating a running Power BI Desktop instance and invoking
/// the PBIXReader helper against it.
#[derive(Debug, Clone, Deserialize)]
pub struct DesktopConfig {
    /// Override of the workspace base directory scanned for port markers.
    /// Defaults to the per-user Power BI Desktop workspaces directory.
    #[serde(default)]
    pub workspaces_dir: Option<PathBuf>,
    /// Catalog name passed to the helper. Power BI Desktop always names its
    /// local catalog "Model".
    #[serde(default = "default_database")]
    pub database: String,
    /// Runtime launcher for the helper assembly.
    #[serde(default = "default_launcher")]
    pub launcher: String,
    /// Arguments placed between the launcher and the helper path.
    #[serde(default = "default_launcher_args")]
    pub launcher_args: Vec<String>,
    /// Extra helper candidates, tried before the built-in locations.
    #[serde(default)]
    pub helper_paths: Vec<PathBuf>,
    /// Helper invocation timeout in seconds. The child process is killed on
    /// expiry.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

/// Chat-completions API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Outbound request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_database() -> String {
    "Model".to_string()
}

fn default_launcher() -> String {
    "dotnet".to_string()
}

fn default_launcher_args() -> Vec<String> {
    vec!["exec".to_string()]
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            workspaces_dir: None,
            database: default_database(),
            launcher: default_launcher(),
            launcher_args: default_launcher_args(),
            helper_paths: Vec::new(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl BridgeConfig {
    /// Validate the config, failing fast on misconfigurations before the
    /// server binds.
    pub fn validate(&self) -> crate::Result<()> {
        if self.desktop.launcher.trim().is_empty() {
            return Err(BridgeError::InvalidConfig(
                "desktop.launcher must not be empty".to_string(),
            ));
        }
        if self.desktop.database.trim().is_empty() {
            return Err(BridgeError::InvalidConfig(
                "desktop.database must not be empty".to_string(),
            ));
        }
        if self.desktop.fetch_timeout_secs == 0 {
            return Err(BridgeError::InvalidConfig(
                "desktop.fetch_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.openai.api_url.trim().is_empty() {
            return Err(BridgeError::InvalidConfig(
                "openai.api_url must not be empty".to_string(),
            ));
        }
        if self.openai.model.trim().is_empty() {
            return Err(BridgeError::InvalidConfig(
                "openai.model must not be empty".to_string(),
            ));
        }
        if self.openai.request_timeout_secs == 0 {
            return Err(BridgeError::InvalidConfig(
                "openai.request_timeout_secs must be > 0".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.openai.temperature) {
            return Err(BridgeError::InvalidConfig(format!(
                "openai.temperature must be within 0.0..=2.0, got {}",
                self.openai.temperature
            )));
        }
        Ok(())
    }
}
