//! Configuration management for NowPlaying OSC
//!
//! Handles loading, defaulting and validation of the YAML configuration file,
//! and resolution of the Spotify credentials from the environment or the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::warn;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub osc: OscConfig,
    #[serde(default)]
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

/// OSC endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OscConfig {
    #[serde(default = "default_osc_host")]
    pub host: String,
    /// VRChat's OSC input port
    #[serde(default = "default_osc_port")]
    pub port: u16,
    /// VRChat's OSC output port (sniffer mode)
    #[serde(default = "default_osc_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_chatbox_address")]
    pub chatbox_address: String,
    /// Payload sent while the operator is typing
    #[serde(default = "default_typing_text")]
    pub typing_text: String,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

/// Spotify Web API configuration
///
/// Credentials are optional here; the environment takes precedence.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpotifyConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_accounts_base")]
    pub accounts_base: String,
}

/// Poll and pause policy, all in milliseconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_manual_pause")]
    pub manual_pause_ms: u64,
    #[serde(default = "default_typing_pause")]
    pub typing_pause_ms: u64,
    #[serde(default = "default_typing_debounce")]
    pub typing_debounce_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn manual_pause(&self) -> Duration {
        Duration::from_millis(self.manual_pause_ms)
    }

    pub fn typing_pause(&self) -> Duration {
        Duration::from_millis(self.typing_pause_ms)
    }

    pub fn typing_debounce(&self) -> Duration {
        Duration::from_millis(self.typing_debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Resolved Spotify application credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// One or more credentials could not be found anywhere
#[derive(Debug, thiserror::Error)]
#[error("Missing Spotify credentials: {}", .0.join(", "))]
pub struct MissingCredentials(pub Vec<&'static str>);

/// Environment variables checked for each credential, in priority order
pub const CLIENT_ID_VARS: &[&str] = &["SPOTIFY_CLIENT_ID", "client_id"];
pub const CLIENT_SECRET_VARS: &[&str] = &["SPOTIFY_CLIENT_SECRET", "client_secret"];
pub const REDIRECT_URI_VARS: &[&str] = &["SPOTIFY_REDIRECT_URI", "redirect_uri"];

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        if fs::try_exists(path).await.unwrap_or(false) {
            return Self::load(path).await;
        }

        warn!(
            "Config file {} not found, using defaults",
            path.display()
        );
        Ok(Self::default())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.osc.host.is_empty() {
            anyhow::bail!("osc.host cannot be empty");
        }
        if self.osc.port == 0 {
            anyhow::bail!("osc.port cannot be 0");
        }
        if !self.osc.chatbox_address.starts_with('/') {
            anyhow::bail!(
                "osc.chatbox_address must start with '/' (got {:?})",
                self.osc.chatbox_address
            );
        }
        if self.osc.max_message_chars == 0 {
            anyhow::bail!("osc.max_message_chars must be greater than 0");
        }

        let timing = &self.timing;
        for (name, value) in [
            ("poll_interval_ms", timing.poll_interval_ms),
            ("typing_debounce_ms", timing.typing_debounce_ms),
            ("request_timeout_ms", timing.request_timeout_ms),
        ] {
            if value == 0 {
                anyhow::bail!("timing.{} must be greater than 0", name);
            }
        }

        Ok(())
    }

    /// Resolve credentials: environment first, then the config file
    pub fn credentials(&self) -> Result<Credentials, MissingCredentials> {
        let client_id = resolve(CLIENT_ID_VARS, self.spotify.client_id.as_deref());
        let client_secret = resolve(CLIENT_SECRET_VARS, self.spotify.client_secret.as_deref());
        let redirect_uri = resolve(REDIRECT_URI_VARS, self.spotify.redirect_uri.as_deref());

        match (client_id, client_secret, redirect_uri) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Ok(Credentials {
                client_id,
                client_secret,
                redirect_uri,
            }),
            (client_id, client_secret, redirect_uri) => {
                let mut missing = Vec::new();
                if client_id.is_none() {
                    missing.push("client_id");
                }
                if client_secret.is_none() {
                    missing.push("client_secret");
                }
                if redirect_uri.is_none() {
                    missing.push("redirect_uri");
                }
                Err(MissingCredentials(missing))
            }
        }
    }
}

fn resolve(vars: &[&str], file_value: Option<&str>) -> Option<String> {
    vars.iter()
        .filter_map(|var| std::env::var(var).ok())
        .chain(file_value.map(str::to_string))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            host: default_osc_host(),
            port: default_osc_port(),
            listen_port: default_osc_listen_port(),
            chatbox_address: default_chatbox_address(),
            typing_text: default_typing_text(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            api_base: default_api_base(),
            accounts_base: default_accounts_base(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            manual_pause_ms: default_manual_pause(),
            typing_pause_ms: default_typing_pause(),
            typing_debounce_ms: default_typing_debounce(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

// Default value functions
fn default_osc_host() -> String { "127.0.0.1".to_string() }
fn default_osc_port() -> u16 { 9000 }
fn default_osc_listen_port() -> u16 { 9001 }
fn default_chatbox_address() -> String { "/chatbox/input".to_string() }
fn default_typing_text() -> String { ". . .".to_string() }
fn default_max_message_chars() -> usize { 144 }
fn default_api_base() -> String { "https://api.spotify.com".to_string() }
fn default_accounts_base() -> String { "https://accounts.spotify.com".to_string() }
fn default_poll_interval() -> u64 { 10_000 }
fn default_manual_pause() -> u64 { 10_000 }
fn default_typing_pause() -> u64 { 5_000 }
fn default_typing_debounce() -> u64 { 500 }
fn default_request_timeout() -> u64 { 5_000 }

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_credential_env() {
        for var in CLIENT_ID_VARS
            .iter()
            .chain(CLIENT_SECRET_VARS)
            .chain(REDIRECT_URI_VARS)
        {
            std::env::remove_var(var);
        }
    }

    #[tokio::test]
    async fn test_load_partial_file_fills_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
osc:
  port: 9100
timing:
  poll_interval_ms: 3000
"#,
        )?;

        let config = AppConfig::load(&path).await?;

        assert_eq!(config.osc.port, 9100);
        assert_eq!(config.osc.host, "127.0.0.1");
        assert_eq!(config.osc.chatbox_address, "/chatbox/input");
        assert_eq!(config.timing.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.timing.manual_pause(), Duration::from_secs(10));
        assert_eq!(config.timing.typing_pause(), Duration::from_secs(5));
        assert_eq!(config.timing.typing_debounce(), Duration::from_millis(500));
        Ok(())
    }

    #[tokio::test]
    async fn test_load_or_default_without_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = AppConfig::load_or_default(&temp_dir.path().join("missing.yaml")).await?;

        assert_eq!(config.osc.port, 9000);
        assert_eq!(config.timing.poll_interval_ms, 10_000);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_values() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "timing:\n  poll_interval_ms: 0\n")?;

        let err = AppConfig::load(&path).await.unwrap_err();
        assert!(format!("{:#}", err).contains("poll_interval_ms"));
        Ok(())
    }

    #[test]
    fn test_validate_chatbox_address() {
        let mut config = AppConfig::default();
        config.osc.chatbox_address = "chatbox/input".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_credentials_from_file() {
        clear_credential_env();
        let mut config = AppConfig::default();
        config.spotify.client_id = Some("id-from-file".to_string());
        config.spotify.client_secret = Some("secret-from-file".to_string());
        config.spotify.redirect_uri = Some("http://127.0.0.1:8888/callback".to_string());

        let creds = config.credentials().unwrap();
        assert_eq!(creds.client_id, "id-from-file");
        assert_eq!(creds.redirect_uri, "http://127.0.0.1:8888/callback");
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        clear_credential_env();
        std::env::set_var("SPOTIFY_CLIENT_ID", "id-from-env");
        std::env::set_var("client_secret", "legacy-secret");
        std::env::set_var("redirect_uri", "http://localhost/cb");

        let mut config = AppConfig::default();
        config.spotify.client_id = Some("id-from-file".to_string());

        let creds = config.credentials().unwrap();
        assert_eq!(creds.client_id, "id-from-env");
        assert_eq!(creds.client_secret, "legacy-secret");
        assert_eq!(creds.redirect_uri, "http://localhost/cb");

        clear_credential_env();
    }

    #[test]
    #[serial]
    fn test_missing_credentials_are_named() {
        clear_credential_env();
        std::env::set_var("SPOTIFY_CLIENT_ID", "   ");

        let mut config = AppConfig::default();
        config.spotify.client_secret = Some("secret".to_string());

        let missing = config.credentials().unwrap_err();
        assert_eq!(missing.0, vec!["client_id", "redirect_uri"]);
        assert!(missing.to_string().contains("client_id, redirect_uri"));

        clear_credential_env();
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = Credentials {
            client_id: "abc".to_string(),
            client_secret: "hunter2".to_string(),
            redirect_uri: "http://localhost".to_string(),
        };
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
