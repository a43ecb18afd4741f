//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables.
//!
//! See [`ProviderConfig`](uitid_connect_identity::ProviderConfig) for the
//! UiTID provider configuration.

use serde::Deserialize;
use uitid_connect_identity::{ProviderConfig, ViewAccessOptions};

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL. Without one, state is kept in
    /// memory and lost on restart.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Public base URL of this application (e.g. "https://app.example/").
    pub base_url: String,

    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// UiTID provider configuration.
    pub provider: ProviderConfig,

    /// Handshake behaviour.
    #[serde(default)]
    pub handshake: HandshakeSettings,

    /// Locale negotiation.
    #[serde(default)]
    pub locale: LocaleConfig,

    /// Access options of the admin pages listing.
    #[serde(default)]
    pub admin_pages_view: ViewAccessOptions,
}

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session duration in minutes.
    #[serde(default = "default_session_duration_minutes")]
    pub duration_minutes: i64,

    /// Interval between session cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true; set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

fn default_session_duration_minutes() -> i64 {
    1440
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_secure_cookies() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_minutes: default_session_duration_minutes(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            secure_cookies: default_secure_cookies(),
        }
    }
}

/// How callbacks that neither bind nor fail are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InertResponse {
    /// `200 OK` with an empty body.
    #[default]
    Empty,
    /// Redirect home with the generic login error.
    RedirectHome,
}

/// Handshake-related configuration.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct HandshakeSettings {
    #[serde(default)]
    pub inert_response: InertResponse,
}

/// Locale negotiation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocaleConfig {
    /// Locale used when the browser asks for nothing supported.
    #[serde(default = "default_locale")]
    pub default: String,

    /// Locales the provider's authorize page can be shown in.
    #[serde(default = "default_supported_locales")]
    pub supported: Vec<String>,
}

fn default_locale() -> String {
    "nl".to_string()
}

fn default_supported_locales() -> Vec<String> {
    ["nl", "en", "fr", "de"].map(String::from).to_vec()
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            default: default_locale(),
            supported: default_supported_locales(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("locale.supported")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_config_has_correct_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.duration_minutes, 1440);
        assert_eq!(config.cleanup_interval_seconds, 300);
        assert!(config.secure_cookies);
    }

    #[test]
    fn inert_response_defaults_to_empty() {
        assert_eq!(HandshakeSettings::default().inert_response, InertResponse::Empty);
    }

    #[test]
    fn server_config_deserializes_with_defaults() {
        let json = r#"{
            "base_url": "https://app.example/",
            "provider": {
                "endpoint": "https://www.uitid.be/uitid/rest",
                "consumer_key": "key",
                "consumer_secret": "secret"
            },
            "handshake": {"inert_response": "redirect_home"}
        }"#;
        let config: ServerConfig = serde_json::from_str(json).expect("deserialize");

        assert!(config.database_url.is_none());
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.handshake.inert_response, InertResponse::RedirectHome);
        assert_eq!(config.locale.default, "nl");
        assert_eq!(config.locale.supported, vec!["nl", "en", "fr", "de"]);
        assert_eq!(config.admin_pages_view.status, 1);
        assert_eq!(config.provider.endpoint(), "https://www.uitid.be/uitid/rest/");
    }
}
