//! UiTID provider configuration.
//!
//! Fields with defaults can be omitted when loading from environment
//! variables.

use serde::{Deserialize, Serialize};

use crate::account::UITID_PROVIDER_KEY;

/// Configuration for the UiTID OAuth 1.0a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the UiTID REST API (e.g. "https://www.uitid.be/uitid/rest/").
    /// Request token, access token, user and authorize paths are resolved
    /// relative to it.
    endpoint: String,
    /// OAuth consumer key registered with UiTID.
    consumer_key: String,
    /// OAuth consumer secret.
    consumer_secret: String,
    /// Key under which UiTID identities are mapped to local accounts.
    /// Default: "culturefeed_uitid"
    #[serde(default = "default_provider_key")]
    provider_key: String,
    /// Timeout for a single provider request, in seconds.
    /// Default: 10
    #[serde(default = "default_request_timeout_seconds")]
    request_timeout_seconds: u64,
}

fn default_provider_key() -> String {
    UITID_PROVIDER_KEY.to_string()
}

fn default_request_timeout_seconds() -> u64 {
    10
}

/// Appends the trailing slash relative URL joins depend on.
fn normalize_endpoint(endpoint: String) -> String {
    if endpoint.ends_with('/') {
        endpoint
    } else {
        format!("{endpoint}/")
    }
}

impl ProviderConfig {
    /// Creates a provider configuration with defaults for optional fields.
    #[must_use]
    pub fn new(endpoint: String, consumer_key: String, consumer_secret: String) -> Self {
        Self {
            endpoint: normalize_endpoint(endpoint),
            consumer_key,
            consumer_secret,
            provider_key: default_provider_key(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }

    /// Creates a configuration builder for more customization.
    #[must_use]
    pub fn builder(
        endpoint: String,
        consumer_key: String,
        consumer_secret: String,
    ) -> ProviderConfigBuilder {
        ProviderConfigBuilder::new(endpoint, consumer_key, consumer_secret)
    }

    /// Returns the API endpoint, always ending in a slash.
    #[must_use]
    pub fn endpoint(&self) -> String {
        normalize_endpoint(self.endpoint.clone())
    }

    /// Returns the OAuth consumer key.
    #[must_use]
    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    /// Returns the OAuth consumer secret.
    #[must_use]
    pub fn consumer_secret(&self) -> &str {
        &self.consumer_secret
    }

    /// Returns the account mapping provider key.
    #[must_use]
    pub fn provider_key(&self) -> &str {
        &self.provider_key
    }

    /// Returns the per-request timeout in seconds.
    #[must_use]
    pub fn request_timeout_seconds(&self) -> u64 {
        self.request_timeout_seconds
    }
}

/// Builder for `ProviderConfig`.
#[derive(Debug)]
pub struct ProviderConfigBuilder {
    endpoint: String,
    consumer_key: String,
    consumer_secret: String,
    provider_key: String,
    request_timeout_seconds: u64,
}

impl ProviderConfigBuilder {
    /// Creates a new builder with required fields.
    #[must_use]
    pub fn new(endpoint: String, consumer_key: String, consumer_secret: String) -> Self {
        Self {
            endpoint,
            consumer_key,
            consumer_secret,
            provider_key: default_provider_key(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }

    /// Sets the account mapping provider key.
    #[must_use]
    pub fn provider_key(mut self, key: String) -> Self {
        self.provider_key = key;
        self
    }

    /// Sets the per-request timeout in seconds.
    #[must_use]
    pub fn request_timeout_seconds(mut self, seconds: u64) -> Self {
        self.request_timeout_seconds = seconds;
        self
    }

    /// Builds the `ProviderConfig`.
    #[must_use]
    pub fn build(self) -> ProviderConfig {
        ProviderConfig {
            endpoint: normalize_endpoint(self.endpoint),
            consumer_key: self.consumer_key,
            consumer_secret: self.consumer_secret,
            provider_key: self.provider_key,
            request_timeout_seconds: self.request_timeout_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_has_defaults() {
        let config = ProviderConfig::new(
            "https://www.uitid.be/uitid/rest/".to_string(),
            "key".to_string(),
            "secret".to_string(),
        );

        assert_eq!(config.endpoint(), "https://www.uitid.be/uitid/rest/");
        assert_eq!(config.consumer_key(), "key");
        assert_eq!(config.consumer_secret(), "secret");
        assert_eq!(config.provider_key(), "culturefeed_uitid");
        assert_eq!(config.request_timeout_seconds(), 10);
    }

    #[test]
    fn endpoint_gets_trailing_slash() {
        let config = ProviderConfig::new(
            "https://www.uitid.be/uitid/rest".to_string(),
            "key".to_string(),
            "secret".to_string(),
        );
        assert_eq!(config.endpoint(), "https://www.uitid.be/uitid/rest/");
    }

    #[test]
    fn builder_allows_customization() {
        let config = ProviderConfig::builder(
            "https://acc.uitid.be/uitid/rest/".to_string(),
            "key".to_string(),
            "secret".to_string(),
        )
        .provider_key("uitid_acc".to_string())
        .request_timeout_seconds(3)
        .build();

        assert_eq!(config.provider_key(), "uitid_acc");
        assert_eq!(config.request_timeout_seconds(), 3);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let json = r#"{
            "endpoint": "https://www.uitid.be/uitid/rest",
            "consumer_key": "key",
            "consumer_secret": "secret"
        }"#;

        let config: ProviderConfig = serde_json::from_str(json).expect("deserialize");

        assert_eq!(config.endpoint(), "https://www.uitid.be/uitid/rest/");
        assert_eq!(config.provider_key(), "culturefeed_uitid");
        assert_eq!(config.request_timeout_seconds(), 10);
    }
}
