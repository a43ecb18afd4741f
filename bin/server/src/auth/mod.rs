//! UiTID authentication for the uitid-connect server.
//!
//! This module provides:
//! - The OAuth 1.0a handshake endpoints (`connect`, `authorize`)
//! - The authenticated landing page and the link-status route gate
//! - The auto-login interceptor for links carrying `uid`
//! - Postgres-backed storage and the signed UiTID REST client
//!
//! # Authorization Model
//!
//! The only question asked of a session is whether it is linked to a UiTID
//! user. Routes declare the answer they need through `_is_uitid_user`, views
//! through their saved `status` option. Both resolve to the same decision.

pub mod db;
pub mod middleware;
pub mod oauth1;
pub mod routes;
pub mod uitid;

use std::sync::Arc;

use uitid_connect_identity::{
    AccessGate, AutoLoginRedirect, ExternalIdentityClient, HandshakeConfig, HandshakeFlow,
    LocalAccountService, ProfileCache, SessionBindingStore, SessionStore, TokenStore,
    ViewAccessOptions,
};
use url::Url;

use crate::config::{HandshakeSettings, LocaleConfig, ServerConfig, SessionConfig};

pub use db::PgStore;
pub use middleware::{MaybeSession, auto_login, require_link_status};
pub use routes::{admin_pages, authenticated, authorize, connect, home, profile};
pub use uitid::UitidClient;

/// A storage backend implementing every identity store.
pub trait IdentityBackend:
    SessionStore + TokenStore + SessionBindingStore + LocalAccountService + 'static
{
}

impl<T> IdentityBackend for T where
    T: SessionStore + TokenStore + SessionBindingStore + LocalAccountService + 'static
{
}

/// Settings the request handlers need.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub base_url: Url,
    pub provider_key: String,
    pub session: SessionConfig,
    pub handshake: HandshakeSettings,
    pub locale: LocaleConfig,
    pub admin_pages_view: ViewAccessOptions,
}

impl AppSettings {
    /// Extracts handler settings from the server configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid.
    pub fn from_config(config: &ServerConfig) -> Result<Self, url::ParseError> {
        Ok(Self {
            base_url: Url::parse(&config.base_url)?,
            provider_key: config.provider.provider_key().to_string(),
            session: config.session.clone(),
            handshake: config.handshake,
            locale: config.locale.clone(),
            admin_pages_view: config.admin_pages_view,
        })
    }
}

/// Shared application state.
pub struct AppState {
    pub sessions: Arc<dyn SessionStore>,
    pub bindings: Arc<dyn SessionBindingStore>,
    pub client: Arc<dyn ExternalIdentityClient>,
    pub flow: HandshakeFlow,
    pub gate: AccessGate,
    pub auto_login: AutoLoginRedirect,
    pub profiles: Arc<ProfileCache>,
    pub settings: AppSettings,
}

impl AppState {
    /// Creates the application state over a storage backend.
    pub fn new<B: IdentityBackend>(
        backend: Arc<B>,
        client: Arc<dyn ExternalIdentityClient>,
        settings: AppSettings,
    ) -> Self {
        let mut handshake = HandshakeConfig::new(settings.base_url.clone());
        handshake.provider_key = settings.provider_key.clone();

        let flow = HandshakeFlow::new(
            client.clone(),
            backend.clone(),
            backend.clone(),
            backend.clone(),
            handshake,
        );

        Self {
            sessions: backend.clone(),
            bindings: backend.clone(),
            client,
            flow,
            gate: AccessGate::new(backend),
            auto_login: AutoLoginRedirect::default(),
            profiles: Arc::new(ProfileCache::new()),
            settings,
        }
    }
}
