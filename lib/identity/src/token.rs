//! Transient request token storage.
//!
//! The request token issued at the start of a handshake is kept for the
//! session that started it and consumed by the callback. At most one token
//! exists per session; a later handshake replaces it.

use async_trait::async_trait;
use rootcause::Report;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::session::SessionId;

/// An OAuth 1.0a request token and its secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestToken {
    token: String,
    secret: String,
}

impl RequestToken {
    /// Creates a request token pair.
    #[must_use]
    pub fn new(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
        }
    }

    /// Returns the public token value.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the token secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Returns true if the provider handed out an empty token.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
    }
}

impl std::fmt::Debug for RequestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestToken")
            .field("token", &self.token)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Session-scoped storage for the in-flight request token.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Returns the request token stored for the session.
    async fn request_token(
        &self,
        session: &SessionId,
    ) -> Result<Option<RequestToken>, Report<StoreError>>;

    /// Stores the request token for the session, replacing any earlier one.
    async fn store_request_token(
        &self,
        session: &SessionId,
        token: &RequestToken,
    ) -> Result<(), Report<StoreError>>;

    /// Removes both the token and its secret for the session.
    async fn clear_request_token(&self, session: &SessionId) -> Result<(), Report<StoreError>>;
}
