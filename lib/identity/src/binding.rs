//! Durable identity bindings between a session and a UiTID user.
//!
//! A binding holds the external user id together with the long-lived access
//! token pair. It is written as one record: stores must never persist only
//! part of it.

use async_trait::async_trait;
use rootcause::Report;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::provider::AccessToken;
use crate::session::SessionId;

/// The external identity bound to a session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityBinding {
    external_user_id: String,
    access_token: String,
    access_token_secret: String,
}

impl IdentityBinding {
    /// Creates a binding from its three parts.
    #[must_use]
    pub fn new(
        external_user_id: impl Into<String>,
        access_token: impl Into<String>,
        access_token_secret: impl Into<String>,
    ) -> Self {
        Self {
            external_user_id: external_user_id.into(),
            access_token: access_token.into(),
            access_token_secret: access_token_secret.into(),
        }
    }

    /// Creates a binding from the result of the access token exchange.
    #[must_use]
    pub fn from_access_token(token: &AccessToken) -> Self {
        Self::new(token.user_id(), token.token(), token.secret())
    }

    /// Returns the UiTID user id.
    #[must_use]
    pub fn external_user_id(&self) -> &str {
        &self.external_user_id
    }

    /// Returns the access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the access token secret.
    #[must_use]
    pub fn access_token_secret(&self) -> &str {
        &self.access_token_secret
    }

    /// Returns the access token pair for signing calls on the user's behalf.
    #[must_use]
    pub fn credentials(&self) -> AccessToken {
        AccessToken::new(
            &self.access_token,
            &self.access_token_secret,
            &self.external_user_id,
        )
    }
}

impl std::fmt::Debug for IdentityBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityBinding")
            .field("external_user_id", &self.external_user_id)
            .field("access_token", &"<redacted>")
            .field("access_token_secret", &"<redacted>")
            .finish()
    }
}

/// Returns true if the binding marks the session as linked to UiTID.
#[must_use]
pub fn is_linked(binding: Option<&IdentityBinding>) -> bool {
    binding.is_some_and(|b| !b.external_user_id.is_empty())
}

/// Per-session storage for identity bindings.
#[async_trait]
pub trait SessionBindingStore: Send + Sync {
    /// Returns the binding for the session, if one was written.
    async fn binding(
        &self,
        session: &SessionId,
    ) -> Result<Option<IdentityBinding>, Report<StoreError>>;

    /// Replaces the binding for the session in a single write.
    async fn set_binding(
        &self,
        session: &SessionId,
        binding: &IdentityBinding,
    ) -> Result<(), Report<StoreError>>;
}
