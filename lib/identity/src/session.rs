//! Browser sessions.
//!
//! A session exists from the first handshake request onwards. It starts out
//! anonymous and gains a local account once the handshake completes and the
//! account service logs the external user in.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use uitid_connect_core::AccountId;

use crate::error::StoreError;

/// Unique identifier for a session.
///
/// Session IDs are opaque strings carried in the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a new session ID from a string.
    #[must_use]
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Generates a fresh, unique session ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Returns the session ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A browser session, possibly logged into a local account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    /// Local account logged into this session, if any.
    account_id: Option<AccountId>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Creates a new anonymous session valid for the given duration.
    #[must_use]
    pub fn new(id: SessionId, duration: Duration) -> Self {
        let now = Utc::now();
        Self {
            id,
            account_id: None,
            created_at: now,
            expires_at: now + duration,
        }
    }

    /// Reconstitutes a session from storage.
    #[must_use]
    pub fn with_all_fields(
        id: SessionId,
        account_id: Option<AccountId>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            account_id,
            created_at,
            expires_at,
        }
    }

    /// Returns the session ID.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the local account logged into this session.
    #[must_use]
    pub fn account_id(&self) -> Option<AccountId> {
        self.account_id
    }

    /// Returns true if no local account is logged into this session.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.account_id.is_none()
    }

    /// Returns when the session was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the session expires.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Logs a local account into this session.
    pub fn log_in(&mut self, account_id: AccountId) {
        self.account_id = Some(account_id);
    }
}

/// Storage for sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists a new session.
    async fn create(&self, session: &Session) -> Result<(), Report<StoreError>>;

    /// Looks up a session by ID.
    async fn find(&self, id: &SessionId) -> Result<Option<Session>, Report<StoreError>>;

    /// Deletes a session together with its token and binding.
    async fn delete(&self, id: &SessionId) -> Result<(), Report<StoreError>>;

    /// Moves a session, with its account and binding, to a new ID. Any
    /// pending request token is dropped and the old ID stops resolving.
    ///
    /// Returns `None` if the old session does not exist.
    async fn rotate(
        &self,
        old: &SessionId,
        new: &SessionId,
    ) -> Result<Option<Session>, Report<StoreError>>;

    /// Deletes all expired sessions, returning how many were removed.
    async fn delete_expired(&self) -> Result<u64, Report<StoreError>>;
}
