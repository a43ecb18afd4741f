//! Error types for the identity crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `ProviderError`: failures talking to the UiTID API
//! - `StoreError`: failures reading or writing session-scoped state
//! - `AccountError`: failures resolving the local account
//! - `HandshakeError`: why a handshake ended in the failed state

use std::fmt;

/// Errors from calls to the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The HTTP request could not be completed.
    RequestFailed { operation: String, details: String },
    /// The provider answered with a non-success status.
    UnexpectedStatus { operation: String, status: u16 },
    /// The provider response could not be parsed.
    InvalidResponse { operation: String, reason: String },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestFailed { operation, details } => {
                write!(f, "provider request '{operation}' failed: {details}")
            }
            Self::UnexpectedStatus { operation, status } => {
                write!(f, "provider request '{operation}' returned status {status}")
            }
            Self::InvalidResponse { operation, reason } => {
                write!(f, "invalid provider response for '{operation}': {reason}")
            }
        }
    }
}

impl std::error::Error for ProviderError {}

/// Errors from session-scoped storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the query.
    Unavailable { details: String },
    /// Stored data could not be decoded.
    Corrupt { details: String },
    /// The session the data belongs to does not exist.
    MissingSession { session_id: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { details } => write!(f, "session store unavailable: {details}"),
            Self::Corrupt { details } => write!(f, "corrupt session data: {details}"),
            Self::MissingSession { session_id } => write!(f, "session {session_id} does not exist"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from local account resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    /// The session the account should be logged into does not exist.
    SessionNotFound { session_id: String },
    /// The account storage failed.
    Storage { details: String },
}

impl fmt::Display for AccountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound { session_id } => {
                write!(f, "session not found for login: {session_id}")
            }
            Self::Storage { details } => write!(f, "account storage error: {details}"),
        }
    }
}

impl std::error::Error for AccountError {}

/// Reasons a handshake transitions to the failed state.
///
/// None of these are shown to the end user; they are logged for operators
/// while the user sees a generic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Fetching a request token failed.
    RequestTokenFailed,
    /// The provider returned an empty request token.
    EmptyRequestToken,
    /// The request token could not be stored for the session.
    TokenStoreFailed,
    /// The callback arrived but no request token was stored for the session.
    MissingRequestToken { session_id: String },
    /// Exchanging the verifier for an access token failed.
    AccessTokenFailed,
    /// Fetching the external user profile failed.
    ProfileFailed { user_id: String },
    /// The identity binding could not be written.
    BindingFailed,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestTokenFailed => write!(f, "failed to fetch request token"),
            Self::EmptyRequestToken => write!(f, "provider returned an empty request token"),
            Self::TokenStoreFailed => write!(f, "failed to store request token"),
            Self::MissingRequestToken { session_id } => {
                write!(f, "no request token stored for session {session_id}")
            }
            Self::AccessTokenFailed => write!(f, "failed to exchange verifier for access token"),
            Self::ProfileFailed { user_id } => {
                write!(f, "failed to fetch profile for external user {user_id}")
            }
            Self::BindingFailed => write!(f, "failed to write identity binding"),
        }
    }
}

impl std::error::Error for HandshakeError {}
