//! UiTID identity linking for uitid-connect.
//!
//! This crate provides:
//! - The OAuth 1.0a handshake that binds a session to a UiTID user
//!   (`HandshakeFlow`)
//! - Session-scoped request token and identity binding storage traits
//! - The link-status access gate for routes and views (`AccessGate`)
//! - The auto-login redirect for links carrying a `uid` trust signal
//! - A per-request view of the linked UiTID user (`CurrentUser`)
//! - An in-memory implementation of every store (`MemoryStore`)
//!
//! # Access Control Model
//!
//! A session is linked when it carries an identity binding with a non-empty
//! UiTID user id. Routes and views require either a linked or an unlinked
//! session; nothing finer grained exists.
//!
//! # Example
//!
//! ```
//! use uitid_connect_identity::{AccessPolicy, AutoLoginRedirect, IdentityBinding, decide, is_linked};
//!
//! let binding = IdentityBinding::new("uitid-42", "token", "secret");
//! let linked = is_linked(Some(&binding));
//!
//! let policy = AccessPolicy::from_route_requirement("TRUE");
//! assert!(decide(linked, policy).is_allowed());
//!
//! let query = vec![("uid".to_string(), "42".to_string())];
//! let redirect = AutoLoginRedirect::default().redirect_for(true, "/agenda", &query);
//! assert_eq!(
//!     redirect.as_deref(),
//!     Some("/uitid/connect?destination=%2Fagenda&skipConfirmation=true")
//! );
//! ```

pub mod access;
pub mod account;
pub mod binding;
pub mod config;
pub mod current_user;
pub mod error;
pub mod handshake;
pub mod memory;
pub mod provider;
pub mod redirect;
pub mod session;
pub mod token;

// Re-export main types at crate root
pub use access::{
    AUTHENTICATED_ROLE_CACHE_CONTEXT, AccessDecision, AccessGate, AccessOutcome, AccessPolicy,
    ROUTE_REQUIREMENT_KEY, ViewAccessOptions, decide,
};
pub use account::{AccountSeed, LocalAccount, LocalAccountService, UITID_PROVIDER_KEY};
pub use binding::{IdentityBinding, SessionBindingStore, is_linked};
pub use config::{ProviderConfig, ProviderConfigBuilder};
pub use current_user::{CurrentUser, ProfileCache};
pub use error::{AccountError, HandshakeError, ProviderError, StoreError};
pub use handshake::{
    CallbackParams, FinalizeOutcome, GENERIC_LOGIN_ERROR, HandshakeConfig, HandshakeFailure,
    HandshakeFlow, HandshakeState, InertReason, InitiateOutcome, InitiateRequest, RedirectTarget,
};
pub use memory::MemoryStore;
pub use provider::{
    AccessToken, AuthorizeMode, AuthorizeRequest, ExternalIdentityClient, ExternalUser,
    MembershipRole, Page, PageMembership, build_authorize_url,
};
pub use redirect::{AutoLoginRedirect, TRUST_SIGNAL_PARAM, parse_query};
pub use session::{Session, SessionId, SessionStore};
pub use token::{RequestToken, TokenStore};
