//! Local accounts and the login-or-register service.

use async_trait::async_trait;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use uitid_connect_core::AccountId;

use crate::error::AccountError;
use crate::session::SessionId;

/// Provider key under which UiTID identities are mapped to local accounts.
pub const UITID_PROVIDER_KEY: &str = "culturefeed_uitid";

/// A local account of the web application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAccount {
    id: AccountId,
    name: String,
    blocked: bool,
}

impl LocalAccount {
    /// Creates a new, active account with a generated ID.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: AccountId::new(),
            name: name.into(),
            blocked: false,
        }
    }

    /// Reconstitutes an account from storage.
    #[must_use]
    pub fn with_all_fields(id: AccountId, name: String, blocked: bool) -> Self {
        Self { id, name, blocked }
    }

    /// Returns the account ID.
    #[must_use]
    pub fn id(&self) -> AccountId {
        self.id
    }

    /// Returns the account name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the account may not log in.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// Blocks or unblocks the account.
    pub fn set_blocked(&mut self, blocked: bool) {
        self.blocked = blocked;
    }
}

/// Data used to create the local account on first login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountSeed {
    /// Preferred account name, usually the UiTID nickname.
    pub name: String,
}

impl AccountSeed {
    /// Returns the name for a new account, falling back to a
    /// provider-scoped name when the seed is empty.
    #[must_use]
    pub fn account_name(&self, provider_key: &str, external_id: &str) -> String {
        if self.name.trim().is_empty() {
            format!("{provider_key}_{external_id}")
        } else {
            self.name.clone()
        }
    }
}

/// Resolves external identities to local accounts.
#[async_trait]
pub trait LocalAccountService: Send + Sync {
    /// Logs the account mapped to `(provider_key, external_id)` into the
    /// session, registering it from `seed` when no mapping exists yet.
    ///
    /// Returns `None` when the account exists but may not log in.
    async fn login_or_register(
        &self,
        session: &SessionId,
        external_id: &str,
        provider_key: &str,
        seed: &AccountSeed,
    ) -> Result<Option<LocalAccount>, Report<AccountError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_is_active() {
        let account = LocalAccount::new("jdoe");
        assert_eq!(account.name(), "jdoe");
        assert!(!account.is_blocked());
        assert!(account.id().to_string().starts_with("acc_"));
    }

    #[test]
    fn seed_name_is_used_when_present() {
        let seed = AccountSeed {
            name: "jdoe".to_string(),
        };
        assert_eq!(seed.account_name(UITID_PROVIDER_KEY, "42"), "jdoe");
    }

    #[test]
    fn blank_seed_falls_back_to_provider_name() {
        let seed = AccountSeed {
            name: "  ".to_string(),
        };
        assert_eq!(
            seed.account_name(UITID_PROVIDER_KEY, "42"),
            "culturefeed_uitid_42"
        );
    }
}
