//! In-memory implementation of every store trait.
//!
//! Used by tests and by the server when no database is configured. All state
//! lives behind a single lock, so each trait call is one atomic update.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use rootcause::Report;
use tracing::debug;
use uitid_connect_core::AccountId;

use crate::account::{AccountSeed, LocalAccount, LocalAccountService};
use crate::binding::{IdentityBinding, SessionBindingStore};
use crate::error::{AccountError, StoreError};
use crate::session::{Session, SessionId, SessionStore};
use crate::token::{RequestToken, TokenStore};

#[derive(Debug, Default)]
struct State {
    sessions: HashMap<SessionId, Session>,
    request_tokens: HashMap<SessionId, RequestToken>,
    bindings: HashMap<SessionId, IdentityBinding>,
    accounts: HashMap<AccountId, LocalAccount>,
    /// `(provider_key, external_id)` to local account.
    external_auth: HashMap<(String, String), AccountId>,
}

/// Process-local session, token, binding and account storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a local account mapped to an external identity.
    pub fn register_account(
        &self,
        provider_key: &str,
        external_id: &str,
        name: &str,
    ) -> LocalAccount {
        let account = LocalAccount::new(name);
        let mut state = self.write();
        state.accounts.insert(account.id(), account.clone());
        state.external_auth.insert(
            (provider_key.to_string(), external_id.to_string()),
            account.id(),
        );
        account
    }

    /// Blocks a local account. Returns false if it does not exist.
    pub fn block_account(&self, id: AccountId) -> bool {
        match self.write().accounts.get_mut(&id) {
            Some(account) => {
                account.set_blocked(true);
                true
            }
            None => false,
        }
    }

    /// Returns a local account by ID.
    #[must_use]
    pub fn account(&self, id: AccountId) -> Option<LocalAccount> {
        self.read().accounts.get(&id).cloned()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, session: &Session) -> Result<(), Report<StoreError>> {
        self.write()
            .sessions
            .insert(session.id().clone(), session.clone());
        Ok(())
    }

    async fn find(&self, id: &SessionId) -> Result<Option<Session>, Report<StoreError>> {
        Ok(self.read().sessions.get(id).cloned())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), Report<StoreError>> {
        let mut state = self.write();
        state.sessions.remove(id);
        state.request_tokens.remove(id);
        state.bindings.remove(id);
        Ok(())
    }

    async fn rotate(
        &self,
        old: &SessionId,
        new: &SessionId,
    ) -> Result<Option<Session>, Report<StoreError>> {
        let mut state = self.write();
        let Some(previous) = state.sessions.remove(old) else {
            return Ok(None);
        };
        state.request_tokens.remove(old);

        let session = Session::with_all_fields(
            new.clone(),
            previous.account_id(),
            previous.created_at(),
            previous.expires_at(),
        );
        state.sessions.insert(new.clone(), session.clone());
        if let Some(binding) = state.bindings.remove(old) {
            state.bindings.insert(new.clone(), binding);
        }
        debug!(session = %new, "session rotated");
        Ok(Some(session))
    }

    async fn delete_expired(&self) -> Result<u64, Report<StoreError>> {
        let mut state = self.write();
        let expired: Vec<SessionId> = state
            .sessions
            .values()
            .filter(|s| s.is_expired())
            .map(|s| s.id().clone())
            .collect();
        for id in &expired {
            state.sessions.remove(id);
            state.request_tokens.remove(id);
            state.bindings.remove(id);
        }
        Ok(expired.len() as u64)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn request_token(
        &self,
        session: &SessionId,
    ) -> Result<Option<RequestToken>, Report<StoreError>> {
        Ok(self.read().request_tokens.get(session).cloned())
    }

    async fn store_request_token(
        &self,
        session: &SessionId,
        token: &RequestToken,
    ) -> Result<(), Report<StoreError>> {
        self.write()
            .request_tokens
            .insert(session.clone(), token.clone());
        Ok(())
    }

    async fn clear_request_token(&self, session: &SessionId) -> Result<(), Report<StoreError>> {
        self.write().request_tokens.remove(session);
        Ok(())
    }
}

#[async_trait]
impl SessionBindingStore for MemoryStore {
    async fn binding(
        &self,
        session: &SessionId,
    ) -> Result<Option<IdentityBinding>, Report<StoreError>> {
        Ok(self.read().bindings.get(session).cloned())
    }

    async fn set_binding(
        &self,
        session: &SessionId,
        binding: &IdentityBinding,
    ) -> Result<(), Report<StoreError>> {
        self.write()
            .bindings
            .insert(session.clone(), binding.clone());
        Ok(())
    }
}

#[async_trait]
impl LocalAccountService for MemoryStore {
    async fn login_or_register(
        &self,
        session: &SessionId,
        external_id: &str,
        provider_key: &str,
        seed: &AccountSeed,
    ) -> Result<Option<LocalAccount>, Report<AccountError>> {
        let mut state = self.write();
        if !state.sessions.contains_key(session) {
            return Err(AccountError::SessionNotFound {
                session_id: session.to_string(),
            }
            .into());
        }

        let key = (provider_key.to_string(), external_id.to_string());
        let account = match state
            .external_auth
            .get(&key)
            .and_then(|id| state.accounts.get(id))
        {
            Some(existing) => existing.clone(),
            None => {
                let account = LocalAccount::new(seed.account_name(provider_key, external_id));
                debug!(account = %account.id(), external_id, "registering local account");
                state.accounts.insert(account.id(), account.clone());
                state.external_auth.insert(key, account.id());
                account
            }
        };

        if account.is_blocked() {
            return Ok(None);
        }

        if let Some(s) = state.sessions.get_mut(session) {
            s.log_in(account.id());
        }
        Ok(Some(account))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::account::UITID_PROVIDER_KEY;

    async fn store_with_session() -> (MemoryStore, SessionId) {
        let store = MemoryStore::new();
        let id = SessionId::generate();
        store
            .create(&Session::new(id.clone(), Duration::hours(1)))
            .await
            .expect("create");
        (store, id)
    }

    fn seed(name: &str) -> AccountSeed {
        AccountSeed {
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn request_token_roundtrip_and_clear() {
        let (store, id) = store_with_session().await;
        let token = RequestToken::new("t", "s");

        store.store_request_token(&id, &token).await.expect("store");
        assert_eq!(store.request_token(&id).await.expect("read"), Some(token));

        store.clear_request_token(&id).await.expect("clear");
        assert_eq!(store.request_token(&id).await.expect("read"), None);
    }

    #[tokio::test]
    async fn binding_is_replaced_whole() {
        let (store, id) = store_with_session().await;
        store
            .set_binding(&id, &IdentityBinding::new("u1", "t1", "s1"))
            .await
            .expect("bind");
        store
            .set_binding(&id, &IdentityBinding::new("u2", "t2", "s2"))
            .await
            .expect("bind");

        assert_eq!(
            store.binding(&id).await.expect("read"),
            Some(IdentityBinding::new("u2", "t2", "s2"))
        );
    }

    #[tokio::test]
    async fn first_login_registers_and_logs_in() {
        let (store, id) = store_with_session().await;

        let account = store
            .login_or_register(&id, "uitid-1", UITID_PROVIDER_KEY, &seed("jdoe"))
            .await
            .expect("login")
            .expect("account");

        assert_eq!(account.name(), "jdoe");
        let session = store.find(&id).await.expect("find").expect("session");
        assert_eq!(session.account_id(), Some(account.id()));
        assert_eq!(store.account(account.id()), Some(account));
    }

    #[tokio::test]
    async fn second_login_reuses_account() {
        let (store, id) = store_with_session().await;
        let first = store
            .login_or_register(&id, "uitid-1", UITID_PROVIDER_KEY, &seed("jdoe"))
            .await
            .expect("login")
            .expect("account");
        let second = store
            .login_or_register(&id, "uitid-1", UITID_PROVIDER_KEY, &seed("renamed"))
            .await
            .expect("login")
            .expect("account");

        assert_eq!(first.id(), second.id());
        assert_eq!(second.name(), "jdoe");
    }

    #[tokio::test]
    async fn blocked_account_is_not_logged_in() {
        let (store, id) = store_with_session().await;
        let account = store.register_account(UITID_PROVIDER_KEY, "uitid-1", "jdoe");
        assert!(store.block_account(account.id()));

        let result = store
            .login_or_register(&id, "uitid-1", UITID_PROVIDER_KEY, &seed("jdoe"))
            .await
            .expect("login");

        assert!(result.is_none());
        let session = store.find(&id).await.expect("find").expect("session");
        assert!(session.is_anonymous());
    }

    #[tokio::test]
    async fn login_without_session_fails() {
        let store = MemoryStore::new();
        let result = store
            .login_or_register(
                &SessionId::from("missing"),
                "uitid-1",
                UITID_PROVIDER_KEY,
                &seed("jdoe"),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_expired_drops_session_state() {
        let store = MemoryStore::new();
        let expired = SessionId::from("old");
        let live = SessionId::from("new");
        store
            .create(&Session::new(expired.clone(), Duration::seconds(-1)))
            .await
            .expect("create");
        store
            .create(&Session::new(live.clone(), Duration::hours(1)))
            .await
            .expect("create");
        store
            .set_binding(&expired, &IdentityBinding::new("u", "t", "s"))
            .await
            .expect("bind");

        assert_eq!(store.delete_expired().await.expect("cleanup"), 1);
        assert!(store.find(&expired).await.expect("find").is_none());
        assert!(store.binding(&expired).await.expect("read").is_none());
        assert!(store.find(&live).await.expect("find").is_some());
    }

    #[tokio::test]
    async fn rotate_moves_account_and_binding() {
        let (store, old) = store_with_session().await;
        let account = store
            .login_or_register(&old, "uitid-42", UITID_PROVIDER_KEY, &seed("jdoe"))
            .await
            .expect("login")
            .expect("account");
        store
            .store_request_token(&old, &RequestToken::new("req", "req-secret"))
            .await
            .expect("store token");
        store
            .set_binding(&old, &IdentityBinding::new("uitid-42", "acc", "acc-secret"))
            .await
            .expect("bind");

        let new = SessionId::generate();
        let rotated = store
            .rotate(&old, &new)
            .await
            .expect("rotate")
            .expect("session");

        assert_eq!(rotated.id(), &new);
        assert_eq!(rotated.account_id(), Some(account.id()));
        assert!(store.find(&old).await.expect("find").is_none());
        assert!(store.binding(&old).await.expect("read").is_none());
        assert!(store.request_token(&new).await.expect("read").is_none());
        assert_eq!(
            store
                .binding(&new)
                .await
                .expect("read")
                .map(|b| b.external_user_id().to_string()),
            Some("uitid-42".to_string())
        );
    }

    #[tokio::test]
    async fn rotate_unknown_session_is_none() {
        let store = MemoryStore::new();
        let rotated = store
            .rotate(&SessionId::generate(), &SessionId::generate())
            .await
            .expect("rotate");
        assert!(rotated.is_none());
    }

    #[tokio::test]
    async fn delete_removes_session() {
        let (store, id) = store_with_session().await;
        store.delete(&id).await.expect("delete");
        assert!(store.find(&id).await.expect("find").is_none());
    }
}
