//! Per-request view of the UiTID user behind the current session.

use std::collections::HashMap;
use std::sync::Arc;

use rootcause::Report;
use tokio::sync::RwLock;
use tracing::debug;

use crate::binding::{IdentityBinding, SessionBindingStore, is_linked};
use crate::error::{ProviderError, StoreError};
use crate::provider::{ExternalIdentityClient, ExternalUser, PageMembership};
use crate::session::SessionId;

/// In-process cache of external user profiles, keyed by UiTID user id.
#[derive(Debug, Default)]
pub struct ProfileCache {
    entries: RwLock<HashMap<String, ExternalUser>>,
}

impl ProfileCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn get(&self, user_id: &str) -> Option<ExternalUser> {
        self.entries.read().await.get(user_id).cloned()
    }

    async fn insert(&self, user: ExternalUser) {
        self.entries.write().await.insert(user.id.clone(), user);
    }

    /// Drops the cached profile of a user.
    pub async fn invalidate(&self, user_id: &str) {
        self.entries.write().await.remove(user_id);
    }
}

/// The UiTID identity of the current session, if linked.
pub struct CurrentUser {
    binding: Option<IdentityBinding>,
    client: Arc<dyn ExternalIdentityClient>,
    cache: Arc<ProfileCache>,
}

impl CurrentUser {
    /// Loads the binding of the session. No session means no UiTID user.
    ///
    /// # Errors
    ///
    /// Returns an error if the binding cannot be read.
    pub async fn load(
        session: Option<&SessionId>,
        bindings: &dyn SessionBindingStore,
        client: Arc<dyn ExternalIdentityClient>,
        cache: Arc<ProfileCache>,
    ) -> Result<Self, Report<StoreError>> {
        let binding = match session {
            Some(id) => bindings.binding(id).await?,
            None => None,
        };
        Ok(Self {
            binding: binding.filter(|b| is_linked(Some(b))),
            client,
            cache,
        })
    }

    /// Returns true if the session is linked to a UiTID user.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.binding.is_some()
    }

    /// Returns the UiTID user id.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.binding.as_ref().map(IdentityBinding::external_user_id)
    }

    /// Returns the UiTID profile, served from cache unless `reset` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile has to be fetched and the provider
    /// call fails.
    pub async fn user(&self, reset: bool) -> Result<Option<ExternalUser>, Report<ProviderError>> {
        let Some(binding) = &self.binding else {
            return Ok(None);
        };
        let user_id = binding.external_user_id();

        if !reset && let Some(user) = self.cache.get(user_id).await {
            return Ok(Some(user));
        }

        debug!(user_id, reset, "fetching uitid profile");
        let user = self
            .client
            .fetch_user(&binding.credentials(), user_id)
            .await?;
        self.cache.insert(user.clone()).await;
        Ok(Some(user))
    }

    /// Returns the display name of the UiTID user.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile cannot be fetched.
    pub async fn name(&self) -> Result<Option<String>, Report<ProviderError>> {
        Ok(self.user(false).await?.map(|user| user.display_name()))
    }

    /// Returns the pages the user administers, optionally only those in
    /// `category`.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile cannot be fetched.
    pub async fn admin_pages(
        &self,
        category: Option<&str>,
        reset: bool,
    ) -> Result<Vec<PageMembership>, Report<ProviderError>> {
        let Some(user) = self.user(reset).await? else {
            return Ok(Vec::new());
        };
        Ok(user
            .page_memberships
            .into_iter()
            .filter(PageMembership::is_admin)
            .filter(|m| {
                category
                    .filter(|c| !c.is_empty())
                    .is_none_or(|c| m.page.categories.iter().any(|pc| pc == c))
            })
            .collect())
    }

    /// Returns true if the user administers the page.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile cannot be fetched.
    pub async fn is_admin_of_page(&self, page_id: &str) -> Result<bool, Report<ProviderError>> {
        let Some(user) = self.user(false).await? else {
            return Ok(false);
        };
        Ok(user
            .page_memberships
            .iter()
            .any(|m| m.is_admin() && m.page.id == page_id))
    }
}
