//! The three-phase OAuth 1.0a handshake that links a session to UiTID.
//!
//! [`HandshakeFlow::initiate`] fetches a request token, parks it in the
//! [`TokenStore`] and hands back the provider's authorize URL.
//! [`HandshakeFlow::finalize`] consumes the provider callback: it exchanges the
//! verifier for an access token, resolves the local account and writes the
//! [`IdentityBinding`].
//!
//! Failures never surface provider details to the user. Callers show
//! [`GENERIC_LOGIN_ERROR`] and redirect home.

use std::fmt;
use std::sync::Arc;

use rootcause::Report;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::account::{AccountSeed, LocalAccount, LocalAccountService, UITID_PROVIDER_KEY};
use crate::binding::{IdentityBinding, SessionBindingStore};
use crate::error::HandshakeError;
use crate::provider::{AuthorizeMode, AuthorizeRequest, ExternalIdentityClient};
use crate::session::SessionId;
use crate::token::{RequestToken, TokenStore};

/// Message shown to the user when a handshake fails.
pub const GENERIC_LOGIN_ERROR: &str = "An error occurred while logging in. Please try again later.";

/// Path of the provider callback endpoint.
pub const CALLBACK_PATH: &str = "/uitid/authorize";

/// Path the user is sent to after failures or when no destination is given.
pub const HOME_PATH: &str = "/";

/// Query parameter carrying the post-login destination.
pub const DESTINATION_PARAM: &str = "destination";

/// States of a single handshake attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    RequestTokenPending,
    AwaitingProviderRedirect,
    Finalizing,
    Bound,
    Failed,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::RequestTokenPending => "request_token_pending",
            Self::AwaitingProviderRedirect => "awaiting_provider_redirect",
            Self::Finalizing => "finalizing",
            Self::Bound => "bound",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

fn transition(session: &SessionId, from: HandshakeState, to: HandshakeState) {
    debug!(session = %session, %from, %to, "handshake transition");
}

/// Settings for the handshake flow.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Public base URL of this application, used to build absolute callback
    /// and destination URLs.
    pub base_url: Url,
    /// Provider key local accounts are mapped under.
    pub provider_key: String,
}

impl HandshakeConfig {
    /// Creates a configuration with the UiTID provider key.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            provider_key: UITID_PROVIDER_KEY.to_string(),
        }
    }

    /// Builds the absolute callback URL, carrying the destination if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot be joined with the callback path.
    pub fn callback_url(&self, destination: Option<&str>) -> Result<Url, url::ParseError> {
        let mut url = self.base_url.join(CALLBACK_PATH)?;
        if let Some(destination) = destination.filter(|d| !d.is_empty()) {
            url.query_pairs_mut()
                .append_pair(DESTINATION_PARAM, destination);
        }
        Ok(url)
    }

    /// Resolves a destination against the base URL.
    ///
    /// Destinations on the base URL's origin resolve. Other http(s) origins,
    /// scheme-relative ones included, send the user home. Anything that is
    /// not an http(s) URL is passed through untouched.
    #[must_use]
    pub fn resolve_destination(&self, destination: &str) -> RedirectTarget {
        match self.base_url.join(destination) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                if url.origin() == self.base_url.origin() {
                    RedirectTarget::Resolved(url.to_string())
                } else {
                    warn!(destination, "off-site destination replaced by home");
                    RedirectTarget::Home
                }
            }
            Ok(_) | Err(_) => {
                warn!(destination, "destination could not be resolved");
                RedirectTarget::Raw(destination.to_string())
            }
        }
    }
}

/// Parameters of a handshake initiation.
#[derive(Debug, Clone, Default)]
pub struct InitiateRequest {
    pub destination: Option<String>,
    pub skip_confirmation: bool,
    /// Opens the provider's registration form instead of its login form.
    pub register: bool,
    pub locale: String,
}

/// Query parameters of the provider callback.
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    pub oauth_token: Option<String>,
    pub oauth_verifier: Option<String>,
    pub destination: Option<String>,
}

/// A failed handshake: the logged cause plus where to send the user.
#[derive(Debug)]
pub struct HandshakeFailure {
    pub error: Report<HandshakeError>,
    pub redirect_to: &'static str,
}

impl HandshakeFailure {
    fn new(error: impl Into<Report<HandshakeError>>) -> Self {
        Self {
            error: error.into(),
            redirect_to: HOME_PATH,
        }
    }

    /// Returns the message to show the user.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        GENERIC_LOGIN_ERROR
    }
}

/// Result of [`HandshakeFlow::initiate`].
#[derive(Debug)]
pub enum InitiateOutcome {
    /// The browser should be sent to the provider.
    AwaitingProviderRedirect { authorize_url: String },
    Failed(HandshakeFailure),
}

/// Where to send the user after a bound handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    /// Destination resolved to an absolute URL.
    Resolved(String),
    /// Destination that could not be resolved, used verbatim.
    Raw(String),
    /// No destination was given.
    Home,
}

impl RedirectTarget {
    /// Returns the location to redirect to.
    #[must_use]
    pub fn location(&self) -> &str {
        match self {
            Self::Resolved(url) | Self::Raw(url) => url,
            Self::Home => HOME_PATH,
        }
    }
}

/// Why a callback produced no redirect and no binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InertReason {
    /// `oauth_token` or `oauth_verifier` was missing.
    IncompleteCallback,
    /// The account service declined to log the user in.
    LocalAccountRejected,
}

/// Result of [`HandshakeFlow::finalize`].
#[derive(Debug)]
pub enum FinalizeOutcome {
    Bound {
        account: LocalAccount,
        redirect: RedirectTarget,
    },
    Failed(HandshakeFailure),
    Inert(InertReason),
}

/// Orchestrates the handshake against its collaborators.
#[derive(Clone)]
pub struct HandshakeFlow {
    client: Arc<dyn ExternalIdentityClient>,
    accounts: Arc<dyn LocalAccountService>,
    tokens: Arc<dyn TokenStore>,
    bindings: Arc<dyn SessionBindingStore>,
    config: HandshakeConfig,
}

impl HandshakeFlow {
    /// Creates a flow from its collaborators.
    #[must_use]
    pub fn new(
        client: Arc<dyn ExternalIdentityClient>,
        accounts: Arc<dyn LocalAccountService>,
        tokens: Arc<dyn TokenStore>,
        bindings: Arc<dyn SessionBindingStore>,
        config: HandshakeConfig,
    ) -> Self {
        Self {
            client,
            accounts,
            tokens,
            bindings,
            config,
        }
    }

    /// Returns the flow configuration.
    #[must_use]
    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// Starts a handshake for the session.
    #[instrument(skip_all, fields(session = %session))]
    pub async fn initiate(&self, session: &SessionId, request: InitiateRequest) -> InitiateOutcome {
        transition(session, HandshakeState::Idle, HandshakeState::RequestTokenPending);
        match self.try_initiate(session, &request).await {
            Ok(authorize_url) => {
                transition(
                    session,
                    HandshakeState::RequestTokenPending,
                    HandshakeState::AwaitingProviderRedirect,
                );
                InitiateOutcome::AwaitingProviderRedirect { authorize_url }
            }
            Err(err) => {
                error!(error = %err, "handshake initiation failed");
                transition(
                    session,
                    HandshakeState::RequestTokenPending,
                    HandshakeState::Failed,
                );
                InitiateOutcome::Failed(HandshakeFailure::new(err))
            }
        }
    }

    async fn try_initiate(
        &self,
        session: &SessionId,
        request: &InitiateRequest,
    ) -> Result<String, HandshakeError> {
        let callback_url = self
            .config
            .callback_url(request.destination.as_deref())
            .map_err(|e| {
                error!(error = %e, "invalid callback url");
                HandshakeError::RequestTokenFailed
            })?;

        let token = self
            .client
            .request_token(callback_url.as_str())
            .await
            .map_err(|e| {
                error!(error = %e, "request token call failed");
                HandshakeError::RequestTokenFailed
            })?;
        if token.is_empty() {
            return Err(HandshakeError::EmptyRequestToken);
        }

        let authorize_url = self
            .client
            .authorize_url(&AuthorizeRequest {
                token: token.token().to_string(),
                callback_url: callback_url.to_string(),
                mode: if request.register {
                    AuthorizeMode::Register
                } else {
                    AuthorizeMode::Regular
                },
                skip_confirmation: request.skip_confirmation,
                locale: request.locale.clone(),
            })
            .map_err(|e| {
                error!(error = %e, "authorize url could not be built");
                HandshakeError::RequestTokenFailed
            })?;

        self.tokens
            .store_request_token(session, &token)
            .await
            .map_err(|e| {
                error!(error = %e, "request token could not be stored");
                HandshakeError::TokenStoreFailed
            })?;

        Ok(authorize_url)
    }

    /// Completes a handshake from the provider callback.
    #[instrument(skip_all, fields(session = %session))]
    pub async fn finalize(&self, session: &SessionId, params: CallbackParams) -> FinalizeOutcome {
        let (Some(oauth_token), Some(oauth_verifier)) = (
            params.oauth_token.filter(|t| !t.is_empty()),
            params.oauth_verifier.filter(|v| !v.is_empty()),
        ) else {
            info!("callback without oauth_token or oauth_verifier ignored");
            return FinalizeOutcome::Inert(InertReason::IncompleteCallback);
        };

        transition(
            session,
            HandshakeState::AwaitingProviderRedirect,
            HandshakeState::Finalizing,
        );

        let stored = match self.tokens.request_token(session).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                return self.fail(
                    session,
                    HandshakeError::MissingRequestToken {
                        session_id: session.to_string(),
                    },
                );
            }
            Err(e) => {
                error!(error = %e, "request token could not be read");
                return self.fail(
                    session,
                    HandshakeError::MissingRequestToken {
                        session_id: session.to_string(),
                    },
                );
            }
        };

        let request_token = RequestToken::new(oauth_token, stored.secret());
        let exchanged = self
            .client
            .access_token(&request_token, &oauth_verifier)
            .await;

        if let Err(e) = self.tokens.clear_request_token(session).await {
            warn!(error = %e, "request token could not be cleared");
        }

        let access_token = match exchanged {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, "access token exchange failed");
                return self.fail(session, HandshakeError::AccessTokenFailed);
            }
        };

        let user = match self
            .client
            .fetch_user(&access_token, access_token.user_id())
            .await
        {
            Ok(user) => user,
            Err(e) => {
                error!(error = %e, "external user profile fetch failed");
                return self.fail(
                    session,
                    HandshakeError::ProfileFailed {
                        user_id: access_token.user_id().to_string(),
                    },
                );
            }
        };

        let seed = AccountSeed {
            name: user.nick.clone(),
        };
        let account = match self
            .accounts
            .login_or_register(session, &user.id, &self.config.provider_key, &seed)
            .await
        {
            Ok(Some(account)) => account,
            Ok(None) => {
                warn!(external_user = %user.id, "local account rejected login");
                return FinalizeOutcome::Inert(InertReason::LocalAccountRejected);
            }
            Err(e) => {
                error!(error = %e, external_user = %user.id, "local account login failed");
                return FinalizeOutcome::Inert(InertReason::LocalAccountRejected);
            }
        };

        let binding = IdentityBinding::from_access_token(&access_token);
        if let Err(e) = self.bindings.set_binding(session, &binding).await {
            error!(error = %e, "identity binding could not be written");
            return self.fail(session, HandshakeError::BindingFailed);
        }

        transition(session, HandshakeState::Finalizing, HandshakeState::Bound);
        info!(account = %account.id(), external_user = %user.id, "session linked to uitid");

        let redirect = match params.destination.as_deref().filter(|d| !d.is_empty()) {
            Some(destination) => self.config.resolve_destination(destination),
            None => RedirectTarget::Home,
        };

        FinalizeOutcome::Bound { account, redirect }
    }

    fn fail(&self, session: &SessionId, err: HandshakeError) -> FinalizeOutcome {
        error!(error = %err, "handshake finalization failed");
        transition(session, HandshakeState::Finalizing, HandshakeState::Failed);
        FinalizeOutcome::Failed(HandshakeFailure::new(err))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::binding::is_linked;
    use crate::error::{ProviderError, StoreError};
    use crate::memory::MemoryStore;
    use crate::provider::{AccessToken, ExternalUser, build_authorize_url};
    use crate::session::{Session, SessionStore};

    /// Scripted provider client recording the credentials it was called with.
    struct FakeClient {
        request_tokens: Mutex<Vec<RequestToken>>,
        fail_request_token: bool,
        fail_access_token: bool,
        exchanged_with: Mutex<Option<(RequestToken, String)>>,
        user: ExternalUser,
    }

    impl FakeClient {
        fn new() -> Self {
            Self {
                request_tokens: Mutex::new(vec![RequestToken::new("req-1", "req-secret-1")]),
                fail_request_token: false,
                fail_access_token: false,
                exchanged_with: Mutex::new(None),
                user: ExternalUser {
                    id: "uitid-42".to_string(),
                    nick: "culture-fan".to_string(),
                    given_name: None,
                    family_name: None,
                    page_memberships: Vec::new(),
                },
            }
        }
    }

    fn provider_failure(operation: &str) -> Report<ProviderError> {
        ProviderError::UnexpectedStatus {
            operation: operation.to_string(),
            status: 500,
        }
        .into()
    }

    #[async_trait]
    impl ExternalIdentityClient for FakeClient {
        async fn request_token(
            &self,
            _callback_url: &str,
        ) -> Result<RequestToken, Report<ProviderError>> {
            if self.fail_request_token {
                return Err(provider_failure("requestToken"));
            }
            let mut tokens = self.request_tokens.lock().expect("lock");
            if tokens.len() > 1 {
                Ok(tokens.remove(0))
            } else {
                Ok(tokens[0].clone())
            }
        }

        fn authorize_url(
            &self,
            request: &AuthorizeRequest,
        ) -> Result<String, Report<ProviderError>> {
            let endpoint = Url::parse("https://uitid.example/rest/").expect("url");
            Ok(build_authorize_url(&endpoint, request)
                .expect("authorize url")
                .to_string())
        }

        async fn access_token(
            &self,
            request_token: &RequestToken,
            verifier: &str,
        ) -> Result<AccessToken, Report<ProviderError>> {
            *self.exchanged_with.lock().expect("lock") =
                Some((request_token.clone(), verifier.to_string()));
            if self.fail_access_token {
                return Err(provider_failure("accessToken"));
            }
            Ok(AccessToken::new("acc-token", "acc-secret", &self.user.id))
        }

        async fn fetch_user(
            &self,
            _access_token: &AccessToken,
            _user_id: &str,
        ) -> Result<ExternalUser, Report<ProviderError>> {
            Ok(self.user.clone())
        }
    }

    /// Token store wrapper counting clears.
    struct CountingTokens {
        inner: Arc<MemoryStore>,
        clears: AtomicUsize,
    }

    #[async_trait]
    impl TokenStore for CountingTokens {
        async fn request_token(
            &self,
            session: &SessionId,
        ) -> Result<Option<RequestToken>, Report<StoreError>> {
            self.inner.request_token(session).await
        }

        async fn store_request_token(
            &self,
            session: &SessionId,
            token: &RequestToken,
        ) -> Result<(), Report<StoreError>> {
            self.inner.store_request_token(session, token).await
        }

        async fn clear_request_token(
            &self,
            session: &SessionId,
        ) -> Result<(), Report<StoreError>> {
            self.clears.fetch_add(1, Ordering::SeqCst);
            self.inner.clear_request_token(session).await
        }
    }

    struct Harness {
        flow: HandshakeFlow,
        store: Arc<MemoryStore>,
        tokens: Arc<CountingTokens>,
        client: Arc<FakeClient>,
        session: SessionId,
    }

    async fn harness(client: FakeClient) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let session = SessionId::generate();
        store
            .create(&Session::new(session.clone(), chrono::Duration::hours(1)))
            .await
            .expect("create session");
        let tokens = Arc::new(CountingTokens {
            inner: store.clone(),
            clears: AtomicUsize::new(0),
        });
        let client = Arc::new(client);
        let config = HandshakeConfig::new(Url::parse("https://app.example/").expect("url"));
        let flow = HandshakeFlow::new(
            client.clone(),
            store.clone(),
            tokens.clone(),
            store.clone(),
            config,
        );
        Harness {
            flow,
            store,
            tokens,
            client,
            session,
        }
    }

    fn callback(token: &str, verifier: &str, destination: Option<&str>) -> CallbackParams {
        CallbackParams {
            oauth_token: Some(token.to_string()),
            oauth_verifier: Some(verifier.to_string()),
            destination: destination.map(str::to_string),
        }
    }

    #[test]
    fn callback_url_carries_destination() {
        let config = HandshakeConfig::new(Url::parse("https://app.example/").expect("url"));
        let url = config.callback_url(Some("/events?x=1")).expect("url");
        assert_eq!(
            url.as_str(),
            "https://app.example/uitid/authorize?destination=%2Fevents%3Fx%3D1"
        );
        let url = config.callback_url(None).expect("url");
        assert_eq!(url.as_str(), "https://app.example/uitid/authorize");
    }

    #[test]
    fn destination_resolution() {
        let config = HandshakeConfig::new(Url::parse("https://app.example/").expect("url"));
        assert_eq!(
            config.resolve_destination("/events"),
            RedirectTarget::Resolved("https://app.example/events".to_string())
        );
        assert_eq!(
            config.resolve_destination("mailto:someone@example.org"),
            RedirectTarget::Raw("mailto:someone@example.org".to_string())
        );
        assert_eq!(
            config.resolve_destination("http://[::1"),
            RedirectTarget::Raw("http://[::1".to_string())
        );
        assert_eq!(
            config.resolve_destination("https://app.example/agenda?x=1"),
            RedirectTarget::Resolved("https://app.example/agenda?x=1".to_string())
        );
    }

    #[test]
    fn off_site_destinations_go_home() {
        let config = HandshakeConfig::new(Url::parse("https://app.example/").expect("url"));
        assert_eq!(
            config.resolve_destination("https://evil.example/phish"),
            RedirectTarget::Home
        );
        assert_eq!(
            config.resolve_destination("//evil.example/phish"),
            RedirectTarget::Home
        );
        assert_eq!(
            config.resolve_destination("http://app.example/events"),
            RedirectTarget::Home
        );
    }

    #[tokio::test]
    async fn initiate_stores_token_and_returns_authorize_url() {
        let h = harness(FakeClient::new()).await;
        let outcome = h
            .flow
            .initiate(
                &h.session,
                InitiateRequest {
                    destination: Some("/events".to_string()),
                    skip_confirmation: true,
                    register: false,
                    locale: "nl".to_string(),
                },
            )
            .await;

        let InitiateOutcome::AwaitingProviderRedirect { authorize_url } = outcome else {
            panic!("expected redirect");
        };
        let url = Url::parse(&authorize_url).expect("url");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("oauth_token".to_string(), "req-1".to_string())));
        assert!(pairs.contains(&("skipConfirmation".to_string(), "true".to_string())));
        assert!(pairs.contains(&("lang".to_string(), "nl".to_string())));
        assert!(pairs.contains(&(
            "oauth_callback".to_string(),
            "https://app.example/uitid/authorize?destination=%2Fevents".to_string()
        )));

        assert!(!pairs.iter().any(|(k, _)| k == "type"));

        let stored = h.store.request_token(&h.session).await.expect("read");
        assert_eq!(stored, Some(RequestToken::new("req-1", "req-secret-1")));
    }

    #[tokio::test]
    async fn initiate_register_opens_registration_form() {
        let h = harness(FakeClient::new()).await;
        let outcome = h
            .flow
            .initiate(
                &h.session,
                InitiateRequest {
                    register: true,
                    locale: "nl".to_string(),
                    ..InitiateRequest::default()
                },
            )
            .await;

        let InitiateOutcome::AwaitingProviderRedirect { authorize_url } = outcome else {
            panic!("expected redirect");
        };
        let url = Url::parse(&authorize_url).expect("url");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("type".to_string(), "register".to_string())));
    }

    #[tokio::test]
    async fn initiate_failure_leaves_token_store_untouched() {
        let mut client = FakeClient::new();
        client.fail_request_token = true;
        let h = harness(client).await;

        let outcome = h
            .flow
            .initiate(&h.session, InitiateRequest::default())
            .await;

        let InitiateOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.redirect_to, HOME_PATH);
        assert_eq!(failure.user_message(), GENERIC_LOGIN_ERROR);
        assert!(
            h.store
                .request_token(&h.session)
                .await
                .expect("read")
                .is_none()
        );
    }

    #[tokio::test]
    async fn empty_request_token_fails() {
        let client = FakeClient::new();
        *client.request_tokens.lock().expect("lock") = vec![RequestToken::new("", "s")];
        let h = harness(client).await;

        let outcome = h
            .flow
            .initiate(&h.session, InitiateRequest::default())
            .await;

        assert!(matches!(outcome, InitiateOutcome::Failed(_)));
        assert!(
            h.store
                .request_token(&h.session)
                .await
                .expect("read")
                .is_none()
        );
    }

    #[tokio::test]
    async fn second_initiate_replaces_token() {
        let client = FakeClient::new();
        *client.request_tokens.lock().expect("lock") = vec![
            RequestToken::new("first", "first-secret"),
            RequestToken::new("second", "second-secret"),
        ];
        let h = harness(client).await;

        h.flow
            .initiate(&h.session, InitiateRequest::default())
            .await;
        h.flow
            .initiate(&h.session, InitiateRequest::default())
            .await;

        let stored = h.store.request_token(&h.session).await.expect("read");
        assert_eq!(stored, Some(RequestToken::new("second", "second-secret")));
    }

    #[tokio::test]
    async fn finalize_binds_session_and_clears_token() {
        let h = harness(FakeClient::new()).await;
        h.flow
            .initiate(&h.session, InitiateRequest::default())
            .await;

        let outcome = h
            .flow
            .finalize(&h.session, callback("req-1", "verifier", Some("/events")))
            .await;

        let FinalizeOutcome::Bound { account, redirect } = outcome else {
            panic!("expected bound");
        };
        assert_eq!(account.name(), "culture-fan");
        assert_eq!(
            redirect,
            RedirectTarget::Resolved("https://app.example/events".to_string())
        );

        let (signed_with, verifier) = h
            .client
            .exchanged_with
            .lock()
            .expect("lock")
            .clone()
            .expect("exchanged");
        assert_eq!(signed_with, RequestToken::new("req-1", "req-secret-1"));
        assert_eq!(verifier, "verifier");

        let binding = h.store.binding(&h.session).await.expect("read");
        assert!(is_linked(binding.as_ref()));
        assert_eq!(
            binding,
            Some(IdentityBinding::new("uitid-42", "acc-token", "acc-secret"))
        );
        assert_eq!(h.tokens.clears.load(Ordering::SeqCst), 1);
        assert!(
            h.store
                .request_token(&h.session)
                .await
                .expect("read")
                .is_none()
        );

        let session = h.store.find(&h.session).await.expect("find").expect("exists");
        assert_eq!(session.account_id(), Some(account.id()));
    }

    #[tokio::test]
    async fn finalize_without_destination_goes_home() {
        let h = harness(FakeClient::new()).await;
        h.flow
            .initiate(&h.session, InitiateRequest::default())
            .await;

        let outcome = h
            .flow
            .finalize(&h.session, callback("req-1", "v", None))
            .await;

        let FinalizeOutcome::Bound { redirect, .. } = outcome else {
            panic!("expected bound");
        };
        assert_eq!(redirect, RedirectTarget::Home);
        assert_eq!(redirect.location(), "/");
    }

    #[tokio::test]
    async fn incomplete_callback_is_inert() {
        let h = harness(FakeClient::new()).await;
        h.flow
            .initiate(&h.session, InitiateRequest::default())
            .await;

        let outcome = h
            .flow
            .finalize(
                &h.session,
                CallbackParams {
                    oauth_token: Some("req-1".to_string()),
                    oauth_verifier: None,
                    destination: None,
                },
            )
            .await;

        assert!(matches!(
            outcome,
            FinalizeOutcome::Inert(InertReason::IncompleteCallback)
        ));
        assert_eq!(h.tokens.clears.load(Ordering::SeqCst), 0);
        assert!(h.client.exchanged_with.lock().expect("lock").is_none());
    }

    #[tokio::test]
    async fn finalize_without_stored_token_fails() {
        let h = harness(FakeClient::new()).await;

        let outcome = h
            .flow
            .finalize(&h.session, callback("req-1", "v", None))
            .await;

        let FinalizeOutcome::Failed(failure) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.redirect_to, HOME_PATH);
        assert!(h.client.exchanged_with.lock().expect("lock").is_none());
    }

    #[tokio::test]
    async fn failed_exchange_still_clears_token_once() {
        let mut client = FakeClient::new();
        client.fail_access_token = true;
        let h = harness(client).await;
        h.flow
            .initiate(&h.session, InitiateRequest::default())
            .await;

        let outcome = h
            .flow
            .finalize(&h.session, callback("req-1", "v", None))
            .await;

        assert!(matches!(outcome, FinalizeOutcome::Failed(_)));
        assert_eq!(h.tokens.clears.load(Ordering::SeqCst), 1);
        assert!(h.store.binding(&h.session).await.expect("read").is_none());
    }

    #[tokio::test]
    async fn blocked_account_is_inert_and_unbound() {
        let h = harness(FakeClient::new()).await;
        let blocked = h
            .store
            .register_account(UITID_PROVIDER_KEY, "uitid-42", "culture-fan");
        h.store.block_account(blocked.id());
        h.flow
            .initiate(&h.session, InitiateRequest::default())
            .await;

        let outcome = h
            .flow
            .finalize(&h.session, callback("req-1", "v", None))
            .await;

        assert!(matches!(
            outcome,
            FinalizeOutcome::Inert(InertReason::LocalAccountRejected)
        ));
        assert_eq!(h.tokens.clears.load(Ordering::SeqCst), 1);
        assert!(h.store.binding(&h.session).await.expect("read").is_none());
    }
}
