//! Contract for the UiTID identity API and the data it returns.
//!
//! Every signed call takes the token pair it must be signed with, so a single
//! client instance can serve concurrent handshakes for different sessions.

use async_trait::async_trait;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ProviderError;
use crate::token::RequestToken;

/// A long-lived OAuth 1.0a access token issued for a UiTID user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    token: String,
    secret: String,
    user_id: String,
}

impl AccessToken {
    /// Creates an access token.
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        secret: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
            user_id: user_id.into(),
        }
    }

    /// Returns the token value.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the token secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Returns the UiTID user the token was issued for.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Role of a user within a UiTID page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MembershipRole {
    Member,
    Admin,
}

/// A UiTID page (organisation profile).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Membership of a user in a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMembership {
    pub role: MembershipRole,
    pub page: Page,
}

impl PageMembership {
    /// Returns true if the membership grants page administration.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == MembershipRole::Admin
    }
}

/// Profile of a UiTID user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalUser {
    pub id: String,
    #[serde(default)]
    pub nick: String,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub page_memberships: Vec<PageMembership>,
}

impl ExternalUser {
    /// Returns the name to show for this user.
    ///
    /// Uses the given and family name when a given name is present, and
    /// falls back to the nickname otherwise.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.given_name.as_deref() {
            Some(given) if !given.is_empty() => {
                let family = self.family_name.as_deref().unwrap_or_default();
                format!("{given} {family}")
            }
            _ => self.nick.clone(),
        }
    }
}

/// Kind of authorization screen the provider should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorizeMode {
    /// Regular login screen.
    #[default]
    Regular,
    /// Registration screen for new UiTID users.
    Register,
}

/// Parameters of the browser redirect to the provider's authorize page.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub token: String,
    pub callback_url: String,
    pub mode: AuthorizeMode,
    pub skip_confirmation: bool,
    pub locale: String,
}

/// Builds the provider's authorize URL under the given API endpoint.
///
/// # Errors
///
/// Returns an error if the endpoint cannot be joined with the authorize path.
pub fn build_authorize_url(
    endpoint: &Url,
    request: &AuthorizeRequest,
) -> Result<Url, url::ParseError> {
    let mut url = endpoint.join("auth/authorize")?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("oauth_token", &request.token);
        if !request.callback_url.is_empty() {
            query.append_pair("oauth_callback", &request.callback_url);
        }
        if request.skip_confirmation {
            query.append_pair("skipConfirmation", "true");
        }
        if request.mode == AuthorizeMode::Register {
            query.append_pair("type", "register");
        }
        if !request.locale.is_empty() {
            query.append_pair("lang", &request.locale);
        }
    }
    Ok(url)
}

/// Client for the UiTID identity API.
#[async_trait]
pub trait ExternalIdentityClient: Send + Sync {
    /// Fetches a fresh request token for the given callback URL.
    async fn request_token(&self, callback_url: &str)
    -> Result<RequestToken, Report<ProviderError>>;

    /// Returns the URL to send the user's browser to for authorization.
    fn authorize_url(&self, request: &AuthorizeRequest) -> Result<String, Report<ProviderError>>;

    /// Exchanges the verifier for an access token, signing with the request token.
    async fn access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
    ) -> Result<AccessToken, Report<ProviderError>>;

    /// Fetches a user profile, signing with the given access token.
    async fn fetch_user(
        &self,
        access_token: &AccessToken,
        user_id: &str,
    ) -> Result<ExternalUser, Report<ProviderError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Url {
        Url::parse("https://acc.uitid.be/uitid/rest/").expect("valid url")
    }

    #[test]
    fn access_token_debug_hides_credentials() {
        let token = AccessToken::new("acc-token-7", "acc-secret-7", "uitid-42");
        let debug = format!("{token:?}");
        assert!(debug.contains("uitid-42"));
        assert!(!debug.contains("acc-token-7"));
        assert!(!debug.contains("acc-secret-7"));
    }

    fn request() -> AuthorizeRequest {
        AuthorizeRequest {
            token: "req-token".to_string(),
            callback_url: "https://app.example/uitid/authorize?destination=%2Fevents".to_string(),
            mode: AuthorizeMode::Regular,
            skip_confirmation: false,
            locale: "nl".to_string(),
        }
    }

    #[test]
    fn authorize_url_carries_token_callback_and_locale() {
        let url = build_authorize_url(&endpoint(), &request()).expect("url");
        assert_eq!(url.path(), "/uitid/rest/auth/authorize");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("oauth_token".to_string(), "req-token".to_string()),
                (
                    "oauth_callback".to_string(),
                    "https://app.example/uitid/authorize?destination=%2Fevents".to_string()
                ),
                ("lang".to_string(), "nl".to_string()),
            ]
        );
    }

    #[test]
    fn authorize_url_skip_confirmation_and_register() {
        let mut req = request();
        req.skip_confirmation = true;
        req.mode = AuthorizeMode::Register;
        let url = build_authorize_url(&endpoint(), &req).expect("url");
        let query = url.query().unwrap_or_default().to_string();

        assert!(query.contains("skipConfirmation=true"));
        assert!(query.contains("type=register"));
    }

    #[test]
    fn display_name_prefers_full_name() {
        let user = ExternalUser {
            id: "u1".to_string(),
            nick: "jdoe".to_string(),
            given_name: Some("Jane".to_string()),
            family_name: Some("Doe".to_string()),
            page_memberships: Vec::new(),
        };
        assert_eq!(user.display_name(), "Jane Doe");
    }

    #[test]
    fn display_name_falls_back_to_nick() {
        let user = ExternalUser {
            id: "u1".to_string(),
            nick: "jdoe".to_string(),
            given_name: Some(String::new()),
            family_name: Some("Doe".to_string()),
            page_memberships: Vec::new(),
        };
        assert_eq!(user.display_name(), "jdoe");
    }

    #[test]
    fn external_user_deserializes_from_provider_json() {
        let json = r#"{
            "id": "abc",
            "nick": "culture-fan",
            "givenName": "Ann",
            "pageMemberships": [
                {"role": "ADMIN", "page": {"id": "p1", "name": "Museum", "categories": ["museum"]}},
                {"role": "MEMBER", "page": {"id": "p2"}}
            ]
        }"#;
        let user: ExternalUser = serde_json::from_str(json).expect("deserialize");

        assert_eq!(user.id, "abc");
        assert_eq!(user.family_name, None);
        assert_eq!(user.page_memberships.len(), 2);
        assert!(user.page_memberships[0].is_admin());
        assert!(!user.page_memberships[1].is_admin());
        assert!(user.page_memberships[1].page.categories.is_empty());
    }
}
