//! UiTID REST client signing every call with OAuth 1.0a.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use rootcause::Report;
use tracing::{debug, instrument};
use uitid_connect_identity::{
    AccessToken, AuthorizeRequest, ExternalIdentityClient, ExternalUser, ProviderConfig,
    ProviderError, RequestToken, build_authorize_url,
};
use url::{Url, form_urlencoded};

use super::oauth1::{Credentials, SignedRequest};

/// Client for the UiTID identity API.
pub struct UitidClient {
    http: reqwest::Client,
    endpoint: Url,
    consumer_key: String,
    consumer_secret: String,
}

impl UitidClient {
    /// Creates a client from the provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self, Report<ProviderError>> {
        let endpoint = Url::parse(&config.endpoint()).map_err(|e| ProviderError::RequestFailed {
            operation: "configure".to_string(),
            details: format!("invalid endpoint: {e}"),
        })?;

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(config.request_timeout_seconds()))
            .build()
            .map_err(|e| ProviderError::RequestFailed {
                operation: "configure".to_string(),
                details: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            endpoint,
            consumer_key: config.consumer_key().to_string(),
            consumer_secret: config.consumer_secret().to_string(),
        })
    }

    fn url(&self, operation: &str, path: &str) -> Result<Url, Report<ProviderError>> {
        self.endpoint
            .join(path)
            .map_err(|e| {
                ProviderError::RequestFailed {
                    operation: operation.to_string(),
                    details: format!("invalid url: {e}"),
                }
                .into()
            })
    }

    /// Sends a signed request and returns the response body.
    async fn send(
        &self,
        operation: &str,
        method: Method,
        url: Url,
        token: Option<(&str, &str)>,
        extra_oauth: &[(&str, &str)],
    ) -> Result<String, Report<ProviderError>> {
        let (token, token_secret) = match token {
            Some((token, secret)) => (Some(token), secret),
            None => (None, ""),
        };
        let signed = SignedRequest::new(
            method.as_str(),
            &url,
            Credentials {
                consumer_key: &self.consumer_key,
                consumer_secret: &self.consumer_secret,
                token,
                token_secret,
            },
            extra_oauth,
            &[],
            &ulid::Ulid::new().to_string(),
            Utc::now().timestamp(),
        );

        let response = self
            .http
            .request(method, url)
            .header(
                reqwest::header::AUTHORIZATION,
                signed.authorization_header(),
            )
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed {
                operation: operation.to_string(),
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::UnexpectedStatus {
                operation: operation.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        response.text().await.map_err(|e| {
            ProviderError::InvalidResponse {
                operation: operation.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// Parses a form-encoded token response.
fn parse_token_response(
    operation: &str,
    body: &str,
) -> Result<(String, String, Option<String>), Report<ProviderError>> {
    let mut token = None;
    let mut secret = None;
    let mut user_id = None;
    for (key, value) in form_urlencoded::parse(body.as_bytes()) {
        match key.as_ref() {
            "oauth_token" => token = Some(value.into_owned()),
            "oauth_token_secret" => secret = Some(value.into_owned()),
            "userId" => user_id = Some(value.into_owned()),
            _ => {}
        }
    }
    match (token, secret) {
        (Some(token), Some(secret)) => Ok((token, secret, user_id)),
        _ => Err(ProviderError::InvalidResponse {
            operation: operation.to_string(),
            reason: "missing oauth_token or oauth_token_secret".to_string(),
        }
        .into()),
    }
}

#[async_trait]
impl ExternalIdentityClient for UitidClient {
    #[instrument(skip(self))]
    async fn request_token(
        &self,
        callback_url: &str,
    ) -> Result<RequestToken, Report<ProviderError>> {
        const OPERATION: &str = "requestToken";
        let url = self.url(OPERATION, "requestToken")?;
        let body = self
            .send(
                OPERATION,
                Method::POST,
                url,
                None,
                &[("oauth_callback", callback_url)],
            )
            .await?;
        let (token, secret, _) = parse_token_response(OPERATION, &body)?;
        debug!("received request token");
        Ok(RequestToken::new(token, secret))
    }

    fn authorize_url(&self, request: &AuthorizeRequest) -> Result<String, Report<ProviderError>> {
        build_authorize_url(&self.endpoint, request)
            .map(|url| url.to_string())
            .map_err(|e| {
                ProviderError::RequestFailed {
                    operation: "authorize".to_string(),
                    details: e.to_string(),
                }
                .into()
            })
    }

    #[instrument(skip_all)]
    async fn access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
    ) -> Result<AccessToken, Report<ProviderError>> {
        const OPERATION: &str = "accessToken";
        let url = self.url(OPERATION, "accessToken")?;
        let body = self
            .send(
                OPERATION,
                Method::POST,
                url,
                Some((request_token.token(), request_token.secret())),
                &[("oauth_verifier", verifier)],
            )
            .await?;
        let (token, secret, user_id) = parse_token_response(OPERATION, &body)?;
        let user_id = user_id.filter(|id| !id.is_empty()).ok_or_else(|| {
            Report::from(ProviderError::InvalidResponse {
                operation: OPERATION.to_string(),
                reason: "missing userId".to_string(),
            })
        })?;
        debug!(user_id, "received access token");
        Ok(AccessToken::new(token, secret, user_id))
    }

    #[instrument(skip(self, access_token))]
    async fn fetch_user(
        &self,
        access_token: &AccessToken,
        user_id: &str,
    ) -> Result<ExternalUser, Report<ProviderError>> {
        const OPERATION: &str = "user";
        let mut url = self.url(OPERATION, &format!("user/{}", urlencoding::encode(user_id)))?;
        url.query_pairs_mut().append_pair("private", "true");
        let body = self
            .send(
                OPERATION,
                Method::GET,
                url,
                Some((access_token.token(), access_token.secret())),
                &[],
            )
            .await?;
        serde_json::from_str(&body).map_err(|e| {
            ProviderError::InvalidResponse {
                operation: OPERATION.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use uitid_connect_identity::AuthorizeMode;

    use super::*;

    fn client() -> UitidClient {
        UitidClient::new(&ProviderConfig::new(
            "https://acc.uitid.be/uitid/rest".to_string(),
            "key".to_string(),
            "secret".to_string(),
        ))
        .expect("client")
    }

    #[test]
    fn endpoint_paths_resolve_under_rest_root() {
        let client = client();
        assert_eq!(
            client.url("t", "requestToken").expect("url").as_str(),
            "https://acc.uitid.be/uitid/rest/requestToken"
        );
        assert_eq!(
            client.url("t", "user/42").expect("url").as_str(),
            "https://acc.uitid.be/uitid/rest/user/42"
        );
    }

    #[test]
    fn authorize_url_uses_endpoint() {
        let url = client()
            .authorize_url(&AuthorizeRequest {
                token: "tok".to_string(),
                callback_url: "https://app.example/uitid/authorize".to_string(),
                mode: AuthorizeMode::Regular,
                skip_confirmation: true,
                locale: "fr".to_string(),
            })
            .expect("url");
        assert!(url.starts_with("https://acc.uitid.be/uitid/rest/auth/authorize?oauth_token=tok"));
        assert!(url.contains("skipConfirmation=true"));
        assert!(url.contains("lang=fr"));
    }

    #[test]
    fn token_response_parsing() {
        let (token, secret, user) =
            parse_token_response("accessToken", "oauth_token=a&oauth_token_secret=b&userId=u%201")
                .expect("parse");
        assert_eq!(token, "a");
        assert_eq!(secret, "b");
        assert_eq!(user.as_deref(), Some("u 1"));
    }

    #[test]
    fn token_response_without_secret_is_invalid() {
        assert!(parse_token_response("requestToken", "oauth_token=a").is_err());
    }
}
