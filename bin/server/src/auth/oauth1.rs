//! OAuth 1.0a request signing (RFC 5849, HMAC-SHA1).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use url::Url;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";

/// Percent-encodes a value, leaving only RFC 3986 unreserved characters.
#[must_use]
pub fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Builds the base string URI: scheme, host, non-default port and path.
#[must_use]
pub fn base_string_uri(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{host}:{port}{}", url.scheme(), url.path()),
        None => format!("{}://{host}{}", url.scheme(), url.path()),
    }
}

/// Normalizes request parameters: encoded, sorted by name then value,
/// joined with `&`.
#[must_use]
pub fn normalize_parameters(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (encode(k), encode(v)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Builds the signature base string.
///
/// `params` holds every query, form body and `oauth_*` parameter, decoded.
#[must_use]
pub fn signature_base_string(method: &str, url: &Url, params: &[(String, String)]) -> String {
    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        encode(&base_string_uri(url)),
        encode(&normalize_parameters(params))
    )
}

/// Signs a base string with the consumer secret and token secret.
#[must_use]
pub fn sign(base_string: &str, consumer_secret: &str, token_secret: &str) -> String {
    let key = format!("{}&{}", encode(consumer_secret), encode(token_secret));
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha1::new_from_slice(key.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(base_string.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// The credentials a single request is signed with.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub consumer_key: &'a str,
    pub consumer_secret: &'a str,
    pub token: Option<&'a str>,
    pub token_secret: &'a str,
}

/// Protocol parameters of one signed request.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    oauth_params: Vec<(String, String)>,
}

impl SignedRequest {
    /// Signs a request.
    ///
    /// `extra_oauth` carries protocol parameters such as `oauth_callback` or
    /// `oauth_verifier`; `request_params` the decoded query and form body.
    #[must_use]
    pub fn new(
        method: &str,
        url: &Url,
        credentials: Credentials<'_>,
        extra_oauth: &[(&str, &str)],
        request_params: &[(String, String)],
        nonce: &str,
        timestamp: i64,
    ) -> Self {
        let mut oauth_params = vec![
            (
                "oauth_consumer_key".to_string(),
                credentials.consumer_key.to_string(),
            ),
            ("oauth_nonce".to_string(), nonce.to_string()),
            (
                "oauth_signature_method".to_string(),
                SIGNATURE_METHOD.to_string(),
            ),
            ("oauth_timestamp".to_string(), timestamp.to_string()),
            ("oauth_version".to_string(), "1.0".to_string()),
        ];
        if let Some(token) = credentials.token {
            oauth_params.push(("oauth_token".to_string(), token.to_string()));
        }
        oauth_params.extend(
            extra_oauth
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
        );

        let mut all: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        all.extend(request_params.iter().cloned());
        all.extend(oauth_params.iter().cloned());

        let base = signature_base_string(method, url, &all);
        let signature = sign(&base, credentials.consumer_secret, credentials.token_secret);
        oauth_params.push(("oauth_signature".to_string(), signature));

        Self { oauth_params }
    }

    /// Returns the value of a protocol parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.oauth_params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Renders the `Authorization` header value.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        let fields = self
            .oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("OAuth {fields}")
    }
}
