//! Auto-login redirect for links carrying a UiTID trust signal.
//!
//! Partner sites link to this application with a `uid` query parameter when
//! the visitor is known to have a UiTID session. Anonymous visitors arriving
//! that way are sent straight into the handshake, returning to the page they
//! asked for once linked.

use url::form_urlencoded;

use crate::handshake::DESTINATION_PARAM;

/// Query parameter signalling that the visitor has a UiTID session.
pub const TRUST_SIGNAL_PARAM: &str = "uid";

/// Query parameter asking the provider to skip its confirmation screen.
pub const SKIP_CONFIRMATION_PARAM: &str = "skipConfirmation";

/// Path of the handshake initiation endpoint.
pub const CONNECT_PATH: &str = "/uitid/connect";

/// Computes auto-login redirects.
#[derive(Debug, Clone)]
pub struct AutoLoginRedirect {
    connect_path: String,
    trust_param: String,
}

impl Default for AutoLoginRedirect {
    fn default() -> Self {
        Self {
            connect_path: CONNECT_PATH.to_string(),
            trust_param: TRUST_SIGNAL_PARAM.to_string(),
        }
    }
}

impl AutoLoginRedirect {
    /// Creates a redirect policy with a custom connect path.
    #[must_use]
    pub fn new(connect_path: impl Into<String>) -> Self {
        Self {
            connect_path: connect_path.into(),
            ..Self::default()
        }
    }

    /// Returns the connect URL to redirect to, or `None` if the request
    /// should proceed.
    ///
    /// Fires only for anonymous sessions whose query carries the trust
    /// signal. Every trust signal pair is dropped; the remaining query is
    /// kept and also folded into the `destination`. An incoming
    /// `destination` or `skipConfirmation` is overwritten on the connect
    /// query but stays part of the destination's own query.
    #[must_use]
    pub fn redirect_for(
        &self,
        is_anonymous: bool,
        path: &str,
        query: &[(String, String)],
    ) -> Option<String> {
        if !is_anonymous || !query.iter().any(|(key, _)| key == &self.trust_param) {
            return None;
        }

        let remaining: Vec<&(String, String)> = query
            .iter()
            .filter(|(key, _)| key != &self.trust_param)
            .collect();

        let mut destination = path.to_string();
        if !remaining.is_empty() {
            let encoded = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(remaining.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .finish();
            destination.push('?');
            destination.push_str(&encoded);
        }

        // `destination` and `skipConfirmation` are replaced, not repeated.
        let connect_query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(
                remaining
                    .iter()
                    .filter(|(k, _)| k != DESTINATION_PARAM && k != SKIP_CONFIRMATION_PARAM)
                    .map(|(k, v)| (k.as_str(), v.as_str())),
            )
            .append_pair(DESTINATION_PARAM, &destination)
            .append_pair(SKIP_CONFIRMATION_PARAM, "true")
            .finish();

        Some(format!("{}?{connect_query}", self.connect_path))
    }
}

/// Parses a raw query string into ordered pairs.
#[must_use]
pub fn parse_query(query: Option<&str>) -> Vec<(String, String)> {
    query
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}
