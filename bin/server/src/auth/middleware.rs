//! Session extraction, the auto-login interceptor and the link-status gate.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderValue, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use rootcause::Report;
use tracing::{debug, warn};
use uitid_connect_identity::{
    AccessPolicy, ROUTE_REQUIREMENT_KEY, Session, SessionId, StoreError, parse_query,
};

use super::AppState;
use crate::error::RequestError;
use crate::pages;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "session";

/// Looks up the session named by the cookie. Expired sessions are deleted
/// and treated as absent.
pub async fn resolve_session(
    state: &AppState,
    jar: &CookieJar,
) -> Result<Option<Session>, Report<StoreError>> {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Ok(None);
    };
    let session_id = SessionId::new(cookie.value().to_string());

    let Some(session) = state.sessions.find(&session_id).await? else {
        return Ok(None);
    };

    if session.is_expired() {
        if let Err(e) = state.sessions.delete(&session_id).await {
            warn!(error = %e, "failed to delete expired session");
        }
        return Ok(None);
    }

    Ok(Some(session))
}

/// Extractor for the current session, if any.
pub struct MaybeSession(pub Option<Session>);

impl<S> FromRequestParts<S> for MaybeSession
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = RequestError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);
        Ok(MaybeSession(resolve_session(&app_state, &jar).await?))
    }
}

/// Sends anonymous visitors carrying the `uid` trust signal into the
/// handshake before anything else handles the request.
pub async fn auto_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let query = parse_query(request.uri().query());
    if query.is_empty() {
        return next.run(request).await;
    }

    let is_anonymous = match resolve_session(&state, &jar).await {
        Ok(session) => session.is_none_or(|s| s.is_anonymous()),
        Err(e) => {
            warn!(error = %e, "session lookup failed in auto-login check");
            return next.run(request).await;
        }
    };

    match state
        .auto_login
        .redirect_for(is_anonymous, request.uri().path(), &query)
    {
        Some(location) => {
            debug!(path = request.uri().path(), "auto-login redirect");
            Redirect::to(&location).into_response()
        }
        None => next.run(request).await,
    }
}

/// Marks a response as varying per session.
pub fn mark_private(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private"));
    headers.insert(header::VARY, HeaderValue::from_static("Cookie"));
}

/// Admits the request only if the session's link status matches the policy.
///
/// Install with `from_fn_with_state((state, policy), require_link_status)`
/// as a route layer.
pub async fn require_link_status(
    State((state, policy)): State<(Arc<AppState>, AccessPolicy)>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let session = match resolve_session(&state, &jar).await {
        Ok(session) => session,
        Err(e) => return RequestError::from(e).into_response(),
    };
    let session_id = session.as_ref().map(Session::id);

    let decision = match state.gate.check(session_id, policy).await {
        Ok(decision) => decision,
        Err(e) => return RequestError::from(e).into_response(),
    };

    let mut response = match decision.reason() {
        None => next.run(request).await,
        Some(reason) => {
            debug!(
                requirement = ROUTE_REQUIREMENT_KEY,
                required = policy.required_link_status(),
                reason,
                path = request.uri().path(),
                "route access denied"
            );
            (StatusCode::FORBIDDEN, pages::access_denied()).into_response()
        }
    };
    mark_private(&mut response);
    response
}
