//! UiTID handshake, landing and profile routes.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Duration as ChronoDuration;
use serde::Deserialize;
use time::Duration as TimeDuration;
use tracing::warn;
use uitid_connect_identity::{
    CallbackParams, CurrentUser, FinalizeOutcome, GENERIC_LOGIN_ERROR, InitiateOutcome,
    InitiateRequest, Session, SessionId, is_linked,
};

use super::{
    AppState,
    middleware::{MaybeSession, SESSION_COOKIE, mark_private, resolve_session},
};
use crate::config::InertResponse;
use crate::error::RequestError;
use crate::pages;

/// Flash message cookie name.
pub const FLASH_COOKIE: &str = "flash";

/// Query parameters of the connect route.
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    destination: Option<String>,
    #[serde(rename = "skipConfirmation")]
    skip_confirmation: Option<String>,
    register: Option<String>,
}

/// Query parameters of the provider callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    oauth_token: Option<String>,
    oauth_verifier: Option<String>,
    destination: Option<String>,
}

/// Query parameters of the authenticated landing page.
#[derive(Debug, Deserialize)]
pub struct AuthenticatedQuery {
    #[serde(rename = "_exception_statuscode")]
    exception_status_code: Option<String>,
}

/// Query parameters of the admin pages listing.
#[derive(Debug, Deserialize)]
pub struct AdminPagesQuery {
    category: Option<String>,
    reset: Option<String>,
}

fn flash_cookie(message: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((FLASH_COOKIE, urlencoding::encode(message).into_owned()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::minutes(5))
        .build()
}

fn session_cookie(state: &AppState, session_id: &SessionId) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id.as_str().to_string()))
        .path("/")
        .http_only(true)
        .secure(state.settings.session.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::minutes(state.settings.session.duration_minutes))
        .build()
}

/// Redirects home, carrying the generic login error.
fn fail_home(state: &AppState, jar: CookieJar, redirect_to: &str) -> Response {
    let jar = jar.add(flash_cookie(
        GENERIC_LOGIN_ERROR,
        state.settings.session.secure_cookies,
    ));
    (jar, Redirect::to(redirect_to)).into_response()
}

/// Starts the handshake, creating an anonymous session if needed.
pub async fn connect(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Response, RequestError> {
    let (session_id, jar) = match resolve_session(&state, &jar).await? {
        Some(session) => (session.id().clone(), jar),
        None => {
            let duration = state.settings.session.duration_minutes;
            let session = Session::new(SessionId::generate(), ChronoDuration::minutes(duration));
            state.sessions.create(&session).await?;
            let cookie = session_cookie(&state, session.id());
            (session.id().clone(), jar.add(cookie))
        }
    };

    let locale = state.settings.locale.negotiate(
        headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok()),
    );
    let request = InitiateRequest {
        destination: query.destination.filter(|d| !d.is_empty()),
        skip_confirmation: query.skip_confirmation.is_some(),
        register: query.register.is_some(),
        locale,
    };

    match state.flow.initiate(&session_id, request).await {
        InitiateOutcome::AwaitingProviderRedirect { authorize_url } => {
            let mut response = (jar, Redirect::to(&authorize_url)).into_response();
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            Ok(response)
        }
        InitiateOutcome::Failed(failure) => Ok(fail_home(&state, jar, failure.redirect_to)),
    }
}

/// Completes the handshake from the provider callback.
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<Response, RequestError> {
    // Without a session there is no stored request token, so the flow
    // fails or stays inert without touching storage.
    let session_id = resolve_session(&state, &jar)
        .await?
        .map(|s| s.id().clone())
        .unwrap_or_else(SessionId::generate);

    let params = CallbackParams {
        oauth_token: query.oauth_token,
        oauth_verifier: query.oauth_verifier,
        destination: query.destination,
    };

    let response = match state.flow.finalize(&session_id, params).await {
        FinalizeOutcome::Bound { redirect, .. } => {
            // The pre-login session ID must not survive the login.
            let rotated = SessionId::generate();
            if state.sessions.rotate(&session_id, &rotated).await?.is_none() {
                warn!("session vanished during uitid login");
                return Ok(fail_home(&state, jar, "/"));
            }
            let jar = jar.add(session_cookie(&state, &rotated));
            (jar, Redirect::to(redirect.location())).into_response()
        }
        FinalizeOutcome::Failed(failure) => fail_home(&state, jar, failure.redirect_to),
        FinalizeOutcome::Inert(reason) => {
            warn!(?reason, "uitid callback produced no login");
            match state.settings.handshake.inert_response {
                InertResponse::Empty => StatusCode::OK.into_response(),
                InertResponse::RedirectHome => fail_home(&state, jar, "/"),
            }
        }
    };
    Ok(response)
}

/// Renders the access denied fragment for linked users, or the landing page
/// inviting everyone else to log in.
pub async fn authenticated(
    State(state): State<Arc<AppState>>,
    MaybeSession(session): MaybeSession,
    Query(query): Query<AuthenticatedQuery>,
) -> Result<Response, RequestError> {
    let linked = match session.as_ref().filter(|s| !s.is_anonymous()) {
        Some(session) => is_linked(state.bindings.binding(session.id()).await?.as_ref()),
        None => false,
    };

    let mut response = if linked {
        if query.exception_status_code.as_deref() == Some("403") {
            (StatusCode::FORBIDDEN, pages::access_denied()).into_response()
        } else {
            Redirect::to("/").into_response()
        }
    } else {
        pages::landing().into_response()
    };
    mark_private(&mut response);
    Ok(response)
}

async fn current_user(
    state: &AppState,
    session: Option<&Session>,
) -> Result<CurrentUser, RequestError> {
    Ok(CurrentUser::load(
        session.map(Session::id),
        state.bindings.as_ref(),
        state.client.clone(),
        state.profiles.clone(),
    )
    .await?)
}

/// Home page showing the linked user, if any, and any flash message.
pub async fn home(
    State(state): State<Arc<AppState>>,
    MaybeSession(session): MaybeSession,
    jar: CookieJar,
) -> Result<Response, RequestError> {
    let flash = jar.get(FLASH_COOKIE).map(|c| {
        urlencoding::decode(c.value())
            .map(|m| m.into_owned())
            .unwrap_or_else(|_| c.value().to_string())
    });
    let jar = if flash.is_some() {
        jar.add(
            Cookie::build((FLASH_COOKIE, ""))
                .path("/")
                .max_age(TimeDuration::ZERO),
        )
    } else {
        jar
    };

    let user = current_user(&state, session.as_ref()).await?;
    let name = match user.name().await {
        Ok(name) => name,
        Err(e) => {
            warn!(error = %e, "uitid profile unavailable");
            user.user_id().map(str::to_string)
        }
    };

    let mut response = (jar, pages::home(name.as_deref(), flash.as_deref())).into_response();
    mark_private(&mut response);
    Ok(response)
}

/// Profile of the linked UiTID user. Gated on `_is_uitid_user: "1"`.
pub async fn profile(
    State(state): State<Arc<AppState>>,
    MaybeSession(session): MaybeSession,
) -> Result<Response, RequestError> {
    let user = current_user(&state, session.as_ref()).await?;
    let Some(profile) = user.user(false).await? else {
        return Ok(Redirect::to("/uitid/authenticated").into_response());
    };
    Ok(pages::profile(&profile).into_response())
}

/// Lists the pages the linked user administers, guarded by the configured
/// view access options.
pub async fn admin_pages(
    State(state): State<Arc<AppState>>,
    MaybeSession(session): MaybeSession,
    Query(query): Query<AdminPagesQuery>,
) -> Result<Response, RequestError> {
    let decision = state
        .gate
        .check_view(
            session.as_ref().map(Session::id),
            &state.settings.admin_pages_view,
        )
        .await?;

    let mut response = if decision.is_allowed() {
        let user = current_user(&state, session.as_ref()).await?;
        let category = query.category.as_deref().filter(|c| !c.is_empty());
        let memberships = user.admin_pages(category, query.reset.is_some()).await?;
        pages::admin_pages(
            state.settings.admin_pages_view.summary_title(),
            category,
            &memberships,
        )
        .into_response()
    } else {
        (StatusCode::FORBIDDEN, pages::access_denied()).into_response()
    };
    mark_private(&mut response);
    Ok(response)
}
