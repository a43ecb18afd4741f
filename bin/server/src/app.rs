//! HTTP router assembly.

use std::sync::Arc;

use axum::{Router, middleware::from_fn_with_state, routing::get};
use tower_http::trace::TraceLayer;
use uitid_connect_identity::AccessPolicy;

use crate::auth::{
    self, AppState, admin_pages, authenticated, authorize, connect, home, profile,
    require_link_status,
};

/// Builds the application router.
///
/// The auto-login interceptor wraps every route, so it runs before any
/// handler or route gate. Only the trace layer sits outside it.
pub fn router(state: Arc<AppState>) -> Router {
    let uitid_users_only = from_fn_with_state(
        (state.clone(), AccessPolicy::from_route_requirement("1")),
        require_link_status,
    );

    let gated = Router::new()
        .route("/uitid/profile", get(profile))
        .route_layer(uitid_users_only);

    Router::new()
        .route("/", get(home))
        .route("/uitid/connect", get(connect))
        .route("/uitid/authorize", get(authorize))
        .route("/uitid/authenticated", get(authenticated))
        .route("/uitid/pages", get(admin_pages))
        .merge(gated)
        .layer(from_fn_with_state(state.clone(), auth::auto_login))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
