//! HTTP routing.
//!
//! Every path goes through one fallback handler: the path grammar
//! (`/static_<route>/..`, `/api_<name>`) uses prefixes inside a segment,
//! which axum's router cannot express, so classification is done by
//! [`RequestTarget::classify`] instead.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use serde_json::json;
use tower_http::trace::TraceLayer;

use portico_core::{RequestTarget, UserId};

use crate::app::AppState;
use crate::context::RequestContext;
use crate::cookie;
use crate::error::ServerError;
use crate::registry::Hook;

/// Route name of the page served when nothing else matches.
pub const NOT_FOUND_ROUTE: &str = "404";

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn dispatch(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path();

    state
        .hooks
        .run(
            Hook::OnRequest,
            &RequestContext::new(
                json!({ "method": method.as_str(), "path": path }),
                state.files.clone(),
                state.base_url(),
            ),
        )
        .await;

    let target = RequestTarget::classify(path);
    tracing::debug!(%method, path, ?target, "request classified");

    if target.is_api() && method != Method::POST {
        return ServerError::MethodNotAllowed.into_response();
    }

    let result = match target {
        RequestTarget::Handshake => state.handshake.handle(&headers, &body).await,
        RequestTarget::Channel { api } => state.channel.handle(api, &headers, &body).await,
        RequestTarget::StaticAsset { route, file } => state.assets.static_asset(route, file).await,
        RequestTarget::PluginFile {
            disposition,
            file_id,
        } => {
            state
                .assets
                .plugin_file(&state.files, disposition, file_id)
                .await
        }
        RequestTarget::Utility { file } => state.assets.utility(file).await,
        RequestTarget::Malformed => Err(ServerError::FileNotFound(path.to_string())),
        RequestTarget::Page { path } => Ok(serve_page(&state, path, &headers).await),
    };

    result.unwrap_or_else(IntoResponse::into_response)
}

/// Resolve the caller, pick the first candidate route they may see and
/// build it.
///
/// When no candidate is allowed, a login redirect wins over the 404 page if
/// any candidate was denied for want of a login.
async fn serve_page(state: &AppState, path: &str, headers: &HeaderMap) -> Response {
    let snapshot = state
        .store
        .resolve_access_snapshot(cookie::read_session_cookie(headers))
        .await;

    let mut saw_login_required = false;
    for route in state.manifest.server.routes.candidates(path) {
        let decision = state.access.can_access(route, &snapshot);
        tracing::debug!(path, route = %route, reason = %decision, "access check");

        if decision.allowed() {
            return build_page(state, route, snapshot.user_id, StatusCode::OK).await;
        }
        saw_login_required |= decision.is_login_required();
    }

    if saw_login_required {
        return (
            StatusCode::FOUND,
            [(header::LOCATION, state.manifest.auth.login_url.as_str())],
        )
            .into_response();
    }

    build_page(state, NOT_FOUND_ROUTE, snapshot.user_id, StatusCode::NOT_FOUND).await
}

async fn build_page(
    state: &AppState,
    route: &str,
    user_id: Option<UserId>,
    status: StatusCode,
) -> Response {
    match state.pages.build(route, user_id).await {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) if route == NOT_FOUND_ROUTE => {
            tracing::debug!(error = %e, "no 404 page, using plain response");
            (StatusCode::NOT_FOUND, "404 Not Found").into_response()
        }
        Err(e) => {
            tracing::error!(route, error = %e, "page build failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "500 Internal Server Error: page build failed")
                .into_response()
        }
    }
}
