//! HTTP surface for merged feeds.
//!
//! Routes:
//! - `GET /`: banner, or `?gist=<url>` redirect to that Gist's feed
//! - `GET /feed.xml`: the feed configured in `[feed]`
//! - `GET /{reference}/feed.xml`: a feed resolved from `gist:<id>`
use crate::feed::{generate_feed, MergeOptions, MergedFeedSpec};
use crate::resolver::{parse_gist_id, ResolveError, SourceResolver};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;

const GIST_PREFIX: &str = "gist:";

/// Shared, read-only state for all handlers. No state survives a request
/// besides the HTTP client's connection pool.
#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub resolver: Arc<dyn SourceResolver>,
    pub options: Arc<MergeOptions>,
    pub default_feed: Option<Arc<MergedFeedSpec>>,
    pub cache_max_age_secs: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/feed.xml", get(default_feed))
        .route("/{reference}/feed.xml", get(referenced_feed))
        .with_state(state)
}

/// Serves the router on an already-bound listener until the process exits.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, "Listening");
    }
    axum::serve(listener, router(state)).await
}

#[derive(Debug, Deserialize)]
struct IndexQuery {
    gist: Option<String>,
}

async fn index(Query(query): Query<IndexQuery>) -> Response {
    let Some(gist) = query.gist.filter(|g| !g.trim().is_empty()) else {
        return "Feed Masher".into_response();
    };

    match parse_gist_id(&gist) {
        Ok(id) => Redirect::to(&format!("/{}{}/feed.xml", GIST_PREFIX, id)).into_response(),
        Err(_) => (
            StatusCode::BAD_REQUEST,
            "Uh oh! That URL doesn't look like a Gist. Please try again.",
        )
            .into_response(),
    }
}

async fn default_feed(State(state): State<AppState>) -> Response {
    match &state.default_feed {
        Some(spec) => render(&state, spec).await,
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

async fn referenced_feed(State(state): State<AppState>, Path(reference): Path<String>) -> Response {
    let Some(gist_id) = reference.strip_prefix(GIST_PREFIX) else {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    };

    match state.resolver.resolve(gist_id).await {
        Ok(spec) => render(&state, &spec).await,
        Err(e) => resolve_error_response(&e),
    }
}

async fn render(state: &AppState, spec: &MergedFeedSpec) -> Response {
    match generate_feed(&state.client, spec, &state.options).await {
        Ok(xml) => (
            [
                (header::CONTENT_TYPE, "application/xml".to_string()),
                (
                    header::CACHE_CONTROL,
                    format!("public, max-age={}", state.cache_max_age_secs),
                ),
            ],
            xml,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(id = %spec.id, error = %e, "Failed to render merged feed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

fn resolve_error_response(e: &ResolveError) -> Response {
    let status = match e {
        ResolveError::NotFound => StatusCode::NOT_FOUND,
        ResolveError::InvalidReference(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, e.to_string()).into_response()
}
