use axum::{
    Json, Router,
    extract::{ConnectInfo, DefaultBodyLimit, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::IntoResponse,
    routing::{get, post},
};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::config::AppConfig;
use crate::directory::UserPublic;
use crate::error::Result;
use crate::persistence::{self, ListFilter};
use crate::session::{Session, SessionSummary};
use crate::ws;

/// Longest title derived from a first message.
const MAX_DERIVED_TITLE_CHARS: usize = 120;

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let store = persistence::open(&config.persistence).await?;
    info!(
        name: "persistence.ready",
        provider = %config.persistence.provider,
        timeout_ms = config.persistence.timeout_ms,
        "Persistence initialized"
    );

    let state = AppState::new(store, Arc::clone(&config));
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {:?}", e);
        std::future::pending::<()>().await;
    }
    info!(name: "server.shutdown", "Shutdown signal received");
}

/// Build the application router.
///
/// Plain requests are bounded by `server.request_timeout_secs`; the
/// streaming route is mounted outside that layer.
pub fn build_router(state: AppState) -> Router {
    let timeout_duration = Duration::from_secs(state.config.server.request_timeout_secs);

    let api = Router::new()
        .route("/health", get(health))
        .route("/submit", post(submit))
        .route("/create-session", post(create_session))
        .route("/get-session", get(get_session))
        .route("/all-sessions", get(all_sessions))
        .route("/all-unanswered-sessions", get(all_unanswered_sessions))
        .route("/guest-user", post(guest_user))
        .route("/get-user", get(get_user))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                match tokio::time::timeout(timeout_duration, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response(),
                }
            },
        ));

    let streaming = Router::new().route("/ws/session", get(ws::ws_session));

    api.merge(streaming)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
}

/// GET /health - Liveness probe.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.synchronizer.registry().len(),
    })
}

/// Request body for the submit API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    /// Message text.
    msg: String,
    /// Author user id.
    user_id: String,
    is_answer: bool,
    /// Existing session (creates a new one if not provided).
    #[serde(default)]
    uuid: Option<String>,
}

/// POST /submit - Append a message, creating the session if needed.
async fn submit(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<Session>> {
    let session = match req.uuid.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => {
            state
                .synchronizer
                .append(id, &req.user_id, &req.msg, req.is_answer)
                .await?
        }
        None => {
            state
                .synchronizer
                .start(&derive_title(&req.msg), &req.user_id, &req.msg, req.is_answer)
                .await?
        }
    };
    Ok(Json(session))
}

fn derive_title(msg: &str) -> String {
    msg.trim().chars().take(MAX_DERIVED_TITLE_CHARS).collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    title: String,
    user_id: String,
}

/// POST /create-session - Create an empty session owned by a known user.
async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<SessionSummary>> {
    state.directory.resolve_public(&req.user_id).await?;
    let session = state
        .synchronizer
        .get_or_create(None, &req.title, &req.user_id)
        .await?;
    Ok(Json(session.summary()))
}

#[derive(Debug, Deserialize)]
struct GetSessionQuery {
    uuid: String,
    /// Include the full message history.
    #[serde(default)]
    full: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum SessionView {
    Full(Session),
    Summary(SessionSummary),
}

/// GET /get-session - One session, metadata only unless `full=true`.
async fn get_session(
    State(state): State<AppState>,
    Query(query): Query<GetSessionQuery>,
) -> Result<Json<SessionView>> {
    let session = state.synchronizer.session(&query.uuid).await?;
    Ok(Json(if query.full {
        SessionView::Full(session)
    } else {
        SessionView::Summary(session.summary())
    }))
}

/// GET /all-sessions - Every stored session with its history.
async fn all_sessions(State(state): State<AppState>) -> Result<Json<Vec<Session>>> {
    Ok(Json(state.synchronizer.list(ListFilter::all()).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnansweredQuery {
    #[serde(alias = "answerer_id")]
    answerer_id: String,
    #[serde(default)]
    limit: Option<usize>,
}

/// GET /all-unanswered-sessions - Questions the viewer could answer, newest first.
async fn all_unanswered_sessions(
    State(state): State<AppState>,
    Query(query): Query<UnansweredQuery>,
) -> Result<Json<Vec<SessionSummary>>> {
    let listing = &state.config.listing;
    let limit = query.limit.unwrap_or(listing.unanswered_limit);

    let mut sessions = state
        .synchronizer
        .list_unanswered(&query.answerer_id, Some(limit))
        .await?;
    if listing.shuffle_unanswered {
        sessions.shuffle(&mut rand::thread_rng());
    }

    Ok(Json(sessions.iter().map(Session::summary).collect()))
}

/// POST /guest-user - Issue a guest identity.
async fn guest_user(State(state): State<AppState>, request: Request) -> Result<Json<UserPublic>> {
    let origin = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    Ok(Json(state.directory.create_guest(origin).await?))
}

#[derive(Debug, Deserialize)]
struct GetUserQuery {
    uuid: String,
}

/// GET /get-user - Public projection of a user.
async fn get_user(
    State(state): State<AppState>,
    Query(query): Query<GetUserQuery>,
) -> Result<Json<UserPublic>> {
    Ok(Json(state.directory.resolve_public(&query.uuid).await?))
}
