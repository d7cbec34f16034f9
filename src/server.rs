//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `GET`  | `/health` | no | Health check (returns version) |
//! | `POST` | `/api/login` | no | Exchange username/password for a bearer token |
//! | `POST` | `/api/logout` | no | Revoke the presented token, if any |
//! | `GET`  | `/api/networks` | yes | Networks with stored entries |
//! | `GET`  | `/api/channels/{network}` | yes | `#` channels of a network |
//! | `POST` | `/api/search` | yes | Search a network's logs |
//! | `POST` | `/api/context` | yes | Lines around a search hit |
//! | `GET`  | `/api/stats` | yes | Database overview |
//! | `POST` | `/api/import` | yes | Import one network |
//! | `GET`  | `/api/user/info` | yes | The signed-in account |
//! | `POST` | `/api/user/password` | yes | Change the signed-in account's password |
//!
//! Authenticated routes expect `Authorization: Bearer <token>` and are
//! guarded by a single middleware layer.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `internal` (500).

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::{self, CredentialCheck, SessionStore, SqliteCredentials, UserInfo};
use crate::browse;
use crate::config::Config;
use crate::context::{get_context, ContextRequest, ContextWindow};
use crate::db;
use crate::error::Error;
use crate::ingest::{self, ImportReport, Importer};
use crate::migrate;
use crate::models::Network;
use crate::search::{search_entries, SearchRequest, SearchResponse};
use crate::stats::{collect_stats, Stats};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub sessions: Arc<SessionStore>,
    pub credentials: Arc<dyn CredentialCheck>,
}

impl AppState {
    /// State backed by the `users` table of `pool`.
    pub fn new(config: Config, pool: SqlitePool) -> Self {
        let sessions = Arc::new(SessionStore::new(config.auth.session_ttl_secs));
        Self {
            credentials: Arc::new(SqliteCredentials::new(pool.clone())),
            config: Arc::new(config),
            pool,
            sessions,
        }
    }
}

/// Starts the HTTP server on `[server] bind` and runs until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let bind_addr = config.server.bind.clone();
    let app = router(AppState::new(config.clone(), pool.clone()));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening");
    println!("znc-search listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    pool.close().await;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/api/networks", get(handle_networks))
        .route("/api/channels/{network}", get(handle_channels))
        .route("/api/search", post(handle_search))
        .route("/api/context", post(handle_context))
        .route("/api/stats", get(handle_stats))
        .route("/api/import", post(handle_import))
        .route("/api/user/info", get(handle_user_info))
        .route("/api/user/password", post(handle_change_password))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/login", post(handle_login))
        .route("/api/logout", post(handle_logout))
        .merge(protected)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(message) => bad_request(message),
            Error::Unauthorized => unauthorized("authentication required"),
            Error::NotFound(message) => not_found(message),
            Error::Config(message) => {
                error!(error = %message, "configuration error while serving request");
                internal(message)
            }
            other => {
                error!(error = %other, "request failed");
                internal("internal error")
            }
        }
    }
}

// ============ Auth ============

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Username of the session that made the request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())
        .map(str::to_string)
        .ok_or(Error::Unauthorized)?;
    let username = state.sessions.validate(&token).await?;
    req.extensions_mut().insert(CurrentUser(username));
    Ok(next.run(req).await)
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    username: String,
}

async fn handle_login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    if body.username.trim().is_empty() || body.password.is_empty() {
        return Err(bad_request("username and password required"));
    }

    let Some(username) = state
        .credentials
        .verify(body.username.trim(), &body.password)
        .await?
    else {
        info!(username = %body.username.trim(), "login rejected");
        return Err(unauthorized("invalid username or password"));
    };

    let token = state.sessions.create(&username).await;
    info!(username = %username, "login");
    Ok(Json(LoginResponse { token, username }))
}

async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> Json<StatusResponse> {
    if let Some(token) = bearer_token(&headers) {
        state.sessions.revoke(token).await;
    }
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
}

// ============ Account ============

async fn handle_user_info(
    State(state): State<AppState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
) -> Result<Json<UserInfo>, AppError> {
    Ok(Json(auth::user_info(&state.pool, &username).await?))
}

#[derive(Deserialize)]
struct ChangePasswordRequest {
    #[serde(default)]
    current_password: String,
    #[serde(default)]
    new_password: String,
}

async fn handle_change_password(
    State(state): State<AppState>,
    Extension(CurrentUser(username)): Extension<CurrentUser>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    if body.current_password.is_empty() || body.new_password.is_empty() {
        return Err(bad_request("current and new password required"));
    }
    auth::check_new_password(&body.new_password)?;
    if state
        .credentials
        .verify(&username, &body.current_password)
        .await?
        .is_none()
    {
        return Err(unauthorized("current password is incorrect"));
    }

    auth::set_password(&state.pool, &username, &body.new_password).await?;
    info!(username = %username, "password changed");
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Browse ============

async fn handle_networks(State(state): State<AppState>) -> Result<Json<Vec<Network>>, AppError> {
    Ok(Json(browse::list_networks(&state.pool).await?))
}

async fn handle_channels(
    State(state): State<AppState>,
    Path(network): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(browse::list_channels(&state.pool, &network).await?))
}

// ============ POST /api/search ============

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let response = search_entries(&state.pool, &req, state.config.search.max_results).await?;
    Ok(Json(response))
}

// ============ POST /api/context ============

async fn handle_context(
    State(state): State<AppState>,
    Json(req): Json<ContextRequest>,
) -> Result<Json<ContextWindow>, AppError> {
    let window = get_context(&state.pool, &req, &state.config.search).await?;
    Ok(Json(window))
}

// ============ GET /api/stats ============

async fn handle_stats(State(state): State<AppState>) -> Result<Json<Stats>, AppError> {
    Ok(Json(collect_stats(&state.pool).await?))
}

// ============ POST /api/import ============

#[derive(Deserialize)]
struct ImportRequest {
    #[serde(default)]
    network: String,
    #[serde(default)]
    force: bool,
}

/// Imports one network synchronously. Subject to the request timeout; work
/// committed before a timeout stays, and the next import resumes from there.
async fn handle_import(
    State(state): State<AppState>,
    Json(req): Json<ImportRequest>,
) -> Result<Json<ImportReport>, AppError> {
    let network = req.network.trim();
    if network.is_empty() {
        return Err(bad_request("network required"));
    }

    ingest::check_base_path(&state.config.import)?;
    let report = Importer::new(&state.pool, &state.config.import)
        .import_network(network, req.force)
        .await?;
    ingest::record_import_time(&state.pool).await?;
    Ok(Json(report))
}
