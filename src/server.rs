//!
//! doorman HTTP server
//! -------------------
//! Axum-based HTTP API over the account procedure layer.
//!
//! Responsibilities:
//! - Cookie-based session transport (`doorman_session`).
//! - Resolving the caller's identity once per request, before the target
//!   procedure runs.
//! - Mapping procedure failures to HTTP statuses via `AppError`.
//!
//! The procedures themselves live in `crate::procedures`; this module is
//! plumbing only.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::info;

use crate::error::AppResult;
use crate::identity::{resolve_identity, RequestContext, SessionManager};
use crate::procedures::{
    Ack, ChangePasswordInput, ListInput, ListOutput, LoginInput, Procedures, PublicUser, SignupInput,
    UpdateProfileInput,
};
use crate::storage::parquet::ParquetUserStore;

const SESSION_COOKIE: &str = "doorman_session";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub procedures: Procedures,
}

fn log_startup(data_root: &str, owner_identity: Option<&str>) {
    let cwd = std::env::current_dir().ok();
    let db_env = std::env::var("DOORMAN_DB_FOLDER").ok();
    info!(
        target: "startup",
        "doorman starting. cwd={:?}, data_root_param={:?}, DOORMAN_DB_FOLDER_env={:?}, owner_identity_set={}",
        cwd, data_root, db_env, owner_identity.is_some()
    );
}

/// Start the doorman HTTP server bound to the given port, with the user
/// table stored under `data_root`.
pub async fn run_with_port(http_port: u16, data_root: &str, owner_identity: Option<String>) -> anyhow::Result<()> {
    log_startup(data_root, owner_identity.as_deref());

    let store = ParquetUserStore::new(data_root)?;
    let procedures = Procedures::new(Arc::new(store), SessionManager::default(), owner_identity);
    let app_state = AppState { procedures };

    let app = router(app_state);

    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Convenience entry point using the default port (7878) and data root "data".
pub async fn run() -> anyhow::Result<()> {
    run_with_port(7878, "data", std::env::var("DOORMAN_OWNER_IDENTITY").ok()).await
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "doorman ok" }))
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/users/profile", get(profile).post(update_profile))
        .route("/api/users/password", post(change_password))
        .route("/api/users/list", get(list))
        .route("/api/users/{id}/activate", post(activate))
        .route("/api/users/{id}/deactivate", post(deactivate))
        .with_state(state)
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name { return Some(v[1..].to_string()); }
        }
    }
    None
}

fn set_session_cookie(token: &str) -> HeaderValue {
    // Secure, HttpOnly cookie scoped to path / with SameSite=Strict
    HeaderValue::from_str(&format!("{}={}; HttpOnly; Secure; SameSite=Strict; Path=/", SESSION_COOKIE, token)).unwrap()
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_str(&format!("{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Strict; Path=/", SESSION_COOKIE)).unwrap()
}

/// Identity resolution runs here, once, before any procedure body.
fn ctx_from_headers(state: &AppState, headers: &HeaderMap) -> RequestContext {
    let token = parse_cookie(headers, SESSION_COOKIE);
    resolve_identity(state.procedures.store(), state.procedures.sessions(), token.as_deref())
}

async fn signup(State(state): State<AppState>, Json(input): Json<SignupInput>) -> AppResult<Json<serde_json::Value>> {
    let user = state.procedures.signup(input).await?;
    Ok(Json(json!({"success": true, "user": user})))
}

async fn login(State(state): State<AppState>, Json(input): Json<LoginInput>) -> AppResult<(HeaderMap, Json<serde_json::Value>)> {
    let out = state.procedures.login(input).await?;
    let mut headers = HeaderMap::new();
    headers.insert("Set-Cookie", set_session_cookie(&out.token));
    Ok((headers, Json(json!({"success": true, "user": out.user}))))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<(HeaderMap, Json<Ack>)> {
    let ctx = ctx_from_headers(&state, &headers);
    let ack = state.procedures.logout(&ctx).await?;
    let mut h = HeaderMap::new();
    h.insert("Set-Cookie", clear_session_cookie());
    Ok((h, Json(ack)))
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Option<PublicUser>>> {
    let ctx = ctx_from_headers(&state, &headers);
    Ok(Json(state.procedures.me(&ctx).await?))
}

async fn profile(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<PublicUser>> {
    let ctx = ctx_from_headers(&state, &headers);
    Ok(Json(state.procedures.profile(&ctx).await?))
}

async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<UpdateProfileInput>,
) -> AppResult<Json<PublicUser>> {
    let ctx = ctx_from_headers(&state, &headers);
    Ok(Json(state.procedures.update_profile(&ctx, input).await?))
}

async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<ChangePasswordInput>,
) -> AppResult<Json<Ack>> {
    let ctx = ctx_from_headers(&state, &headers);
    Ok(Json(state.procedures.change_password(&ctx, input).await?))
}

async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(input): Query<ListInput>,
) -> AppResult<Json<ListOutput>> {
    let ctx = ctx_from_headers(&state, &headers);
    Ok(Json(state.procedures.list(&ctx, input).await?))
}

async fn activate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> AppResult<Json<Ack>> {
    let ctx = ctx_from_headers(&state, &headers);
    Ok(Json(state.procedures.activate(&ctx, id).await?))
}

async fn deactivate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> AppResult<Json<Ack>> {
    let ctx = ctx_from_headers(&state, &headers);
    Ok(Json(state.procedures.deactivate(&ctx, id).await?))
}
