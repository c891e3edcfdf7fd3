//!
//! powtoon HTTP server
//! -------------------
//! Axum-based HTTP API for the Powtoon sharing service.
//!
//! Responsibilities:
//! - Session management with a simple cookie + CSRF token model.
//! - Login/logout endpoints backed by the `security` module.
//! - Record routes (`/powtoons`) and sharing routes (`/shared`) delegating to
//!   the record service.
//! - Mapping classified service outcomes to HTTP status codes: read denials
//!   surface as 404, update denials as 403, delete denials as 404, malformed
//!   share payloads as 400.

use std::{collections::HashMap, net::SocketAddr};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};
use tokio::sync::RwLock;

use crate::error::ApiError;
use crate::identity::Principal;
use crate::security::Users;
use crate::service::PowtoonService;
use crate::store::{Powtoon, PowtoonPatch, SharedStore};

const SESSION_COOKIE: &str = "powtoon_session";

/// Shared server state injected into all handlers.
///
/// Holds the record service, the user registry for login/principal lookup,
/// and the session/CSRF maps.
#[derive(Clone)]
pub struct AppState {
    pub service: PowtoonService<SharedStore, Users>,
    pub users: Users,
    /// Session id -> username mapping
    pub sessions: std::sync::Arc<RwLock<HashMap<String, String>>>,
    /// Session id -> CSRF token mapping
    pub csrf_tokens: std::sync::Arc<RwLock<HashMap<String, String>>>,
}

/// Start the powtoon HTTP server bound to the given port, with record and
/// user tables persisted under `db_root`. Ensures a default admin exists and
/// mounts all routes.
pub async fn run_with_port(http_port: u16, db_root: &str) -> anyhow::Result<()> {
    let users = Users::new(db_root)?;
    users.ensure_default_admin()?;
    let store = SharedStore::new(db_root)?;
    let service = PowtoonService::new(store, users.clone());

    let app_state = AppState {
        service,
        users,
        sessions: std::sync::Arc::new(RwLock::new(HashMap::new())),
        csrf_tokens: std::sync::Arc::new(RwLock::new(HashMap::new())),
    };

    let app = Router::new()
        .route("/", get(|| async { "powtoon ok" }))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/csrf", get(get_csrf))
        .route("/powtoons", get(list_powtoons).post(create_powtoon))
        .route(
            "/powtoons/{id}",
            get(get_powtoon).put(update_powtoon).delete(delete_powtoon),
        )
        .route("/shared", get(list_shared))
        .route("/shared/{id}", put(share_powtoon))
        .with_state(app_state);

    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct CreatePayload {
    name: String,
    #[serde(default)]
    content: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SharePayload {
    #[serde(default)]
    shared_with: Vec<String>,
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name {
                return Some(v[1..].to_string());
            }
        }
    }
    None
}

fn get_sid_from_headers(headers: &HeaderMap) -> Option<String> {
    parse_cookie(headers, SESSION_COOKIE)
}

/// Resolve the authenticated principal for a request, or None.
async fn get_principal_from_headers(state: &AppState, headers: &HeaderMap) -> Option<Principal> {
    let sid = get_sid_from_headers(headers)?;
    let username = {
        let map = state.sessions.read().await;
        map.get(&sid).cloned()?
    };
    state.users.principal_for(&username)
}

async fn validate_csrf(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(sid) = get_sid_from_headers(headers) else { return false; };
    let Some(provided) = headers.get("x-csrf-token").and_then(|v| v.to_str().ok()).map(|s| s.to_string()) else { return false; };
    let cmap = state.csrf_tokens.read().await;
    match cmap.get(&sid) {
        Some(expected) => expected == &provided,
        None => false,
    }
}

fn random_hex(len_bytes: usize) -> String {
    let mut bytes = vec![0u8; len_bytes];
    let _ = getrandom::getrandom(&mut bytes);
    let mut out = String::with_capacity(len_bytes * 2);
    use std::fmt::Write as _;
    for b in &bytes {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn set_session_cookie(sid: &str) -> HeaderValue {
    // Secure, HttpOnly cookie scoped to path / with SameSite=Strict
    HeaderValue::from_str(&format!("{}={}; HttpOnly; Secure; SameSite=Strict; Path=/", SESSION_COOKIE, sid)).unwrap()
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_str(&format!("{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Strict; Path=/", SESSION_COOKIE)).unwrap()
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"status":"unauthorized"}))).into_response()
}

fn csrf_forbidden() -> Response {
    (StatusCode::FORBIDDEN, Json(json!({"status":"forbidden","error":"invalid csrf"}))).into_response()
}

fn error_response(e: &ApiError) -> Response {
    let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("request failed: {}", e);
    }
    (status, Json(json!({"status":"error","code": e.code_str(),"message": e.message()}))).into_response()
}

/// Record echo shape for `/powtoons` routes.
fn powtoon_json(rec: &Powtoon) -> Value {
    json!({"id": rec.id, "name": rec.name, "content": rec.content})
}

/// Record echo shape for `/shared` routes: id plus current membership.
fn shared_json(rec: &Powtoon) -> Value {
    json!({"id": rec.id, "shared_with": rec.shared_with})
}

async fn login(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> Response {
    if !state.users.authenticate(&payload.username, &payload.password) {
        return unauthorized();
    }
    let sid = random_hex(16);
    let csrf = random_hex(32);
    {
        let mut map = state.sessions.write().await;
        map.insert(sid.clone(), payload.username.clone());
    }
    {
        let mut cmap = state.csrf_tokens.write().await;
        cmap.insert(sid.clone(), csrf);
    }
    let mut headers = HeaderMap::new();
    headers.insert("Set-Cookie", set_session_cookie(&sid));
    (StatusCode::OK, headers, Json(json!({"status":"ok"}))).into_response()
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !validate_csrf(&state, &headers).await {
        return csrf_forbidden();
    }
    if let Some(sid) = get_sid_from_headers(&headers) {
        let mut map = state.sessions.write().await;
        map.remove(&sid);
        let mut cmap = state.csrf_tokens.write().await;
        cmap.remove(&sid);
    }
    let mut h = HeaderMap::new();
    h.insert("Set-Cookie", clear_session_cookie());
    (StatusCode::OK, h, Json(json!({"status":"ok"}))).into_response()
}

async fn get_csrf(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(_principal) = get_principal_from_headers(&state, &headers).await else {
        return unauthorized();
    };
    let Some(sid) = get_sid_from_headers(&headers) else {
        return unauthorized();
    };
    let cmap = state.csrf_tokens.read().await;
    if let Some(token) = cmap.get(&sid) {
        return (StatusCode::OK, Json(json!({"status":"ok","csrf": token}))).into_response();
    }
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"status":"error","error":"csrf not available"}))).into_response()
}

async fn list_powtoons(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(principal) = get_principal_from_headers(&state, &headers).await else {
        return unauthorized();
    };
    match state.service.list(&principal) {
        Ok(recs) => {
            let body: Vec<Value> = recs.iter().map(powtoon_json).collect();
            (StatusCode::OK, Json(Value::Array(body))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn create_powtoon(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePayload>,
) -> Response {
    let Some(principal) = get_principal_from_headers(&state, &headers).await else {
        return unauthorized();
    };
    if !validate_csrf(&state, &headers).await {
        return csrf_forbidden();
    }
    match state.service.create(&principal, &payload.name, payload.content) {
        Ok(rec) => (StatusCode::CREATED, Json(powtoon_json(&rec))).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn get_powtoon(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let Some(principal) = get_principal_from_headers(&state, &headers).await else {
        return unauthorized();
    };
    match state.service.get(&principal, id) {
        Ok(rec) => (StatusCode::OK, Json(powtoon_json(&rec))).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn update_powtoon(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<PowtoonPatch>,
) -> Response {
    let Some(principal) = get_principal_from_headers(&state, &headers).await else {
        return unauthorized();
    };
    if !validate_csrf(&state, &headers).await {
        return csrf_forbidden();
    }
    match state.service.update(&principal, id, &patch) {
        Ok(rec) => (StatusCode::OK, Json(powtoon_json(&rec))).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn delete_powtoon(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let Some(principal) = get_principal_from_headers(&state, &headers).await else {
        return unauthorized();
    };
    if !validate_csrf(&state, &headers).await {
        return csrf_forbidden();
    }
    match state.service.delete(&principal, id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e),
    }
}

async fn list_shared(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(principal) = get_principal_from_headers(&state, &headers).await else {
        return unauthorized();
    };
    match state.service.list_shared(&principal) {
        Ok(recs) => {
            let body: Vec<Value> = recs.iter().map(shared_json).collect();
            (StatusCode::OK, Json(Value::Array(body))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn share_powtoon(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<SharePayload>,
) -> Response {
    let Some(principal) = get_principal_from_headers(&state, &headers).await else {
        return unauthorized();
    };
    if !validate_csrf(&state, &headers).await {
        return csrf_forbidden();
    }
    match state.service.reshare(&principal, id, &payload.shared_with) {
        Ok(rec) => (StatusCode::OK, Json(shared_json(&rec))).into_response(),
        Err(e) => error_response(&e),
    }
}
