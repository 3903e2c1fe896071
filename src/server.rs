//! HTTP chat server.
//!
//! Session-cookie authenticated Axum surface over the chat pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Chat page with the user's history |
//! | `POST` | `/` | Submit a message, returns `{message, response}` JSON |
//! | `POST` | `/stream_chat/` | Submit a message, answer streamed word-by-word as SSE lines |
//! | `POST` | `/delete_chat/` | Delete the user's history, 204 on success |
//! | `GET/POST` | `/login` | Credential login |
//! | `GET/POST` | `/register` | Account creation |
//! | `POST` | `/logout` | Clear the session cookie |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Request handling is fully serial per invocation: one retrieval decision
//! and one model call per chat request, no background work. The shared
//! state (index registry, app pool, model client) is safe under the
//! multi-threaded runtime.
//!
//! Model-call failures surface as HTTP 500 with an `{"error": ...}` body;
//! they are never written into the chat transcript as if the assistant had
//! said them.

use axum::{
    extract::{Form, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::agent;
use crate::auth::{self, User};
use crate::config::Config;
use crate::db;
use crate::history;
use crate::index::IndexRegistry;
use crate::llm::{self, ChatModel};
use crate::migrate;
use crate::models::ConversationTurn;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    registry: Arc<IndexRegistry>,
    model: Arc<dyn ChatModel>,
}

/// Start the chat server. Runs migrations, builds the model client (which
/// fails fast on a missing API key), and serves until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let model: Arc<dyn ChatModel> = Arc::from(llm::create_chat_model(&config.llm)?);
    run_server_with_model(config, model).await
}

/// Start the chat server with an explicit model backend instead of the
/// config-selected one. Tests inject stub models through this entry point.
pub async fn run_server_with_model(
    config: &Config,
    model: Arc<dyn ChatModel>,
) -> anyhow::Result<()> {
    migrate::run_migrations(config).await?;

    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());
    let pool = db::connect(&config).await?;
    let registry = Arc::new(IndexRegistry::new(&config)?);

    let state = AppState {
        config,
        pool,
        registry,
        model,
    };

    let app = build_router(state);

    println!("docuchat listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_chat_page).post(handle_chat_message))
        .route("/stream_chat/", post(handle_stream_chat))
        .route("/delete_chat/", post(handle_delete_chat))
        .route("/login", get(handle_login_page).post(handle_login))
        .route("/register", get(handle_register_page).post(handle_register))
        .route("/logout", post(handle_logout))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Errors ============

/// Internal error type that converts into an `{"error": ...}` JSON
/// response.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn unauthorized() -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        message: "Authentication required".to_string(),
    }
}

fn internal_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
    }
}

// ============ Sessions ============

fn session_cookie_value(headers: &HeaderMap) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in cookie_header.split(';') {
        let pair = pair.trim();
        if let Some(value) = pair.strip_prefix("session=") {
            return Some(value.to_string());
        }
    }
    None
}

async fn current_user(state: &AppState, headers: &HeaderMap) -> Option<User> {
    let value = session_cookie_value(headers)?;
    let now = chrono::Utc::now().timestamp();
    let user_id = auth::verify_session(&state.config.session.secret, &value, now)?;
    auth::find_user(&state.pool, &user_id).await.ok().flatten()
}

fn set_session_response(state: &AppState, user: &User, location: &str) -> Response {
    let expires_at = chrono::Utc::now().timestamp() + state.config.session.ttl_secs;
    let value = auth::sign_session(&state.config.session.secret, &user.id, expires_at);
    let cookie = format!(
        "session={}; Path=/; HttpOnly; Max-Age={}",
        value, state.config.session.ttl_secs
    );
    (
        StatusCode::SEE_OTHER,
        [
            (header::SET_COOKIE, cookie),
            (header::LOCATION, location.to_string()),
        ],
    )
        .into_response()
}

fn clear_session_response(location: &str) -> Response {
    (
        StatusCode::SEE_OTHER,
        [
            (
                header::SET_COOKIE,
                "session=; Path=/; HttpOnly; Max-Age=0".to_string(),
            ),
            (header::LOCATION, location.to_string()),
        ],
    )
        .into_response()
}

// ============ GET /health ============

async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============ GET / ============

async fn handle_chat_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(user) = current_user(&state, &headers).await else {
        return Redirect::to("/login").into_response();
    };

    let turns = history::list_turns(&state.pool, &user.id)
        .await
        .unwrap_or_default();
    Html(render_chat_page(&user, &turns)).into_response()
}

// ============ POST / ============

#[derive(Deserialize)]
struct ChatForm {
    message: Option<String>,
}

/// Run one chat turn and persist it. Shared by the JSON and streaming
/// endpoints.
async fn run_chat_turn(state: &AppState, user: &User, message: &str) -> Result<String, AppError> {
    let turn = agent::run_turn(
        &state.registry,
        &state.config,
        state.model.as_ref(),
        &user.id,
        message,
    )
    .await
    .map_err(|e| internal_error(format!("Chat generation failed: {}", e)))?;

    history::save_turn(&state.pool, &user.id, message, &turn.response)
        .await
        .map_err(|e| internal_error(format!("Failed to save chat: {}", e)))?;

    Ok(turn.response)
}

async fn handle_chat_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ChatForm>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = current_user(&state, &headers).await.ok_or_else(unauthorized)?;

    let message = form.message.unwrap_or_default();
    if message.trim().is_empty() {
        return Err(bad_request("No message provided"));
    }

    let response = run_chat_turn(&state, &user, &message).await?;

    Ok(Json(json!({ "message": message, "response": response })))
}

// ============ POST /stream_chat/ ============

/// The answer is computed in full by the blocking model call, then shaped
/// into `data: <word>` lines, one per whitespace-split word. This is
/// response shaping, not token streaming.
async fn handle_stream_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ChatForm>,
) -> Result<Response, AppError> {
    let user = current_user(&state, &headers).await.ok_or_else(unauthorized)?;

    let message = form.message.unwrap_or_default();
    if message.trim().is_empty() {
        return Err(bad_request("No message provided"));
    }

    let response = run_chat_turn(&state, &user, &message).await?;

    let body: String = response
        .split_whitespace()
        .map(|word| format!("data: {}\n\n", word))
        .collect();

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream".to_string()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
            (
                header::HeaderName::from_static("x-accel-buffering"),
                "no".to_string(),
            ),
        ],
        body,
    )
        .into_response())
}

// ============ POST /delete_chat/ ============

async fn handle_delete_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let user = current_user(&state, &headers).await.ok_or_else(unauthorized)?;

    history::delete_user_history(&state.pool, &user.id)
        .await
        .map_err(|e| internal_error(format!("Failed to delete chat history: {}", e)))?;

    // Best-effort: drop the cached index handle so a later chat rebuilds it.
    state.registry.evict(&user.id).await;

    Ok(StatusCode::NO_CONTENT)
}

// ============ Login / Register / Logout ============

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn handle_login_page() -> Html<String> {
    Html(render_login_page(None))
}

async fn handle_login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let user = auth::authenticate(&state.pool, &form.username, &form.password)
        .await
        .map_err(|e| internal_error(e.to_string()))?;

    match user {
        Some(user) => Ok(set_session_response(&state, &user, "/")),
        None => Ok(Html(render_login_page(Some("Invalid username or password"))).into_response()),
    }
}

#[derive(Deserialize)]
struct RegisterForm {
    username: String,
    email: String,
    password1: String,
    password2: String,
}

async fn handle_register_page() -> Html<String> {
    Html(render_register_page(None))
}

async fn handle_register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    if form.password1 != form.password2 {
        return Ok(Html(render_register_page(Some("Passwords do not match"))).into_response());
    }

    match auth::register_user(&state.pool, &form.username, &form.email, &form.password1).await {
        Ok(user) => Ok(set_session_response(&state, &user, "/")),
        Err(e) => Ok(Html(render_register_page(Some(&e.to_string()))).into_response()),
    }
}

async fn handle_logout() -> Response {
    clear_session_response("/login")
}

// ============ Page rendering ============

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_chat_page(user: &User, turns: &[ConversationTurn]) -> String {
    let mut history = String::new();
    for turn in turns {
        history.push_str(&format!(
            "<div class=\"turn\"><p class=\"message\">{}</p><p class=\"response\">{}</p></div>\n",
            html_escape(&turn.message),
            html_escape(&turn.response)
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>docuchat</title></head>
<body>
<h1>docuchat</h1>
<p>Signed in as {username}. <form method="post" action="/logout" style="display:inline"><button>Log out</button></form></p>
<div id="history">
{history}</div>
<form method="post" action="/">
  <input name="message" placeholder="Ask something..." autofocus>
  <button>Send</button>
</form>
<form method="post" action="/delete_chat/">
  <button>Delete chat history</button>
</form>
</body>
</html>
"#,
        username = html_escape(&user.username),
        history = history
    )
}

fn render_login_page(error: Option<&str>) -> String {
    let error_html = error
        .map(|e| format!("<p class=\"error\">{}</p>", html_escape(e)))
        .unwrap_or_default();
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>docuchat login</title></head>
<body>
<h1>Login</h1>
{error_html}
<form method="post" action="/login">
  <input name="username" placeholder="Username">
  <input name="password" type="password" placeholder="Password">
  <button>Log in</button>
</form>
<p>No account? <a href="/register">Register</a></p>
</body>
</html>
"#
    )
}

fn render_register_page(error: Option<&str>) -> String {
    let error_html = error
        .map(|e| format!("<p class=\"error\">{}</p>", html_escape(e)))
        .unwrap_or_default();
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>docuchat register</title></head>
<body>
<h1>Register</h1>
{error_html}
<form method="post" action="/register">
  <input name="username" placeholder="Username">
  <input name="email" placeholder="Email">
  <input name="password1" type="password" placeholder="Password">
  <input name="password2" type="password" placeholder="Confirm password">
  <button>Create account</button>
</form>
<p>Have an account? <a href="/login">Log in</a></p>
</body>
</html>
"#
    )
}
