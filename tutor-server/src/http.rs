//! Tutor HTTP REST API
//!
//! Axum-based HTTP server exposing the tutoring chat cycle. Architecture:
//! each endpoint has a thin axum handler that delegates to a pure inner
//! function. The inner functions are directly testable without axum
//! dispatch machinery.
//!
//! Endpoints:
//! - GET  /health          — health check with DB / inference status
//! - GET  /version         — server version info
//! - POST /register        — create a user account
//! - POST /login           — authenticate, open a session
//! - POST /logout          — tear a session down
//! - POST /chat            — one ask/reply interaction cycle
//! - GET  /history/:token  — persisted transcript, ascending timestamps
//! - GET  /metrics/:token  — session metrics panel data

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tutor_core::generate::ResponseGenerator;
use tutor_core::models::Role;
use tutor_core::sentiment::{Sentiment, SentimentBackend};
use tutor_core::{TutorConfig, TutorError};
use uuid::Uuid;

use crate::session::SessionRegistry;
use crate::store::{credentials, transcripts};

/// Shared state for all HTTP handlers. Constructed once by the process
/// entry point; `pool: None` means demo mode (no persistence).
pub struct AppState {
    pub pool: Option<PgPool>,
    pub classifier: Arc<dyn SentimentBackend>,
    pub generator: Arc<ResponseGenerator>,
    pub sessions: SessionRegistry,
}

/// Build the Axum router with all endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/chat", post(chat_handler))
        .route("/history/:token", get(history_handler))
        .route("/metrics/:token", get(metrics_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    config: TutorConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Tutor HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub token: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub token: Uuid,
    pub message: String,
}

fn error_body(msg: impl Into<String>) -> serde_json::Value {
    serde_json::json!({
        "error": msg.into(),
        "status": "error",
    })
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check — reports DB reachability and inference configuration.
pub async fn health_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    let (status, database) = match &state.pool {
        Some(pool) => match tutor_core::db::health_check(pool).await {
            Ok(v) => (StatusCode::OK, v),
            Err(e) => {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    serde_json::json!({
                        "status": "unhealthy",
                        "error": e.to_string(),
                    }),
                );
            }
        },
        None => (StatusCode::OK, "demo mode (no persistence)".to_string()),
    };

    (
        status,
        serde_json::json!({
            "status": if state.pool.is_some() { "healthy" } else { "demo" },
            "version": env!("CARGO_PKG_VERSION"),
            "database": database,
            "demo_mode": state.pool.is_none(),
            "classifier": state.classifier.name(),
            "remote_generation": state.generator.is_remote(),
        }),
    )
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "tutor/1",
    })
}

/// Inner register — validates fields and inserts a new user.
pub async fn register_inner(
    state: &AppState,
    req: RegisterRequest,
) -> (StatusCode, serde_json::Value) {
    if req.username.trim().is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_body("username, email and password are required"),
        );
    }

    let Some(pool) = &state.pool else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            error_body("registration is unavailable in demo mode"),
        );
    };

    match credentials::register(pool, req.username.trim(), req.email.trim(), &req.password).await {
        Ok(()) => (
            StatusCode::CREATED,
            serde_json::json!({
                "status": "ok",
                "username": req.username.trim(),
            }),
        ),
        Err(TutorError::AlreadyExists(username)) => (
            StatusCode::CONFLICT,
            error_body(format!("Username already exists: {}", username)),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Registration failed");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string()))
        }
    }
}

/// Inner login — verifies credentials and opens a session. In demo mode any
/// non-empty credentials open an explicitly labeled demo session.
pub async fn login_inner(state: &AppState, req: LoginRequest) -> (StatusCode, serde_json::Value) {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_body("username and password are required"),
        );
    }

    let username = req.username.trim().to_string();

    match &state.pool {
        Some(pool) => match credentials::authenticate(pool, &username, &req.password).await {
            Ok(user) => {
                let token = state.sessions.create(&user.username).await;
                (
                    StatusCode::OK,
                    serde_json::json!({
                        "token": token,
                        "username": user.username,
                        "demo": false,
                    }),
                )
            }
            Err(TutorError::InvalidCredentials) => (
                StatusCode::UNAUTHORIZED,
                error_body("Invalid username or password"),
            ),
            Err(e) => {
                tracing::error!(error = %e, "Login failed");
                (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string()))
            }
        },
        None => {
            let token = state.sessions.create(&username).await;
            (
                StatusCode::OK,
                serde_json::json!({
                    "token": token,
                    "username": username,
                    "demo": true,
                }),
            )
        }
    }
}

/// Inner logout — removes the session.
pub async fn logout_inner(state: &AppState, req: LogoutRequest) -> (StatusCode, serde_json::Value) {
    let removed = state.sessions.remove(&req.token).await;
    (
        StatusCode::OK,
        serde_json::json!({
            "status": "ok",
            "removed": removed,
        }),
    )
}

/// Inner chat — one full interaction cycle:
/// classify input → generate reply → classify reply → persist → update
/// aggregates → return the re-render payload. Remote failures degrade to
/// fallbacks; a store failure is reported but never rolls anything back.
pub async fn chat_inner(state: &AppState, req: ChatRequest) -> (StatusCode, serde_json::Value) {
    let Some(username) = state.sessions.username_for(&req.token).await else {
        return (StatusCode::UNAUTHORIZED, error_body("Not logged in"));
    };

    let message = req.message.trim();
    if message.is_empty() {
        // No side effects for empty input: no writes, no aggregate change.
        return (StatusCode::BAD_REQUEST, error_body("message must not be empty"));
    }

    let sentiment = classify_or_neutral(state.classifier.as_ref(), message).await;

    let prior = state
        .sessions
        .apply(&req.token, |s| s.total_interactions)
        .await
        .unwrap_or(0);
    let context = format!("Previous interactions: {}", prior);
    let reply = state.generator.generate(message, &context).await;

    // Reply sentiment is display-only; it never feeds the running mean.
    let reply_sentiment = classify_or_neutral(state.classifier.as_ref(), &reply).await;

    let mut persisted = false;
    let mut warning = None;
    if let Some(pool) = &state.pool {
        match persist_interaction(pool, &username, message, sentiment, &reply, reply_sentiment)
            .await
        {
            Ok(()) => persisted = true,
            Err(e) => {
                tracing::error!(error = %e, "Failed to save interaction");
                warning = Some(format!("Interaction was not saved: {}", e));
            }
        }
    }

    let rendered = state
        .sessions
        .apply(&req.token, |s| {
            s.push_entry(Role::User, message, Some(sentiment));
            s.push_entry(Role::Assistant, &reply, Some(reply_sentiment));
            s.record_interaction(sentiment.score);
            (s.metrics(Utc::now()), s.transcript.clone())
        })
        .await;

    let Some((metrics, transcript)) = rendered else {
        // Session torn down between the auth check and the update.
        return (StatusCode::UNAUTHORIZED, error_body("Not logged in"));
    };

    (
        StatusCode::OK,
        serde_json::json!({
            "reply": reply,
            "sentiment": sentiment,
            "reply_sentiment": reply_sentiment,
            "persisted": persisted,
            "warning": warning,
            "metrics": metrics,
            "transcript": transcript,
        }),
    )
}

/// Inner history — the persisted transcript, or the in-memory one in demo
/// mode.
pub async fn history_inner(state: &AppState, token: Uuid) -> (StatusCode, serde_json::Value) {
    let Some(username) = state.sessions.username_for(&token).await else {
        return (StatusCode::UNAUTHORIZED, error_body("Not logged in"));
    };

    match &state.pool {
        Some(pool) => match transcripts::load(pool, &username).await {
            Ok(messages) => {
                let count = messages.len();
                (
                    StatusCode::OK,
                    serde_json::json!({
                        "messages": messages,
                        "count": count,
                        "demo": false,
                    }),
                )
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load transcript");
                (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string()))
            }
        },
        None => {
            let transcript = state
                .sessions
                .apply(&token, |s| s.transcript.clone())
                .await
                .unwrap_or_default();
            let count = transcript.len();
            (
                StatusCode::OK,
                serde_json::json!({
                    "messages": transcript,
                    "count": count,
                    "demo": true,
                }),
            )
        }
    }
}

/// Inner metrics — the read-only metrics panel payload.
pub async fn metrics_inner(state: &AppState, token: Uuid) -> (StatusCode, serde_json::Value) {
    match state.sessions.apply(&token, |s| s.metrics(Utc::now())).await {
        Some(metrics) => (
            StatusCode::OK,
            serde_json::to_value(metrics).unwrap_or_default(),
        ),
        None => (StatusCode::UNAUTHORIZED, error_body("Not logged in")),
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Classification never blocks the cycle: any backend error degrades to
/// neutral. The fallback backend already absorbs remote failures; this guard
/// covers backends without one.
async fn classify_or_neutral(classifier: &dyn SentimentBackend, text: &str) -> Sentiment {
    match classifier.classify(text).await {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "Classification failed — treating message as neutral");
            Sentiment::neutral()
        }
    }
}

/// Persist one ask/reply pair. Two appends, each itself two non-atomic
/// writes; the first failure stops the sequence and surfaces as a warning.
async fn persist_interaction(
    pool: &PgPool,
    username: &str,
    message: &str,
    sentiment: Sentiment,
    reply: &str,
    reply_sentiment: Sentiment,
) -> Result<(), TutorError> {
    transcripts::append(pool, username, Role::User, message, Some(sentiment)).await?;
    transcripts::append(pool, username, Role::Assistant, reply, Some(reply_sentiment)).await?;
    Ok(())
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> impl IntoResponse {
    let (status, body) = register_inner(&state, req).await;
    (status, Json(body))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let (status, body) = login_inner(&state, req).await;
    (status, Json(body))
}

pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LogoutRequest>,
) -> impl IntoResponse {
    let (status, body) = logout_inner(&state, req).await;
    (status, Json(body))
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    let (status, body) = chat_inner(&state, req).await;
    (status, Json(body))
}

pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = history_inner(&state, token).await;
    (status, Json(body))
}

pub async fn metrics_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = metrics_inner(&state, token).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests — inner functions in demo mode need no database
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_core::sentiment::{FallbackSentimentClient, LEXICON_POSITIVE_SCORE};

    fn demo_state() -> AppState {
        AppState {
            pool: None,
            classifier: Arc::new(FallbackSentimentClient::new(None)),
            generator: Arc::new(ResponseGenerator::new(None)),
            sessions: SessionRegistry::new(),
        }
    }

    async fn demo_login(state: &AppState, username: &str) -> Uuid {
        let (status, body) = login_inner(
            state,
            LoginRequest {
                username: username.to_string(),
                password: "irrelevant".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["demo"], true);
        body["token"].as_str().unwrap().parse().unwrap()
    }

    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string());
        assert_eq!(v["protocol"], "tutor/1");
    }

    #[tokio::test]
    async fn test_health_inner_demo_mode() {
        let state = demo_state();
        let (status, body) = health_inner(&state).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "demo");
        assert_eq!(body["demo_mode"], true);
        assert_eq!(body["remote_generation"], false);
    }

    #[tokio::test]
    async fn test_register_unavailable_in_demo_mode() {
        let state = demo_state();
        let (status, body) = register_inner(
            &state,
            RegisterRequest {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password: "pw".into(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_register_rejects_empty_fields() {
        let state = demo_state();
        let (status, _) = register_inner(
            &state,
            RegisterRequest {
                username: "  ".into(),
                email: "a@b".into(),
                password: "pw".into(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_rejects_empty_fields() {
        let state = demo_state();
        let (status, _) = login_inner(
            &state,
            LoginRequest {
                username: "alice".into(),
                password: "".into(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_requires_session() {
        let state = demo_state();
        let (status, _) = chat_inner(
            &state,
            ChatRequest {
                token: Uuid::new_v4(),
                message: "hello".into(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_chat_rejects_whitespace_input_without_side_effects() {
        let state = demo_state();
        let token = demo_login(&state, "alice").await;

        let (status, _) = chat_inner(
            &state,
            ChatRequest {
                token,
                message: "   \n\t ".into(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, metrics) = metrics_inner(&state, token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(metrics["total_interactions"], 0);
        assert_eq!(metrics["avg_sentiment"], 0.5);
    }

    #[tokio::test]
    async fn test_chat_cycle_grows_transcript_by_two() {
        let state = demo_state();
        let token = demo_login(&state, "alice").await;

        let (status, body) = chat_inner(
            &state,
            ChatRequest {
                token,
                message: "I love this, it's great and amazing".into(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body["reply"].as_str().unwrap().is_empty());
        assert_eq!(body["persisted"], false);
        assert_eq!(body["transcript"].as_array().unwrap().len(), 2);
        assert_eq!(body["sentiment"]["label"], "Positive");
        assert_eq!(body["metrics"]["total_interactions"], 1);
        // With a single interaction the running mean equals the input score.
        assert_eq!(
            body["metrics"]["avg_sentiment"].as_f64().unwrap(),
            LEXICON_POSITIVE_SCORE
        );
    }

    #[tokio::test]
    async fn test_running_mean_across_cycles() {
        let state = demo_state();
        let token = demo_login(&state, "alice").await;

        // Positive (0.7) then negative (0.3): mean is 0.5 after two cycles.
        for message in ["this is great", "this is terrible"] {
            let (status, _) = chat_inner(
                &state,
                ChatRequest {
                    token,
                    message: message.into(),
                },
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (_, metrics) = metrics_inner(&state, token).await;
        assert_eq!(metrics["total_interactions"], 2);
        assert!((metrics["avg_sentiment"].as_f64().unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(metrics["trend"].as_array().unwrap().len(), 2);
        assert_eq!(metrics["distribution"]["positive"], 1);
        assert_eq!(metrics["distribution"]["negative"], 1);
    }

    #[tokio::test]
    async fn test_history_demo_serves_in_memory_transcript() {
        let state = demo_state();
        let token = demo_login(&state, "alice").await;

        chat_inner(
            &state,
            ChatRequest {
                token,
                message: "tell me about fractions".into(),
            },
        )
        .await;

        let (status, body) = history_inner(&state, token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["demo"], true);
        assert_eq!(body["count"], 2);
    }

    #[tokio::test]
    async fn test_logout_tears_down_session() {
        let state = demo_state();
        let token = demo_login(&state, "alice").await;

        let (status, body) = logout_inner(&state, LogoutRequest { token }).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], true);

        let (status, _) = chat_inner(
            &state,
            ChatRequest {
                token,
                message: "still there?".into(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_metrics_requires_session() {
        let state = demo_state();
        let (status, _) = metrics_inner(&state, Uuid::new_v4()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
