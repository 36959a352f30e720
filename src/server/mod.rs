//! HTTP API.
//!
//! `POST /api/run_code` is the only route that touches the executor. The
//! caller's identity is checked and logged here and never reaches the
//! dispatcher.

mod auth;

pub use auth::{AuthError, AuthenticatedUser, Claims, TokenVerifier};

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRef, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::executor::{Dispatcher, ExecutionError, ExecutionResult, FailureKind, ToolchainStatus};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// Code executor
    pub dispatcher: Arc<Dispatcher>,
    /// Bearer token verifier
    pub verifier: Arc<TokenVerifier>,
    /// Toolchain probe results from startup
    pub toolchains: Arc<Vec<ToolchainStatus>>,
}

impl AppState {
    /// Create state from its parts
    #[must_use]
    pub fn new(
        dispatcher: Dispatcher,
        verifier: TokenVerifier,
        toolchains: Vec<ToolchainStatus>,
    ) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            verifier: Arc::new(verifier),
            toolchains: Arc::new(toolchains),
        }
    }
}

impl FromRef<AppState> for Arc<TokenVerifier> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.verifier)
    }
}

/// Body of `POST /api/run_code`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RunCodeRequest {
    /// Source code
    pub code: Option<String>,
    /// Language tag
    pub language: Option<String>,
}

/// Routes without middleware
#[must_use]
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/toolchains", get(toolchains))
        .route("/api/run_code", post(run_code))
        .with_state(state)
}

/// Routes with request tracing and CORS for `cors_origins`
///
/// # Errors
///
/// Fails when [`cors_layer`] rejects an origin.
pub fn create_app(state: AppState, cors_origins: &[String]) -> Result<Router> {
    Ok(create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins)?))
}

/// CORS policy allowing the given origins
///
/// # Errors
///
/// Returns an error if an origin is not a valid header value.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            origin
                .trim()
                .parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin {origin:?}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]))
}

/// Serve `app` on `listener` until Ctrl-C or SIGTERM
///
/// # Errors
///
/// Returns an error if the listener has no local address or the HTTP server
/// fails while accepting connections.
pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    let addr = listener
        .local_addr()
        .context("Failed to obtain server bind address")?;
    info!(%addr, "CodeTutor backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received");
}

async fn index() -> Json<Value> {
    Json(json!({ "message": "CodeTutor backend API" }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": crate::VERSION,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn toolchains(State(state): State<AppState>) -> Json<Vec<ToolchainStatus>> {
    Json(state.toolchains.as_ref().clone())
}

async fn run_code(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Result<Json<RunCodeRequest>, JsonRejection>,
) -> (StatusCode, Json<ExecutionResult>) {
    let result = match body {
        Ok(Json(request)) => {
            info!(
                username = %user.username,
                language = request.language.as_deref().unwrap_or(""),
                code_bytes = request.code.as_ref().map_or(0, String::len),
                "run_code request"
            );
            state
                .dispatcher
                .execute(
                    request.code.as_deref().unwrap_or_default(),
                    request.language.as_deref().unwrap_or_default(),
                )
                .await
        }
        Err(rejection) => {
            warn!(username = %user.username, error = %rejection, "malformed run_code body");
            ExecutionResult::from(ExecutionError::Validation(format!(
                "Invalid request body: {}",
                rejection.body_text()
            )))
        }
    };
    (status_for(&result), Json(result))
}

fn status_for(result: &ExecutionResult) -> StatusCode {
    match result.failure {
        Some(FailureKind::Validation | FailureKind::UnsupportedLanguage) => StatusCode::BAD_REQUEST,
        Some(FailureKind::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    }
}
