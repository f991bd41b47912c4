use crate::backend::Backend;
use crate::config::GatewayConfig;
use crate::dispatch::{self, DispatchOutcome};
use crate::error::GatewayError;
use crate::health::HealthReport;
use crate::journal::SharedJournal;
use crate::translate::response::render_error;
use crate::translate::WireStyle;

use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub struct AppState {
    pub config: GatewayConfig,
    pub backend: Backend,
    pub journal: SharedJournal,
    pub api_key_configured: bool,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(handle_health))
        .route("/v1/messages", post(handle_messages))
        .route("/v1/chat/completions", post(handle_chat_completions))
        .route("/v1/models", get(handle_models));

    if state.config.image_output() {
        router = router.route("/generate", post(handle_generate));
    }

    router
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_messages(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Response {
    match body {
        Ok(body) => into_response(dispatch::dispatch(&state, WireStyle::Anthropic, &body).await),
        Err(rejection) => rejected(WireStyle::Anthropic, rejection),
    }
}

async fn handle_chat_completions(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Response {
    match body {
        Ok(body) => into_response(dispatch::dispatch(&state, WireStyle::OpenAi, &body).await),
        Err(rejection) => rejected(WireStyle::OpenAi, rejection),
    }
}

async fn handle_generate(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Response {
    match body {
        Ok(body) => into_response(dispatch::dispatch_generate(&state, &body).await),
        Err(rejection) => rejected(WireStyle::Anthropic, rejection),
    }
}

/// Body that could not be read (e.g. over the size limit), answered in the
/// caller's envelope with the rejection's status.
fn rejected(style: WireStyle, rejection: BytesRejection) -> Response {
    let err = GatewayError::invalid_request(rejection.body_text());
    warn!(status = rejection.status().as_u16(), error = %err, "Unreadable request body");
    into_response(DispatchOutcome::Error(
        render_error(style, &err),
        rejection.status().as_u16(),
    ))
}

fn into_response(outcome: DispatchOutcome) -> Response {
    match outcome {
        DispatchOutcome::Success(body) => Json(body).into_response(),
        DispatchOutcome::Error(body, status_code) => {
            let status =
                StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(body)).into_response()
        }
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(HealthReport::from_config(
        &state.config,
        state.api_key_configured,
    ))
}

async fn handle_models(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "object": "list",
        "data": [{
            "id": state.config.model,
            "object": "model",
            "owned_by": state.config.instance,
        }],
    }))
}
