//! Request pipeline shared by every completion endpoint.
//!
//! `Received → Validated → Translated → Invoked → Formatted`. Each request is
//! handled independently; the only shared state touched is the journal.

use crate::backend::Invoker;
use crate::error::{GatewayError, Result};
use crate::journal::RequestRecord;
use crate::server::AppState;
use crate::translate::anthropic_types::GenerateRequest;
use crate::translate::neutral::{BackendResult, NormalizedRequest};
use crate::translate::request::{generate_to_inbound, normalize, normalize_body};
use crate::translate::response::{render_error, to_anthropic, to_openai};
use crate::translate::WireStyle;

use serde_json::Value;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Outcome of handling one completion request.
#[derive(Debug)]
pub enum DispatchOutcome {
    Success(Value),
    Error(Value, u16),
}

impl DispatchOutcome {
    pub fn status(&self) -> u16 {
        match self {
            DispatchOutcome::Success(_) => 200,
            DispatchOutcome::Error(_, status) => *status,
        }
    }

    pub fn body(&self) -> &Value {
        match self {
            DispatchOutcome::Success(body) | DispatchOutcome::Error(body, _) => body,
        }
    }
}

/// Handle a `/v1/messages` or `/v1/chat/completions` body.
pub async fn dispatch(state: &AppState, style: WireStyle, body: &[u8]) -> DispatchOutcome {
    handle(state, style, || normalize_body(body, &state.config.model)).await
}

/// Handle a `/generate` body. Always answered in the Anthropic style.
pub async fn dispatch_generate(state: &AppState, body: &[u8]) -> DispatchOutcome {
    handle(state, WireStyle::Anthropic, || {
        let req: GenerateRequest = serde_json::from_slice(body)
            .map_err(|e| GatewayError::invalid_request(format!("Invalid request body: {e}")))?;
        normalize(&generate_to_inbound(&req)?, &state.config.model)
    })
    .await
}

async fn handle<F>(state: &AppState, style: WireStyle, validate: F) -> DispatchOutcome
where
    F: FnOnce() -> Result<NormalizedRequest>,
{
    let request_id = Uuid::new_v4().to_string();
    let span = info_span!("request", request_id = %request_id, style = style.as_str());
    let started = Instant::now();

    let (model, outcome) = async {
        let req = match validate() {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "Rejected request");
                return (state.config.model.clone(), Err(e));
            }
        };

        let model = state.backend.effective_model(&req.model);
        info!(model = %model, turns = req.turns.len(), max_tokens = req.max_output_tokens, "Dispatching");

        let result = state.backend.invoke(&req).await;
        (model, result)
    }
    .instrument(span.clone())
    .await;

    let mut record = RequestRecord::new(&request_id, style, &model);
    record.latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    if let Ok(ref result) = outcome {
        record.input_tokens = result.input_tokens;
        record.output_tokens = result.output_tokens;
    }

    let formatted = outcome.and_then(|result| format_success(style, &result, &model));
    let response = match formatted {
        Ok(body) => {
            span.in_scope(|| info!(latency_ms = record.latency_ms, "Completed"));
            DispatchOutcome::Success(body)
        }
        Err(e) => {
            let status = e.status_code();
            span.in_scope(|| warn!(status, kind = ?e.kind(), error = %e, "Request failed"));
            record.error = Some(e.message());
            DispatchOutcome::Error(render_error(style, &e), status)
        }
    };

    record.status = response.status();
    let journal = state.journal.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || journal.record(record)).await {
        warn!(error = %e, "Request journal append did not complete");
    }
    response
}

fn format_success(style: WireStyle, result: &BackendResult, model: &str) -> Result<Value> {
    let body = match style {
        WireStyle::Anthropic => serde_json::to_value(to_anthropic(result, model)),
        WireStyle::OpenAi => serde_json::to_value(to_openai(result, model)),
    };
    body.map_err(|e| GatewayError::malformed(format!("Failed to serialize response: {e}")))
}
