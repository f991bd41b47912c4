use super::anthropic_types::{
    ErrorResponse, ImageAttachment, MessagesResponse, ResponseContentBlock, Usage,
};
use super::gemini_types::GenerateContentResponse;
use super::neutral::{BackendResult, FinishReason, InlineImage};
use super::openai_types::{ChatCompletionResponse, ChatErrorResponse, ChatUsage, Choice, ChoiceMessage};
use super::WireStyle;
use crate::error::{ErrorKind, GatewayError};

use chrono::Utc;

/// Render a backend result as an Anthropic Messages response.
/// Pure function apart from the timestamp used when there is no session id.
pub fn to_anthropic(result: &BackendResult, model: &str) -> MessagesResponse {
    let id = match result.session_id {
        Some(ref session) => format!("msg_{session}"),
        None => format!("msg-{}", Utc::now().timestamp_millis()),
    };

    let images = (!result.images.is_empty()).then(|| {
        result
            .images
            .iter()
            .map(|img| ImageAttachment {
                mime_type: img.mime_type.clone(),
                data: img.data_url(),
            })
            .collect()
    });

    MessagesResponse {
        id,
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        content: vec![ResponseContentBlock::Text {
            text: result.text_with_images(),
        }],
        model: model.to_string(),
        stop_reason: Some(result.finish_reason.anthropic_stop_reason().to_string()),
        stop_sequence: None,
        usage: Usage {
            input_tokens: result.input_tokens,
            output_tokens: result.output_tokens,
        },
        images,
    }
}

/// Render a backend result as an OpenAI Chat Completion response.
pub fn to_openai(result: &BackendResult, model: &str) -> ChatCompletionResponse {
    let now = Utc::now();
    let id = match result.session_id {
        Some(ref session) => format!("chatcmpl-{session}"),
        None => format!("chatcmpl-{}", now.timestamp_millis()),
    };

    ChatCompletionResponse {
        id,
        object: "chat.completion".to_string(),
        created: now.timestamp(),
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: "assistant".to_string(),
                content: result.text_with_images(),
            },
            finish_reason: result.finish_reason.openai_finish_reason().to_string(),
        }],
        usage: ChatUsage {
            prompt_tokens: result.input_tokens,
            completion_tokens: result.output_tokens,
            total_tokens: result.input_tokens.saturating_add(result.output_tokens),
        },
    }
}

/// Read the first candidate of a `generateContent` response.
pub fn gemini_to_result(resp: &GenerateContentResponse) -> BackendResult {
    let candidate = resp.candidates.first();

    let mut text = String::new();
    let mut images = Vec::new();

    if let Some(content) = candidate.and_then(|c| c.content.as_ref()) {
        for part in &content.parts {
            if let Some(ref t) = part.text {
                text.push_str(t);
            }
            if let Some(ref inline) = part.inline_data {
                images.push(InlineImage {
                    mime_type: inline
                        .mime_type
                        .clone()
                        .unwrap_or_else(|| "image/png".to_string()),
                    base64_data: inline.data.clone(),
                });
            }
        }
    }

    let usage = resp.usage_metadata.clone().unwrap_or_default();

    BackendResult {
        text,
        images,
        finish_reason: FinishReason::from_gemini(
            candidate.and_then(|c| c.finish_reason.as_deref()),
        ),
        input_tokens: usage.prompt_token_count.unwrap_or(0),
        output_tokens: usage.candidates_token_count.unwrap_or(0),
        session_id: None,
    }
}

/// Read text, finish reason and usage back out of an Anthropic response.
pub fn anthropic_to_result(resp: &MessagesResponse) -> BackendResult {
    BackendResult {
        text: resp.text(),
        images: Vec::new(),
        finish_reason: resp
            .stop_reason
            .as_deref()
            .map_or(FinishReason::Other, FinishReason::from_anthropic_stop_reason),
        input_tokens: resp.usage.input_tokens,
        output_tokens: resp.usage.output_tokens,
        session_id: resp.id.strip_prefix("msg_").map(str::to_string),
    }
}

fn error_type(err: &GatewayError) -> &'static str {
    match err.kind() {
        ErrorKind::InvalidRequest => "invalid_request_error",
        ErrorKind::BackendTimeout => "timeout_error",
        ErrorKind::UpstreamHttpError if err.upstream_status() == Some(429) => "rate_limit_error",
        _ => "api_error",
    }
}

/// Translate a gateway error into the Anthropic error envelope.
pub fn error_to_anthropic(err: &GatewayError) -> ErrorResponse {
    ErrorResponse::new(error_type(err), err.message())
}

/// Translate a gateway error into the OpenAI error envelope.
pub fn error_to_openai(err: &GatewayError) -> ChatErrorResponse {
    ChatErrorResponse::new(error_type(err), err.message())
}

/// Render a gateway error in the caller's wire style.
pub fn render_error(style: WireStyle, err: &GatewayError) -> serde_json::Value {
    let rendered = match style {
        WireStyle::Anthropic => serde_json::to_value(error_to_anthropic(err)),
        WireStyle::OpenAi => serde_json::to_value(error_to_openai(err)),
    };
    rendered.unwrap_or_else(|_| serde_json::json!({ "error": { "message": err.message() } }))
}
