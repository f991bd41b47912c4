//! Inbound translation: wire-format request bodies into a [`NormalizedRequest`],
//! and a [`NormalizedRequest`] into the shapes each backend consumes.
//!
//! The same rules apply to both wire styles, so an OpenAI-style request that
//! embeds its system prompt in `messages` normalizes identically to an
//! Anthropic-style request that uses the dedicated `system` field.

use super::anthropic_types::{GenerateRequest, InboundMessage, InboundRequest};
use super::gemini_types::{Content, GenerateContentRequest, GenerationConfig, Part};
use super::neutral::{ChatTurn, NormalizedRequest, TurnRole};
use crate::error::{GatewayError, Result};

pub const DEFAULT_MAX_TOKENS: u32 = 8192;
pub const DEFAULT_TEMPERATURE: f64 = 1.0;

/// Parse a raw request body and normalize it.
pub fn normalize_body(body: &[u8], default_model: &str) -> Result<NormalizedRequest> {
    let req: InboundRequest = serde_json::from_slice(body)
        .map_err(|e| GatewayError::invalid_request(format!("Invalid request body: {e}")))?;
    normalize(&req, default_model)
}

/// Normalize an inbound request of either wire style.
pub fn normalize(req: &InboundRequest, default_model: &str) -> Result<NormalizedRequest> {
    let raw_messages = match req.messages {
        Some(serde_json::Value::Array(ref items)) => items,
        Some(_) => {
            return Err(GatewayError::invalid_request(
                "messages must be an array",
            ))
        }
        None => return Err(GatewayError::invalid_request("messages is required")),
    };

    let mut system_instruction = req.system.as_ref().map(|s| s.as_text());
    let mut turns = Vec::with_capacity(raw_messages.len());

    for (index, raw) in raw_messages.iter().enumerate() {
        let msg: InboundMessage = serde_json::from_value(raw.clone()).map_err(|e| {
            GatewayError::invalid_request(format!("messages[{index}] is invalid: {e}"))
        })?;

        let text = msg
            .content
            .as_ref()
            .map(|c| c.as_text())
            .unwrap_or_default();

        match msg.role.as_str() {
            "system" => system_instruction = Some(text),
            "assistant" => turns.push(ChatTurn::assistant(text)),
            _ => turns.push(ChatTurn::user(text)),
        }
    }

    let system_instruction = system_instruction.filter(|s| !s.trim().is_empty());

    if turns.is_empty() {
        return Err(GatewayError::invalid_request(
            "messages must contain at least one user or assistant message",
        ));
    }

    let max_output_tokens = req
        .max_tokens
        .filter(|n| *n > 0)
        .map_or(DEFAULT_MAX_TOKENS, |n| u32::try_from(n).unwrap_or(u32::MAX));

    let model = req
        .model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(default_model)
        .to_string();

    Ok(NormalizedRequest {
        system_instruction,
        turns,
        max_output_tokens,
        temperature: req.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        model,
    })
}

/// Rewrite a `/generate` body into a regular inbound request.
pub fn generate_to_inbound(req: &GenerateRequest) -> Result<InboundRequest> {
    let prompt = req
        .prompt
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| GatewayError::invalid_request("prompt is required"))?;

    let mut messages = Vec::with_capacity(2);
    if let Some(ref system) = req.system {
        messages.push(serde_json::json!({ "role": "system", "content": system }));
    }
    messages.push(serde_json::json!({ "role": "user", "content": prompt }));

    Ok(InboundRequest {
        messages: Some(serde_json::Value::Array(messages)),
        ..InboundRequest::default()
    })
}

/// Build the `generateContent` body for a normalized request.
pub fn to_gemini(req: &NormalizedRequest, image_output: bool) -> GenerateContentRequest {
    let contents = req
        .turns
        .iter()
        .map(|turn| Content {
            role: Some(
                match turn.role {
                    TurnRole::Assistant => "model",
                    TurnRole::User => "user",
                }
                .to_string(),
            ),
            parts: vec![Part::text(turn.text.clone())],
        })
        .collect();

    let system_instruction = req.system_instruction.as_ref().map(|s| Content {
        role: None,
        parts: vec![Part::text(s.clone())],
    });

    let response_modalities =
        image_output.then(|| vec!["TEXT".to_string(), "IMAGE".to_string()]);

    GenerateContentRequest {
        contents,
        system_instruction,
        generation_config: GenerationConfig {
            max_output_tokens: req.max_output_tokens,
            temperature: Some(req.temperature),
            response_modalities,
        },
    }
}

/// Flatten turns into the single prompt string handed to the CLI tool.
pub fn to_cli_prompt(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                TurnRole::Assistant => "Assistant",
                TurnRole::User => "Human",
            };
            format!("{speaker}: {}", turn.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: serde_json::Value) -> Result<NormalizedRequest> {
        normalize_body(body.to_string().as_bytes(), "default-model")
    }

    #[test]
    fn test_system_field_and_system_message_normalize_identically() {
        let anthropic = parse(json!({
            "model": "opus",
            "system": "Be brief.",
            "max_tokens": 100,
            "messages": [
                {"role": "user", "content": [{"type": "text", "text": "Hi"}]},
                {"role": "assistant", "content": "Hello"},
                {"role": "user", "content": "Bye"}
            ]
        }))
        .unwrap();

        let openai = parse(json!({
            "model": "opus",
            "max_tokens": 100,
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": "Hello"},
                {"role": "user", "content": "Bye"}
            ]
        }))
        .unwrap();

        assert_eq!(anthropic, openai);
        assert_eq!(anthropic.turns.len(), 3);
    }

    #[test]
    fn test_system_plus_one_user_message() {
        let req = parse(json!({
            "messages": [
                {"role": "system", "content": "You are terse."},
                {"role": "user", "content": "Hello"}
            ]
        }))
        .unwrap();

        assert_eq!(req.system_instruction.as_deref(), Some("You are terse."));
        assert_eq!(req.turns, vec![ChatTurn::user("Hello")]);
    }

    #[test]
    fn test_last_system_message_wins() {
        let req = parse(json!({
            "system": "first",
            "messages": [
                {"role": "system", "content": "second"},
                {"role": "user", "content": "Hello"},
                {"role": "system", "content": "third"}
            ]
        }))
        .unwrap();

        assert_eq!(req.system_instruction.as_deref(), Some("third"));
        assert_eq!(req.turns.len(), 1);
    }

    #[test]
    fn test_defaults() {
        let req = parse(json!({ "messages": [{"role": "user", "content": "Hi"}] })).unwrap();

        assert_eq!(req.max_output_tokens, 8192);
        assert!((req.temperature - 1.0).abs() < f64::EPSILON);
        assert_eq!(req.model, "default-model");
        assert_eq!(req.system_instruction, None);
    }

    #[test]
    fn test_empty_system_is_dropped() {
        let req = parse(json!({
            "system": "",
            "messages": [{"role": "user", "content": "Hi"}]
        }))
        .unwrap();
        assert_eq!(req.system_instruction, None);

        let req = parse(json!({
            "messages": [
                {"role": "system", "content": "  "},
                {"role": "user", "content": "Hi"}
            ]
        }))
        .unwrap();
        assert_eq!(req.system_instruction, None);
        assert!(to_gemini(&req, false).system_instruction.is_none());
    }

    #[test]
    fn test_stream_flag_is_ignored() {
        let req = parse(json!({
            "stream": true,
            "messages": [{"role": "user", "content": "Hi"}]
        }))
        .unwrap();
        assert_eq!(req.turns, vec![ChatTurn::user("Hi")]);
    }

    #[test]
    fn test_non_positive_max_tokens_uses_default() {
        let req = parse(json!({
            "max_tokens": 0,
            "model": "",
            "messages": [{"role": "user", "content": "Hi"}]
        }))
        .unwrap();
        assert_eq!(req.max_output_tokens, 8192);
        assert_eq!(req.model, "default-model");

        let req = parse(json!({
            "max_tokens": -5,
            "messages": [{"role": "user", "content": "Hi"}]
        }))
        .unwrap();
        assert_eq!(req.max_output_tokens, 8192);
    }

    #[test]
    fn test_unknown_roles_become_user_turns() {
        let req = parse(json!({
            "messages": [
                {"role": "tool", "content": "result"},
                {"content": "no role"},
                {"role": "assistant", "content": "ok"}
            ]
        }))
        .unwrap();

        assert_eq!(
            req.turns,
            vec![
                ChatTurn::user("result"),
                ChatTurn::user("no role"),
                ChatTurn::assistant("ok"),
            ]
        );
    }

    #[test]
    fn test_blocks_without_text_contribute_nothing() {
        let req = parse(json!({
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "first"},
                    {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "xx"}},
                    {"type": "text", "text": "second"}
                ]
            }]
        }))
        .unwrap();

        assert_eq!(req.turns[0].text, "first\nsecond");
    }

    #[test]
    fn test_missing_or_invalid_messages_rejected() {
        let err = parse(json!({ "model": "x" })).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest { .. }));

        let err = parse(json!({ "messages": "hello" })).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest { .. }));

        let err = normalize_body(b"not json", "m").unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest { .. }));
    }

    #[test]
    fn test_only_system_messages_rejected() {
        let err = parse(json!({
            "messages": [{"role": "system", "content": "alone"}]
        }))
        .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest { .. }));
    }

    #[test]
    fn test_generate_with_system() {
        let inbound = generate_to_inbound(&GenerateRequest {
            prompt: Some("a red fox".to_string()),
            system: Some("You draw.".to_string()),
        })
        .unwrap();
        let req = normalize(&inbound, "img-model").unwrap();

        assert_eq!(req.system_instruction.as_deref(), Some("You draw."));
        assert_eq!(req.turns, vec![ChatTurn::user("a red fox")]);
        assert_eq!(req.model, "img-model");
    }

    #[test]
    fn test_generate_requires_prompt() {
        let err = generate_to_inbound(&GenerateRequest::default()).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest { .. }));
    }

    #[test]
    fn test_to_gemini_roles_and_config() {
        let req = NormalizedRequest {
            system_instruction: Some("sys".to_string()),
            turns: vec![ChatTurn::user("Hi"), ChatTurn::assistant("Hello")],
            max_output_tokens: 256,
            temperature: 0.5,
            model: "gemini-3-pro".to_string(),
        };

        let body = serde_json::to_value(to_gemini(&req, false)).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [
                    {"role": "user", "parts": [{"text": "Hi"}]},
                    {"role": "model", "parts": [{"text": "Hello"}]}
                ],
                "systemInstruction": {"parts": [{"text": "sys"}]},
                "generationConfig": {"maxOutputTokens": 256, "temperature": 0.5}
            })
        );

        let body = serde_json::to_value(to_gemini(&req, true)).unwrap();
        assert_eq!(
            body["generationConfig"]["responseModalities"],
            json!(["TEXT", "IMAGE"])
        );
    }

    #[test]
    fn test_cli_prompt_rendering() {
        let prompt = to_cli_prompt(&[
            ChatTurn::user("What is 2+2?"),
            ChatTurn::assistant("4"),
            ChatTurn::user("And 3+3?"),
        ]);
        assert_eq!(
            prompt,
            "Human: What is 2+2?\n\nAssistant: 4\n\nHuman: And 3+3?"
        );
    }
}
