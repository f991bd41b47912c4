//! Remote API strategy: one `generateContent` POST per request.

use super::{truncate, Invoker};
use crate::config::RemoteConfig;
use crate::error::{GatewayError, Result};
use crate::translate::gemini_types::{GeminiErrorResponse, GenerateContentResponse};
use crate::translate::neutral::{BackendResult, NormalizedRequest};
use crate::translate::request::to_gemini;
use crate::translate::response::gemini_to_result;

use std::time::Duration;
use tracing::{debug, info, warn};

pub const REMOTE_TIMEOUT: Duration = Duration::from_secs(120);

/// Which model name the outbound call uses.
///
/// `Pinned` is a deliberate, centralized model policy: coordination instances
/// answer every request with their configured model, whatever the caller
/// asked for, and report that model back in the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelPolicy {
    Requested,
    Pinned(String),
}

impl ModelPolicy {
    pub fn resolve(&self, requested: &str) -> String {
        match self {
            ModelPolicy::Requested => requested.to_string(),
            ModelPolicy::Pinned(model) => model.clone(),
        }
    }
}

pub struct RemoteBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    policy: ModelPolicy,
    image_output: bool,
    timeout: Duration,
}

impl RemoteBackend {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        policy: ModelPolicy,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            policy,
            image_output: false,
            timeout: REMOTE_TIMEOUT,
        }
    }

    pub fn from_config(
        config: &RemoteConfig,
        default_model: &str,
        api_key: String,
        client: reqwest::Client,
    ) -> Self {
        let policy = if config.pin_model {
            ModelPolicy::Pinned(default_model.to_string())
        } else {
            ModelPolicy::Requested
        };

        Self::new(client, config.base_url.clone(), api_key, policy)
            .with_image_output(config.image_output)
    }

    #[must_use]
    pub fn with_image_output(mut self, image_output: bool) -> Self {
        self.image_output = image_output;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, model: &str) -> Result<String> {
        Ok(format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model_path_segment(model)?
        ))
    }
}

/// Model id as it appears in the request path, without any `models/` prefix.
/// Only `[A-Za-z0-9._-]` is accepted.
fn model_path_segment(model: &str) -> Result<&str> {
    let id = model.strip_prefix("models/").unwrap_or(model);
    let valid = !id.is_empty()
        && !id.chars().all(|c| c == '.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if valid {
        Ok(id)
    } else {
        Err(GatewayError::invalid_request(format!(
            "Invalid model name: '{model}'"
        )))
    }
}

impl Invoker for RemoteBackend {
    fn effective_model(&self, requested: &str) -> String {
        self.policy.resolve(requested)
    }

    async fn invoke(&self, req: &NormalizedRequest) -> Result<BackendResult> {
        let model = self.effective_model(&req.model);
        if model != req.model {
            debug!(requested = %req.model, pinned = %model, "Pinned model overrides requested model");
        }

        let url = self.endpoint(&model)?;
        let body = to_gemini(req, self.image_output);

        info!(model = %model, turns = req.turns.len(), image_output = self.image_output, "Calling generative-language API");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::upstream(
                        None,
                        format!("Upstream request timed out after {}s", self.timeout.as_secs()),
                    )
                } else {
                    GatewayError::upstream(None, format!("Upstream request failed: {e}"))
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            GatewayError::upstream(None, format!("Failed to read upstream response: {e}"))
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<GeminiErrorResponse>(&text)
                .ok()
                .map(|e| e.error.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| {
                    format!(
                        "Upstream returned status {}: {}",
                        status.as_u16(),
                        truncate(&text, 500)
                    )
                });
            warn!(status = status.as_u16(), message = %message, "Upstream error");
            return Err(GatewayError::upstream(Some(status.as_u16()), message));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text).map_err(|e| {
            GatewayError::malformed(format!(
                "Failed to parse upstream response: {}. Body: {}",
                e,
                truncate(&text, 300)
            ))
        })?;

        let result = gemini_to_result(&parsed);

        info!(
            text_len = result.text.len(),
            images = result.images.len(),
            input_tokens = result.input_tokens,
            output_tokens = result.output_tokens,
            "Upstream completed"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::neutral::{ChatTurn, FinishReason};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(model: &str) -> NormalizedRequest {
        NormalizedRequest {
            system_instruction: Some("Be brief.".to_string()),
            turns: vec![ChatTurn::user("Hello")],
            max_output_tokens: 8192,
            temperature: 1.0,
            model: model.to_string(),
        }
    }

    fn backend(server: &MockServer, policy: ModelPolicy) -> RemoteBackend {
        RemoteBackend::new(reqwest::Client::new(), server.uri(), "test-key", policy)
    }

    #[test]
    fn test_model_policy() {
        assert_eq!(ModelPolicy::Requested.resolve("gemini-3-pro"), "gemini-3-pro");
        assert_eq!(
            ModelPolicy::Pinned("gemini-flash".to_string()).resolve("claude-opus"),
            "gemini-flash"
        );
    }

    #[test]
    fn test_model_path_segment() {
        assert_eq!(model_path_segment("gemini-3-pro").unwrap(), "gemini-3-pro");
        assert_eq!(model_path_segment("models/gemini-3-pro").unwrap(), "gemini-3-pro");
        assert_eq!(
            model_path_segment("gemini-2.5-flash-preview-05-20").unwrap(),
            "gemini-2.5-flash-preview-05-20"
        );

        for bad in ["", "..", "models/", "a/b", "x?y=1", "x#frag", "gemini 3", "models/../x"] {
            assert!(model_path_segment(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[tokio::test]
    async fn test_model_name_cannot_redirect_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
            .expect(0)
            .mount(&server)
            .await;

        let err = backend(&server, ModelPolicy::Requested)
            .invoke(&request("../../v1beta/tunedModels?x="))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::InvalidRequest { .. }));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_success_uses_requested_model() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-3-pro:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "Hello"}]}],
                "systemInstruction": {"parts": [{"text": "Be brief."}]},
                "generationConfig": {"maxOutputTokens": 8192, "temperature": 1.0}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "Hi!"}]},
                    "finishReason": "MAX_TOKENS"
                }],
                "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = backend(&server, ModelPolicy::Requested)
            .invoke(&request("gemini-3-pro"))
            .await
            .unwrap();

        assert_eq!(result.text, "Hi!");
        assert_eq!(result.finish_reason, FinishReason::MaxTokens);
        assert_eq!(result.input_tokens, 4);
        assert_eq!(result.output_tokens, 2);
    }

    #[tokio::test]
    async fn test_pinned_model_overrides_caller() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "ok"}]}, "finishReason": "STOP"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend(&server, ModelPolicy::Pinned("gemini-flash".to_string()));
        assert_eq!(backend.effective_model("claude-sonnet-4"), "gemini-flash");

        let result = backend.invoke(&request("claude-sonnet-4")).await.unwrap();
        assert_eq!(result.text, "ok");
    }

    #[tokio::test]
    async fn test_image_output_requests_both_modalities() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "generationConfig": {"responseModalities": ["TEXT", "IMAGE"]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [
                        {"text": "Here it is"},
                        {"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}}
                    ]},
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = backend(&server, ModelPolicy::Requested)
            .with_image_output(true)
            .invoke(&request("gemini-3-pro"))
            .await
            .unwrap();

        assert_eq!(result.images.len(), 1);
        assert_eq!(result.images[0].mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_quota_error_carries_status_and_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(json!({"error": {"message": "quota exceeded"}})),
            )
            .mount(&server)
            .await;

        let err = backend(&server, ModelPolicy::Requested)
            .invoke(&request("gemini-3-pro"))
            .await
            .unwrap_err();

        assert_eq!(err.upstream_status(), Some(429));
        assert_eq!(err.message(), "quota exceeded");
        assert_eq!(err.status_code(), 429);
    }

    #[tokio::test]
    async fn test_error_without_json_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let err = backend(&server, ModelPolicy::Requested)
            .invoke(&request("gemini-3-pro"))
            .await
            .unwrap_err();

        assert_eq!(err.upstream_status(), Some(503));
        assert!(err.message().contains("upstream down"));
    }

    #[tokio::test]
    async fn test_timeout_is_upstream_error_without_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_json(json!({"candidates": []})),
            )
            .mount(&server)
            .await;

        let err = backend(&server, ModelPolicy::Requested)
            .with_timeout(Duration::from_millis(200))
            .invoke(&request("gemini-3-pro"))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::UpstreamHttp { status: None, .. }));
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn test_unparseable_success_body_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = backend(&server, ModelPolicy::Requested)
            .invoke(&request("gemini-3-pro"))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::BackendMalformedOutput { .. }));
    }
}
