//! Backend-neutral request and result shapes.
//!
//! Every inbound wire format is normalized into a [`NormalizedRequest`], and
//! every backend produces a [`BackendResult`]. Nothing here knows about JSON
//! wire formats.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRequest {
    pub system_instruction: Option<String>,
    pub turns: Vec<ChatTurn>,
    pub max_output_tokens: u32,
    pub temperature: f64,
    pub model: String,
}

/// Cause of completion termination, independent of any wire vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Other,
}

impl FinishReason {
    pub const ALL: [FinishReason; 4] = [
        FinishReason::Stop,
        FinishReason::MaxTokens,
        FinishReason::Safety,
        FinishReason::Other,
    ];

    pub fn anthropic_stop_reason(self) -> &'static str {
        match self {
            FinishReason::Stop | FinishReason::Other => "end_turn",
            FinishReason::MaxTokens => "max_tokens",
            FinishReason::Safety => "stop_sequence",
        }
    }

    pub fn openai_finish_reason(self) -> &'static str {
        match self {
            FinishReason::Stop | FinishReason::Other => "stop",
            FinishReason::MaxTokens => "length",
            FinishReason::Safety => "content_filter",
        }
    }

    /// Inverse of [`anthropic_stop_reason`](Self::anthropic_stop_reason).
    /// `end_turn` is shared by `Stop` and `Other` and reads back as `Stop`.
    pub fn from_anthropic_stop_reason(reason: &str) -> Self {
        match reason {
            "end_turn" => FinishReason::Stop,
            "max_tokens" => FinishReason::MaxTokens,
            "stop_sequence" => FinishReason::Safety,
            _ => FinishReason::Other,
        }
    }

    pub fn from_openai_finish_reason(reason: &str) -> Self {
        match reason {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::MaxTokens,
            "content_filter" => FinishReason::Safety,
            _ => FinishReason::Other,
        }
    }

    /// Map a generative-language API `finishReason`.
    pub fn from_gemini(reason: Option<&str>) -> Self {
        match reason {
            Some("STOP") => FinishReason::Stop,
            Some("MAX_TOKENS") => FinishReason::MaxTokens,
            Some("SAFETY" | "RECITATION") => FinishReason::Safety,
            _ => FinishReason::Other,
        }
    }
}

/// Inline image returned by a backend; `base64_data` is already encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub mime_type: String,
    pub base64_data: String,
}

impl InlineImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64_data)
    }

    pub fn markdown(&self) -> String {
        format!("![Generated Image]({})", self.data_url())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendResult {
    pub text: String,
    pub images: Vec<InlineImage>,
    pub finish_reason: FinishReason,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub session_id: Option<String>,
}

impl BackendResult {
    /// Text with every image appended as a markdown data-URL link.
    pub fn text_with_images(&self) -> String {
        if self.images.is_empty() {
            return self.text.clone();
        }
        let links = self
            .images
            .iter()
            .map(InlineImage::markdown)
            .collect::<Vec<_>>()
            .join("\n\n");
        format!("{}\n\n{}", self.text, links)
    }
}
