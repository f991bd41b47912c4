//! Translation between the Anthropic, OpenAI and generative-language formats.
//!
//! Everything funnels through the backend-neutral shapes in [`neutral`]. All
//! translation functions are pure (no I/O).

pub mod anthropic_types;
pub mod gemini_types;
pub mod neutral;
pub mod openai_types;
pub mod request;
pub mod response;

/// Request/response JSON shape a caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireStyle {
    Anthropic,
    OpenAi,
}

impl WireStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            WireStyle::Anthropic => "anthropic",
            WireStyle::OpenAi => "openai",
        }
    }
}
