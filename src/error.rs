//! Error types for the gateway.

use std::time::Duration;
use thiserror::Error;

/// Coarse classification used when rendering an error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    BackendTimeout,
    BackendProcessFailure,
    BackendMalformedOutput,
    UpstreamHttpError,
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Backend timed out after {}s", .after.as_secs())]
    BackendTimeout { after: Duration },

    #[error("Backend process failed: {message}")]
    BackendProcessFailure {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("Backend returned malformed output: {message}")]
    BackendMalformedOutput { message: String },

    #[error("{message}")]
    UpstreamHttp { status: Option<u16>, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: msg.into(),
        }
    }

    pub fn process_failure(msg: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::BackendProcessFailure {
            message: msg.into(),
            exit_code,
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::BackendMalformedOutput {
            message: msg.into(),
        }
    }

    pub fn upstream(status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::UpstreamHttp {
            status,
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Configuration errors only occur at start-up; if one ever reaches a
    /// request it is reported as a backend process failure, as are I/O errors.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::BackendTimeout { .. } => ErrorKind::BackendTimeout,
            Self::BackendMalformedOutput { .. } => ErrorKind::BackendMalformedOutput,
            Self::UpstreamHttp { .. } => ErrorKind::UpstreamHttpError,
            Self::BackendProcessFailure { .. } | Self::Config { .. }
            | Self::Toml(_)
            | Self::Io(_) => {
                ErrorKind::BackendProcessFailure
            }
        }
    }

    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::UpstreamHttp { status, .. } => *status,
            _ => None,
        }
    }

    /// HTTP status the caller receives for this error.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidRequest => 400,
            _ => self
                .upstream_status()
                .filter(|s| (400..=599).contains(s))
                .unwrap_or(500),
        }
    }

    /// Message without the variant prefix, as shown inside error envelopes.
    pub fn message(&self) -> String {
        match self {
            Self::InvalidRequest { message }
            | Self::BackendProcessFailure { message, .. }
            | Self::BackendMalformedOutput { message }
            | Self::UpstreamHttp { message, .. }
            | Self::Config { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
