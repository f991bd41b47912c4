//! Backend invokers.
//!
//! Both strategies turn a [`NormalizedRequest`] into a [`BackendResult`]. The
//! strategy for an instance is chosen once from its configuration and held in
//! [`Backend`]; request handling never switches strategies.

pub mod cli;
pub mod remote;

pub use cli::{CliBackend, ParseOutcome};
pub use remote::{ModelPolicy, RemoteBackend};

use crate::config::{BackendConfig, GatewayConfig};
use crate::error::Result;
use crate::translate::neutral::{BackendResult, NormalizedRequest};
use std::future::Future;

/// Capability shared by the backend strategies.
pub trait Invoker {
    /// Model the backend actually runs for a request naming `requested`.
    fn effective_model(&self, requested: &str) -> String;

    /// Run one completion. Each call is independent of every other call.
    fn invoke(
        &self,
        req: &NormalizedRequest,
    ) -> impl Future<Output = Result<BackendResult>> + Send;
}

pub enum Backend {
    Cli(CliBackend),
    Remote(RemoteBackend),
}

impl Backend {
    /// Build the backend for an instance. `lookup` resolves environment
    /// variables; a remote backend without an API key is a config error.
    pub fn from_config<F>(config: &GatewayConfig, client: reqwest::Client, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        match config.backend {
            BackendConfig::Cli(ref cli) => Ok(Self::Cli(CliBackend::from_config(cli))),
            BackendConfig::Api(ref remote) => {
                let api_key = remote.resolve_api_key(lookup)?;
                Ok(Self::Remote(RemoteBackend::from_config(
                    remote,
                    &config.model,
                    api_key,
                    client,
                )))
            }
        }
    }
}

impl Invoker for Backend {
    fn effective_model(&self, requested: &str) -> String {
        match self {
            Backend::Cli(b) => b.effective_model(requested),
            Backend::Remote(b) => b.effective_model(requested),
        }
    }

    async fn invoke(&self, req: &NormalizedRequest) -> Result<BackendResult> {
        match self {
            Backend::Cli(b) => b.invoke(req).await,
            Backend::Remote(b) => b.invoke(req).await,
        }
    }
}

/// Longest prefix of `s` no longer than `max` bytes, on a char boundary.
pub(crate) fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
