use crate::config::GatewayConfig;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    pub instance: String,
    pub mode: &'static str,
    pub model: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    pub image_generation: bool,
    pub api_key_configured: bool,
}

impl HealthReport {
    /// Reports the configured model, which for a pinned instance is also the
    /// model every request runs on.
    pub fn from_config(config: &GatewayConfig, api_key_configured: bool) -> Self {
        Self {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
            instance: config.instance.clone(),
            mode: config.mode_name(),
            model: config.model.clone(),
            port: config.port,
            purpose: config.purpose.clone(),
            image_generation: config.image_output(),
            api_key_configured,
        }
    }
}
