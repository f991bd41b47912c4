//! Built-in presets for the deployed gateway instances.
//!
//! Each preset fixes the backend, default port and model, and names the
//! environment variables that may override them. Users start an instance by
//! name and the preset fills in the details.

use crate::config::{
    BackendConfig, CliConfig, EnvOverrides, GatewayConfig, RemoteConfig, DEFAULT_CLI_TIMEOUT_MS,
    DEFAULT_GEMINI_BASE_URL, DEFAULT_MAX_BODY_BYTES,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetMode {
    Cli,
    Api,
}

#[derive(Debug, Clone)]
pub struct InstancePreset {
    pub name: &'static str,
    pub mode: PresetMode,
    pub port: u16,
    pub model: &'static str,
    pub pin_model: bool,
    pub image_output: bool,
    pub purpose: &'static str,
    pub port_env: &'static [&'static str],
    pub model_env: &'static [&'static str],
    pub timeout_env: &'static [&'static str],
    pub api_key_env: &'static [&'static str],
}

const PRESETS: &[InstancePreset] = &[
    InstancePreset {
        name: "cc-claude",
        mode: PresetMode::Cli,
        port: 2408,
        model: "opus",
        pin_model: false,
        image_output: false,
        purpose: "CLI-based gateway (subscription mode)",
        port_env: &["CC_CLAUDE_PORT"],
        model_env: &["CC_CLAUDE_MODEL"],
        timeout_env: &["CC_CLAUDE_TIMEOUT"],
        api_key_env: &[],
    },
    InstancePreset {
        name: "hc-reas-a",
        mode: PresetMode::Cli,
        port: 2410,
        model: "opus",
        pin_model: false,
        image_output: false,
        purpose: "Heavy reasoning",
        port_env: &["HC_REAS_A_PORT"],
        model_env: &["HC_REAS_A_MODEL"],
        timeout_env: &["HC_REAS_A_TIMEOUT"],
        api_key_env: &[],
    },
    InstancePreset {
        name: "cg-pro",
        mode: PresetMode::Api,
        port: 2406,
        model: "gemini-3-pro",
        pin_model: false,
        image_output: false,
        purpose: "Gemini Pro gateway",
        port_env: &["CG_PRO_PORT"],
        model_env: &["CG_PRO_MODEL"],
        timeout_env: &[],
        api_key_env: &["GOOGLE_AI_API_KEY"],
    },
    InstancePreset {
        name: "cg-image",
        mode: PresetMode::Api,
        port: 2407,
        model: "gemini-3-pro",
        pin_model: true,
        image_output: true,
        purpose: "Image generation",
        port_env: &["CG_IMAGE_PORT", "IMAGE_PROXY_PORT"],
        model_env: &[],
        timeout_env: &[],
        api_key_env: &["GOOGLE_API_KEY_IMAGE", "GOOGLE_API_KEY"],
    },
    InstancePreset {
        name: "hc-orca",
        mode: PresetMode::Api,
        port: 2414,
        model: "gemini-2.5-flash-preview-05-20",
        pin_model: true,
        image_output: false,
        purpose: "Light coordination",
        port_env: &["HC_ORCA_PORT"],
        model_env: &["MODEL_FLASH", "HC_ORCA_MODEL"],
        timeout_env: &[],
        api_key_env: &["GOOGLE_AI_API_KEY_PRIMARY", "GOOGLE_AI_API_KEY"],
    },
];

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| (*n).to_string()).collect()
}

impl InstancePreset {
    #[must_use]
    pub fn from_name(name: &str) -> Option<&'static InstancePreset> {
        PRESETS.iter().find(|p| p.name == name.to_lowercase())
    }

    #[must_use]
    pub fn all() -> &'static [InstancePreset] {
        PRESETS
    }

    /// Configuration for this preset before environment overrides.
    #[must_use]
    pub fn to_config(&self) -> GatewayConfig {
        let backend = match self.mode {
            PresetMode::Cli => BackendConfig::Cli(CliConfig {
                command: "claude".to_string(),
                leading_args: Vec::new(),
                workdir: None,
                timeout_ms: DEFAULT_CLI_TIMEOUT_MS,
            }),
            PresetMode::Api => BackendConfig::Api(RemoteConfig {
                base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
                api_key_env: owned(self.api_key_env),
                pin_model: self.pin_model,
                image_output: self.image_output,
            }),
        };

        GatewayConfig {
            instance: self.name.to_string(),
            port: self.port,
            model: self.model.to_string(),
            purpose: Some(self.purpose.to_string()),
            backend,
            env: EnvOverrides {
                port: owned(self.port_env),
                model: owned(self.model_env),
                timeout_ms: owned(self.timeout_env),
            },
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}
