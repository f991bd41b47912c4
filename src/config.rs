use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CLI_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Placeholder shipped in example `.env` files; treated as "not set".
const API_KEY_PLACEHOLDER: &str = "your-google-ai-key-here";

/// Immutable description of one gateway instance, built once at start-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub instance: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Model used when the caller omits one (and the pinned model in pinned mode).
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    pub backend: BackendConfig,
    #[serde(default)]
    pub env: EnvOverrides,
    /// Largest accepted request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum BackendConfig {
    Cli(CliConfig),
    Api(RemoteConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default = "default_cli_command")]
    pub command: String,
    /// Arguments placed before the generated ones.
    #[serde(default)]
    pub leading_args: Vec<String>,
    /// Working directory for the child; defaults to the OS temp dir so the
    /// tool never picks up project-specific configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
    #[serde(default = "default_cli_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variables holding the API key; the first one set wins.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Vec<String>,
    /// Ignore the caller's model and always use the instance model.
    #[serde(default)]
    pub pin_model: bool,
    /// Ask for both text and image output.
    #[serde(default)]
    pub image_output: bool,
}

/// Environment variables that override config values; the first one set wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvOverrides {
    #[serde(default = "default_port_env")]
    pub port: Vec<String>,
    #[serde(default = "default_model_env")]
    pub model: Vec<String>,
    #[serde(default = "default_timeout_env")]
    pub timeout_ms: Vec<String>,
}

impl Default for EnvOverrides {
    fn default() -> Self {
        Self {
            port: default_port_env(),
            model: default_model_env(),
            timeout_ms: default_timeout_env(),
        }
    }
}

fn default_port() -> u16 {
    2400
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

fn default_cli_command() -> String {
    "claude".to_string()
}

fn default_cli_timeout_ms() -> u64 {
    DEFAULT_CLI_TIMEOUT_MS
}

fn default_base_url() -> String {
    DEFAULT_GEMINI_BASE_URL.to_string()
}

fn default_api_key_env() -> Vec<String> {
    vec!["GOOGLE_AI_API_KEY".to_string()]
}

fn default_port_env() -> Vec<String> {
    vec!["GATEWAY_PORT".to_string()]
}

fn default_model_env() -> Vec<String> {
    vec!["GATEWAY_MODEL".to_string()]
}

fn default_timeout_env() -> Vec<String> {
    vec!["GATEWAY_TIMEOUT_MS".to_string()]
}

impl GatewayConfig {
    /// Load an instance description from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply port, model and timeout overrides from the environment.
    /// `lookup` is `std::env::var(..).ok()` outside of tests.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some((name, value)) = first_set(&self.env.port, &lookup) {
            self.port = value.trim().parse().map_err(|_| {
                GatewayError::config(format!("{name} is not a valid port: '{value}'"))
            })?;
        }

        if let Some((_, value)) = first_set(&self.env.model, &lookup) {
            self.model = value.trim().to_string();
        }

        if let BackendConfig::Cli(ref mut cli) = self.backend {
            if let Some((name, value)) = first_set(&self.env.timeout_ms, &lookup) {
                cli.timeout_ms = value.trim().parse().map_err(|_| {
                    GatewayError::config(format!(
                        "{name} must be a timeout in milliseconds: '{value}'"
                    ))
                })?;
            }
        }

        Ok(self)
    }

    pub fn mode_name(&self) -> &'static str {
        match self.backend {
            BackendConfig::Cli(_) => "cli",
            BackendConfig::Api(_) => "api",
        }
    }

    pub fn image_output(&self) -> bool {
        matches!(self.backend, BackendConfig::Api(ref r) if r.image_output)
    }
}

impl CliConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn effective_workdir(&self) -> PathBuf {
        self.workdir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl RemoteConfig {
    /// Resolve the API key from the configured environment variables.
    pub fn resolve_api_key<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        first_set(&self.api_key_env, &lookup)
            .map(|(_, key)| key)
            .filter(|key| key != API_KEY_PLACEHOLDER)
            .ok_or_else(|| {
                GatewayError::config(format!(
                    "API key not set. Set one of: {}",
                    self.api_key_env.join(", ")
                ))
            })
    }
}

fn first_set<'a, F>(names: &'a [String], lookup: &F) -> Option<(&'a str, String)>
where
    F: Fn(&str) -> Option<String>,
{
    names.iter().find_map(|name| {
        lookup(name)
            .filter(|v| !v.trim().is_empty())
            .map(|v| (name.as_str(), v))
    })
}

/// Load `.env` layers for an instance directory: the instance-local file
/// first, then the shared file in the parent directory. Variables already
/// present in the environment are never overwritten, so the process
/// environment wins over the local file, which wins over the shared one.
pub fn load_env_layers(instance_dir: &Path) -> Vec<PathBuf> {
    let mut loaded = Vec::new();
    for path in [
        instance_dir.join(".env"),
        instance_dir.join("..").join(".env"),
    ] {
        if !path.is_file() {
            continue;
        }
        match dotenvy::from_path(&path) {
            Ok(()) => loaded.push(path),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable env file"),
        }
    }
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_load_remote_config() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
instance = "cg-image"
port = 2407
model = "gemini-3-pro"

[backend]
mode = "api"
pin_model = true
image_output = true
api_key_env = ["GOOGLE_API_KEY_IMAGE", "GOOGLE_API_KEY"]
"#
        )
        .unwrap();

        let config = GatewayConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 2407);
        assert_eq!(config.mode_name(), "api");
        assert!(config.image_output());
        match config.backend {
            BackendConfig::Api(ref remote) => {
                assert!(remote.pin_model);
                assert_eq!(remote.base_url, DEFAULT_GEMINI_BASE_URL);
                assert_eq!(remote.api_key_env.len(), 2);
            }
            BackendConfig::Cli(_) => panic!("Expected api backend"),
        }
        assert_eq!(config.env.port, vec!["GATEWAY_PORT".to_string()]);
    }

    #[test]
    fn test_load_cli_config_defaults() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
instance = "local-claude"
model = "sonnet"

[backend]
mode = "cli"
"#
        )
        .unwrap();

        let config = GatewayConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 2400);
        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        match config.backend {
            BackendConfig::Cli(ref cli) => {
                assert_eq!(cli.command, "claude");
                assert_eq!(cli.timeout(), Duration::from_secs(300));
                assert_eq!(cli.effective_workdir(), std::env::temp_dir());
            }
            BackendConfig::Api(_) => panic!("Expected cli backend"),
        }
    }

    #[test]
    fn test_env_overrides() {
        let config = GatewayConfig {
            instance: "test".to_string(),
            port: 2400,
            model: "opus".to_string(),
            purpose: None,
            backend: BackendConfig::Cli(CliConfig {
                command: "claude".to_string(),
                leading_args: Vec::new(),
                workdir: None,
                timeout_ms: DEFAULT_CLI_TIMEOUT_MS,
            }),
            env: EnvOverrides::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        };

        let config = config
            .with_env_overrides(env(&[
                ("GATEWAY_PORT", "9999"),
                ("GATEWAY_MODEL", "sonnet"),
                ("GATEWAY_TIMEOUT_MS", "1500"),
            ]))
            .unwrap();

        assert_eq!(config.port, 9999);
        assert_eq!(config.model, "sonnet");
        match config.backend {
            BackendConfig::Cli(ref cli) => assert_eq!(cli.timeout_ms, 1500),
            BackendConfig::Api(_) => panic!("Expected cli backend"),
        }
    }

    #[test]
    fn test_invalid_port_override_is_an_error() {
        let config = GatewayConfig {
            instance: "test".to_string(),
            port: 2400,
            model: "m".to_string(),
            purpose: None,
            backend: BackendConfig::Api(RemoteConfig {
                base_url: default_base_url(),
                api_key_env: default_api_key_env(),
                pin_model: false,
                image_output: false,
            }),
            env: EnvOverrides::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        };

        let err = config
            .with_env_overrides(env(&[("GATEWAY_PORT", "not-a-port")]))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Config { .. }));
    }

    #[test]
    fn test_api_key_fallback_chain() {
        let remote = RemoteConfig {
            base_url: default_base_url(),
            api_key_env: vec!["KEY_A".to_string(), "KEY_B".to_string()],
            pin_model: false,
            image_output: false,
        };

        assert_eq!(
            remote.resolve_api_key(env(&[("KEY_B", "b"), ("KEY_A", "a")])).unwrap(),
            "a"
        );
        assert_eq!(
            remote.resolve_api_key(env(&[("KEY_A", ""), ("KEY_B", "b")])).unwrap(),
            "b"
        );
        assert!(remote.resolve_api_key(env(&[])).is_err());
        assert!(remote
            .resolve_api_key(env(&[("KEY_A", "your-google-ai-key-here")]))
            .is_err());
    }

    #[test]
    fn test_env_layers_local_overrides_shared() {
        let shared = tempfile::tempdir().unwrap();
        let instance = shared.path().join("instance");
        std::fs::create_dir(&instance).unwrap();
        std::fs::write(
            shared.path().join(".env"),
            "CHAT_GATEWAY_LAYER_TEST=shared\nCHAT_GATEWAY_SHARED_ONLY=yes\n",
        )
        .unwrap();
        std::fs::write(instance.join(".env"), "CHAT_GATEWAY_LAYER_TEST=local\n").unwrap();

        let loaded = load_env_layers(&instance);

        assert_eq!(loaded.len(), 2);
        assert_eq!(std::env::var("CHAT_GATEWAY_LAYER_TEST").unwrap(), "local");
        assert_eq!(std::env::var("CHAT_GATEWAY_SHARED_ONLY").unwrap(), "yes");
    }
}
