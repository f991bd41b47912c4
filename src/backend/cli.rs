//! CLI subprocess strategy: one child process per request.
//!
//! The tool runs non-interactively with stdin closed and its output in JSON
//! mode. Its stdout is not always clean JSON (some builds print banners or
//! warnings first), so parsing is a two-step [`ParseOutcome`].

use super::{truncate, Invoker};
use crate::config::{CliConfig, DEFAULT_CLI_TIMEOUT_MS};
use crate::error::{GatewayError, Result};
use crate::translate::neutral::{BackendResult, FinishReason, NormalizedRequest};
use crate::translate::request::to_cli_prompt;

use serde::Deserialize;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct CliBackend {
    command: String,
    leading_args: Vec<String>,
    workdir: PathBuf,
    timeout: Duration,
}

impl CliBackend {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            leading_args: Vec::new(),
            workdir: std::env::temp_dir(),
            timeout: Duration::from_millis(DEFAULT_CLI_TIMEOUT_MS),
        }
    }

    pub fn from_config(config: &CliConfig) -> Self {
        Self::new(config.command.clone())
            .with_leading_args(config.leading_args.clone())
            .with_workdir(config.effective_workdir())
            .with_timeout(config.timeout())
    }

    #[must_use]
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments generated for a request (after any leading arguments).
    pub fn build_args(&self, req: &NormalizedRequest) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            to_cli_prompt(&req.turns),
            "--output-format".to_string(),
            "json".to_string(),
            "--model".to_string(),
            req.model.clone(),
            "--dangerously-skip-permissions".to_string(),
        ];

        if let Some(ref system) = req.system_instruction {
            args.push("--system-prompt".to_string());
            args.push(system.clone());
        }

        args
    }

    async fn run(&self, args: Vec<String>) -> Result<CapturedOutput> {
        let mut child = Command::new(&self.command)
            .args(&self.leading_args)
            .args(&args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                GatewayError::process_failure(
                    format!("Failed to spawn '{}': {}", self.command, e),
                    None,
                )
            })?;

        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));
        let readers = [stdout_task.abort_handle(), stderr_task.abort_handle()];

        let collect = async {
            let status = child.wait().await?;
            let stdout = join_reader(stdout_task).await?;
            let stderr = join_reader(stderr_task).await?;
            Ok::<_, io::Error>(CapturedOutput {
                status,
                stdout,
                stderr,
            })
        };

        let outcome = tokio::time::timeout(self.timeout, collect).await;

        match outcome {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => {
                readers.iter().for_each(|r| r.abort());
                Err(GatewayError::process_failure(
                    format!("Failed to collect CLI output: {e}"),
                    None,
                ))
            }
            Err(_) => {
                readers.iter().for_each(|r| r.abort());
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out CLI process");
                }
                Err(GatewayError::BackendTimeout {
                    after: self.timeout,
                })
            }
        }
    }
}

impl Invoker for CliBackend {
    fn effective_model(&self, requested: &str) -> String {
        requested.to_string()
    }

    async fn invoke(&self, req: &NormalizedRequest) -> Result<BackendResult> {
        let args = self.build_args(req);

        info!(
            command = %self.command,
            model = %req.model,
            turns = req.turns.len(),
            "Spawning CLI backend"
        );

        let output = self.run(args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            warn!(code = %code, "CLI backend failed");
            return Err(GatewayError::process_failure(
                format!(
                    "CLI exited with code {}: {}",
                    code,
                    truncate(stderr.trim(), 1000)
                ),
                output.status.code(),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);

        match parse_cli_output(&stdout) {
            ParseOutcome::Parsed(result) => {
                debug!(
                    session_id = result.session_id.as_deref().unwrap_or("none"),
                    "CLI backend succeeded"
                );
                Ok(result)
            }
            ParseOutcome::ToolError(message) => Err(GatewayError::process_failure(
                format!("CLI reported an error: {}", truncate(&message, 1000)),
                Some(0),
            )),
            ParseOutcome::Malformed => Err(GatewayError::malformed(format!(
                "Failed to parse CLI output: {}",
                truncate(&stdout, 200)
            ))),
        }
    }
}

struct CapturedOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut s) = stream {
        s.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

async fn join_reader(task: JoinHandle<io::Result<Vec<u8>>>) -> io::Result<Vec<u8>> {
    task.await.map_err(io::Error::other)?
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

/// JSON document printed by the tool in `--output-format json` mode.
#[derive(Debug, Deserialize)]
struct CliDocument {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
    #[serde(default)]
    usage: Option<CliUsage>,
    #[serde(default)]
    is_error: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct CliUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

/// Result of reading the tool's stdout.
#[derive(Debug)]
pub enum ParseOutcome {
    Parsed(BackendResult),
    /// The document parsed but flags itself as an error.
    ToolError(String),
    Malformed,
}

/// Parse stdout directly, then retry once on the last top-level JSON object.
pub fn parse_cli_output(stdout: &str) -> ParseOutcome {
    let doc = serde_json::from_str::<CliDocument>(stdout.trim()).ok().or_else(|| {
        last_json_object(stdout).and_then(|candidate| serde_json::from_str(candidate).ok())
    });

    match doc {
        Some(doc) => doc.into_outcome(),
        None => ParseOutcome::Malformed,
    }
}

impl CliDocument {
    fn into_outcome(self) -> ParseOutcome {
        let text = self
            .result
            .filter(|t| !t.is_empty())
            .or(self.response)
            .unwrap_or_default();

        if self.is_error == Some(true) {
            return ParseOutcome::ToolError(text);
        }

        let usage = self.usage.unwrap_or_default();

        ParseOutcome::Parsed(BackendResult {
            text,
            images: Vec::new(),
            finish_reason: FinishReason::Stop,
            input_tokens: self.input_tokens.or(usage.input_tokens).unwrap_or(0),
            output_tokens: self.output_tokens.or(usage.output_tokens).unwrap_or(0),
            session_id: self.session_id,
        })
    }
}

/// The brace-matched object that ends at the final `}` of the output.
fn last_json_object(output: &str) -> Option<&str> {
    let trimmed = output.trim_end();
    if !trimmed.ends_with('}') {
        return None;
    }

    let bytes = trimmed.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;

    for i in (0..bytes.len()).rev() {
        match bytes[i] {
            b'"' if !is_escaped(bytes, i) => in_string = !in_string,
            _ if in_string => {}
            b'}' => depth += 1,
            b'{' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&trimmed[i..]);
                }
            }
            _ => {}
        }
    }

    None
}

fn is_escaped(bytes: &[u8], quote: usize) -> bool {
    let backslashes = bytes[..quote]
        .iter()
        .rev()
        .take_while(|b| **b == b'\\')
        .count();
    backslashes % 2 == 1
}
