use crate::error::AnalysisError;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Maximum accepted stdout line length (1 MiB). Longer lines are assumed to
/// be a missing newline delimiter and are skipped.
const MAX_OUTPUT_LINE_BYTES: usize = 1024 * 1024;

/// Timeout for one analysis run, end to end.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Buffer for results streaming back to the relay.
const RESULT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Interpreter used to run the script.
    pub interpreter: PathBuf,
    /// Path to the analysis script.
    pub script: PathBuf,
    /// Upper bound for one run.
    pub timeout: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            script: PathBuf::from("ask_agent.py"),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// The single JSON object written to the script's stdin.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisInput {
    #[serde(rename = "clientId")]
    pub client_id: String,
    pub text: String,
}

/// One parsed stdout object, kept verbatim for forwarding.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub data: Value,
}

impl AnalysisReport {
    /// Derives a reply suggestion: `summary` when present, otherwise
    /// `reference_answer`.
    pub fn suggestion(&self) -> Option<&str> {
        self.data
            .get("summary")
            .and_then(Value::as_str)
            .or_else(|| self.data.get("reference_answer").and_then(Value::as_str))
    }
}

/// Spawns and supervises analysis subprocess runs.
#[derive(Debug, Clone)]
pub struct AnalysisService {
    config: AnalysisConfig,
}

impl AnalysisService {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Starts one analysis run for `input`.
    ///
    /// Returns immediately; each JSON object the script prints arrives on
    /// the returned channel as it is produced. The channel closes when the
    /// script exits, times out, or fails — failures are logged, never
    /// surfaced to the chat participants.
    pub fn dispatch(&self, input: AnalysisInput) -> mpsc::Receiver<AnalysisReport> {
        let (tx, rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let config = self.config.clone();
        tokio::spawn(async move {
            if let Err(e) = run(config, input, tx).await {
                tracing::warn!("analysis run failed: {e}");
            }
        });
        rx
    }
}

async fn run(
    config: AnalysisConfig,
    input: AnalysisInput,
    tx: mpsc::Sender<AnalysisReport>,
) -> Result<(), AnalysisError> {
    tracing::debug!(script = %config.script.display(), client_id = %input.client_id, "starting analysis run");

    let mut child = Command::new(&config.interpreter)
        .arg(&config.script)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| AnalysisError::Spawn(e.to_string()))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| AnalysisError::Spawn("stdin not captured".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AnalysisError::Spawn("stdout not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AnalysisError::Spawn("stderr not captured".to_string()))?;

    // The script reads exactly one newline-terminated JSON object.
    let mut line = serde_json::to_string(&input)?;
    line.push('\n');
    stdin.write_all(line.as_bytes()).await?;
    drop(stdin);

    // Drain stderr concurrently so the script never blocks on a full pipe.
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.trim().is_empty() {
                tracing::warn!("analysis stderr: {line}");
            }
        }
    });

    let outcome = tokio::time::timeout(config.timeout, async {
        forward_stdout(stdout, &tx).await?;
        child.wait().await
    })
    .await;

    match outcome {
        Ok(Ok(status)) => {
            if !status.success() {
                tracing::warn!(code = ?status.code(), "analysis script exited with failure");
            }
            Ok(())
        }
        Ok(Err(e)) => Err(AnalysisError::Io(e)),
        Err(_) => {
            let _ = child.kill().await;
            Err(AnalysisError::Timeout(config.timeout.as_secs()))
        }
    }
}

/// Parses line-delimited JSON objects from the script's stdout and streams
/// them to the caller. Invalid or oversized lines are logged and skipped.
async fn forward_stdout(
    stdout: tokio::process::ChildStdout,
    tx: &mpsc::Sender<AnalysisReport>,
) -> std::io::Result<()> {
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if line.len() > MAX_OUTPUT_LINE_BYTES {
            tracing::warn!(bytes = line.len(), "oversized analysis output line skipped");
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(data) if data.is_object() => {
                if tx.send(AnalysisReport { data }).await.is_err() {
                    // Receiver gone; stop parsing but let the child finish.
                    break;
                }
            }
            Ok(_) => tracing::warn!("analysis output line is not a JSON object, skipped"),
            Err(e) => tracing::warn!("invalid JSON on analysis stdout: {e}"),
        }
    }
    Ok(())
}
