//! Matcher Gateway: invokes the external facial-similarity matcher.
//!
//! The matcher is a separate process that owns embedding generation and
//! nearest-neighbor search over the reference database. The gateway spawns
//! exactly one process per request, enforces a hard wall-clock deadline, and
//! parses the single JSON record the process emits on stdout. It never
//! pools, caches, or retries; failures are surfaced to the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Successful match record, as emitted by the matcher process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    /// Matched reference subject
    pub subject: String,

    /// Relative path to the subject's reference image
    #[serde(rename = "refImage")]
    pub ref_image: String,

    /// Similarity score in [0, 1]
    pub score: f64,

    /// Relative path to the normalized crop of the submitted face
    #[serde(rename = "faceCrop")]
    pub face_crop: String,
}

/// Matcher invocation failure.
#[derive(Debug, thiserror::Error)]
pub enum MatchFailure {
    #[error("matcher did not finish before the deadline")]
    Timeout,

    #[error("matcher failed: {detail}")]
    Process { detail: String },
}

/// Narrow seam to the external matcher. The request handler only ever sees
/// this trait, so an in-process implementation could replace the subprocess
/// without touching the HTTP layer.
#[async_trait]
pub trait MatcherGateway: Send + Sync {
    /// Match the stored upload at `image` against the reference database.
    async fn match_face(&self, image: &Path) -> Result<MatchReport, MatchFailure>;

    /// Health check: are the matcher's inputs reachable?
    fn available(&self) -> bool;
}

/// Gateway implementation that shells out to the matcher script,
/// `program script <image> <embeddings>`, one process per call.
#[derive(Debug, Clone)]
pub struct ProcessMatcher {
    program: PathBuf,
    script: PathBuf,
    embeddings: PathBuf,
    deadline: Duration,
}

impl ProcessMatcher {
    pub fn new(
        program: impl Into<PathBuf>,
        script: impl Into<PathBuf>,
        embeddings: impl Into<PathBuf>,
        deadline: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
            embeddings: embeddings.into(),
            deadline,
        }
    }
}

#[async_trait]
impl MatcherGateway for ProcessMatcher {
    async fn match_face(&self, image: &Path) -> Result<MatchReport, MatchFailure> {
        let mut command = Command::new(&self.program);
        command
            .arg(&self.script)
            .arg(image)
            .arg(&self.embeddings)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the child (deadline expiry below) must kill the
            // process; a request never leaves a matcher running behind it.
            .kill_on_drop(true);

        let child = command.spawn().map_err(|err| MatchFailure::Process {
            detail: format!("failed to spawn {}: {err}", self.program.display()),
        })?;

        let started = std::time::Instant::now();
        let output = match timeout(self.deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Err(MatchFailure::Process {
                    detail: format!("failed to collect matcher output: {err}"),
                })
            }
            Err(_elapsed) => {
                tracing::warn!(
                    deadline_secs = self.deadline.as_secs_f64(),
                    image = %image.display(),
                    "matcher killed after deadline"
                );
                return Err(MatchFailure::Timeout);
            }
        };

        tracing::debug!(
            status = %output.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "matcher finished"
        );

        parse_output(&output)
    }

    fn available(&self) -> bool {
        self.embeddings.is_file() && self.script.is_file()
    }
}

/// Structured failure record the matcher script prints on stdout for
/// domain-level errors (no face detected, low confidence, bad embeddings).
#[derive(Debug, Deserialize)]
struct MatcherErrorRecord {
    error: String,
    #[serde(default)]
    code: Option<String>,
}

/// Parse the matcher's output into exactly one [`MatchReport`]. Any exit,
/// parse, or empty-output problem becomes a `Process` failure; a partial or
/// garbage record is never returned as a result.
fn parse_output(output: &std::process::Output) -> Result<MatchReport, MatchFailure> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    // The contract is one JSON object on stdout; tolerate stray leading
    // lines by taking the last non-empty one.
    let record = stdout.lines().rev().find(|line| !line.trim().is_empty());

    if !output.status.success() {
        // Prefer the script's structured error over raw stderr.
        let detail = record
            .and_then(|line| serde_json::from_str::<MatcherErrorRecord>(line).ok())
            .map(|rec| match rec.code {
                Some(code) => format!("{code}: {}", rec.error),
                None => rec.error,
            })
            .unwrap_or_else(|| String::from_utf8_lossy(&output.stderr).trim().to_string());
        let detail = if detail.is_empty() {
            format!("matcher exited with {}", output.status)
        } else {
            detail
        };
        return Err(MatchFailure::Process { detail });
    }

    let Some(line) = record else {
        return Err(MatchFailure::Process {
            detail: "matcher produced no output".to_string(),
        });
    };

    serde_json::from_str(line).map_err(|err| MatchFailure::Process {
        detail: format!("unparseable matcher output: {err}"),
    })
}
