//! External map generation.
//!
//! The renderer is an external program. [`MapGenerator`] hides how it is run
//! so the request path can be exercised with fakes; [`ProcessGenerator`] is the
//! production implementation that spawns the program once per request.
//!
//! Program contract:
//! - argv: `<leading args...> <resolution> <years,csv> <states,csv>`
//! - stdout: one JSON line, `{"map_html_path": "/abs/path/map.html"}`
//! - stderr: free-text diagnostics, empty on success
//! - exit status 0 on success

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use protocol::FilterSelection;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::config::Config;
use crate::error::GenerationError;

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Where the generator left its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    pub path: PathBuf,
}

impl ArtifactLocation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Base name of the artifact. Windows separators are honoured on every
    /// platform, since generators may report paths like `out\map.html`.
    pub fn file_name(&self) -> Option<&str> {
        let name = self.path.file_name()?.to_str()?;
        name.rsplit('\\').next().filter(|n| !n.is_empty())
    }
}

/// Renders a map for a selection.
///
/// Each call resolves exactly once, whatever mix of output and exit signals
/// the underlying process produced.
pub trait MapGenerator: Send + Sync {
    fn generate<'a>(
        &'a self,
        selection: &'a FilterSelection,
    ) -> BoxFuture<'a, Result<ArtifactLocation, GenerationError>>;
}

/// Spawns the configured program for every request.
#[derive(Debug, Clone)]
pub struct ProcessGenerator {
    program: String,
    leading_args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ProcessGenerator {
    pub fn new(program: impl Into<String>, leading_args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            leading_args,
            working_dir: None,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.program.clone(),
            config.leading_args.clone(),
            config.timeout,
        )
        .with_working_dir(config.working_dir.clone())
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    async fn run(&self, selection: &FilterSelection) -> Result<ArtifactLocation, GenerationError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .args(selection.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait on timeout must take the process with it.
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| {
            GenerationError::ProcessError(format!("{} failed to start: {e}", self.program))
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(GenerationError::ProcessError(format!(
                    "failed to collect {} output: {e}",
                    self.program
                )))
            }
            Err(_) => return Err(GenerationError::Timeout(self.timeout)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            status = ?output.status,
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "map generator finished"
        );

        interpret_output(output.status.code(), &stdout, &stderr, self.working_dir.as_deref())
    }
}

impl MapGenerator for ProcessGenerator {
    fn generate<'a>(
        &'a self,
        selection: &'a FilterSelection,
    ) -> BoxFuture<'a, Result<ArtifactLocation, GenerationError>> {
        Box::pin(self.run(selection))
    }
}

#[derive(Debug, Deserialize)]
struct GeneratorReport {
    #[serde(default)]
    map_html_path: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Turns the collected signals of a finished run into a single outcome.
///
/// Precedence: diagnostics on stderr, then a failing exit status, then the
/// stdout report. A failing run that still printed an `error` report yields
/// that message instead of the bare exit code. `exit_code` is `None` when the
/// process died from a signal.
pub(crate) fn interpret_output(
    exit_code: Option<i32>,
    stdout: &str,
    stderr: &str,
    working_dir: Option<&Path>,
) -> Result<ArtifactLocation, GenerationError> {
    let diagnostics = stderr.trim();
    if !diagnostics.is_empty() {
        return Err(GenerationError::ProcessError(diagnostics.to_string()));
    }

    let line = stdout.lines().map(str::trim).rfind(|l| !l.is_empty());
    if exit_code != Some(0) {
        let reported = line
            .and_then(|l| serde_json::from_str::<GeneratorReport>(l).ok())
            .and_then(|report| report.error);
        return Err(match reported {
            Some(error) => GenerationError::ProcessError(error_text(error)),
            None => GenerationError::ExitFailure(exit_code),
        });
    }

    let Some(line) = line else {
        return Err(GenerationError::MalformedOutput("no output".to_string()));
    };
    let report: GeneratorReport = serde_json::from_str(line)
        .map_err(|e| GenerationError::MalformedOutput(format!("{e}: {line:?}")))?;

    if let Some(error) = report.error {
        return Err(GenerationError::ProcessError(error_text(error)));
    }

    let path = report
        .map_html_path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| GenerationError::MalformedOutput("missing map_html_path".to_string()))?;
    let path = PathBuf::from(path);
    let path = match working_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path,
    };
    Ok(ArtifactLocation::new(path))
}

fn error_text(error: serde_json::Value) -> String {
    match error {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}
