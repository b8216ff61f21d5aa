use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::ToolOutput;
use crate::error::AnalysisError;

/// Oldest compiler actually resolvable by solc-select; older 0.4.x
/// directives are clamped up to it.
const MIN_SOLC_04: &str = "0.4.11";
/// Used when the artifact carries no recognizable version directive; the
/// compile step inside the tool will still report the real problem.
const DEFAULT_SOLC: &str = "0.8.19";

static PRAGMA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"pragma\s+solidity\s*[^\d]*(\d+)\.(\d+)\.(\d+)").expect("static pragma pattern")
});

/// Resolve the toolchain version for an artifact from its version
/// directive, clamping `0.4.x (x < 11)` to `0.4.11`.
pub fn resolve_solc_version(source: &str) -> String {
    let Some(caps) = PRAGMA_RE.captures(source) else {
        warn!("no version directive found, using default toolchain {DEFAULT_SOLC}");
        return DEFAULT_SOLC.to_string();
    };
    let major: u32 = caps[1].parse().unwrap_or(0);
    let minor: u32 = caps[2].parse().unwrap_or(0);
    let patch: u32 = caps[3].parse().unwrap_or(0);
    if minor == 4 && patch < 11 {
        return MIN_SOLC_04.to_string();
    }
    format!("{major}.{minor}.{patch}")
}

/// Result of one command executed against the container host.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Seam between the runner's state machine and the container host. The
/// production implementation shells out to the `docker` CLI; tests
/// script responses instead.
#[async_trait]
pub trait ContainerExec: Send + Sync {
    async fn run(&self, args: &[String]) -> Result<ExecOutput, AnalysisError>;
}

/// `docker`-CLI backed executor with a bounded per-command timeout.
#[derive(Debug, Clone)]
pub struct DockerCli {
    timeout_secs: u64,
}

impl DockerCli {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        // Compiler installs on a cold container can take minutes.
        Self::new(600)
    }
}

#[async_trait]
impl ContainerExec for DockerCli {
    async fn run(&self, args: &[String]) -> Result<ExecOutput, AnalysisError> {
        let command = format!("docker {}", args.join(" "));
        debug!(%command, "running container command");
        let output = timeout(
            Duration::from_secs(self.timeout_secs),
            Command::new("docker").args(args).output(),
        )
        .await
        .map_err(|_| AnalysisError::Timeout {
            command: command.clone(),
            seconds: self.timeout_secs,
        })?
        .map_err(|source| AnalysisError::Spawn { command, source })?;
        Ok(ExecOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Lifecycle states of the long-lived analysis container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Absent,
    Stopped,
    Running,
}

/// Container identity and mount geometry for one runner instance.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub container: String,
    pub image: String,
    /// Host directory bind-mounted read-write into the container.
    pub host_root: PathBuf,
    /// Fixed in-container mount point for `host_root`.
    pub mount_point: String,
}

impl RunnerConfig {
    pub fn new(container: impl Into<String>, image: impl Into<String>, host_root: impl Into<PathBuf>) -> Self {
        Self {
            container: container.into(),
            image: image.into(),
            host_root: host_root.into(),
            mount_point: "/share".to_string(),
        }
    }
}

/// Owns one long-lived analysis container and executes the tool pipeline
/// against a single artifact at a time.
///
/// All command sequences are serialized through an internal mutex: the
/// toolchain-selection commands mutate container-global state, so two
/// interleaved sequences would analyze with the wrong compiler.
pub struct AnalysisRunner<E: ContainerExec> {
    exec: E,
    config: RunnerConfig,
    sequence: Mutex<()>,
}

impl<E: ContainerExec> AnalysisRunner<E> {
    pub fn new(exec: E, config: RunnerConfig) -> Self {
        Self {
            exec,
            config,
            sequence: Mutex::new(()),
        }
    }

    pub async fn container_state(&self) -> Result<ContainerState, AnalysisError> {
        let out = self
            .exec
            .run(&[
                "inspect".into(),
                "-f".into(),
                "{{.State.Running}}".into(),
                self.config.container.clone(),
            ])
            .await?;
        if !out.success {
            return Ok(ContainerState::Absent);
        }
        if out.stdout.trim() == "true" {
            Ok(ContainerState::Running)
        } else {
            Ok(ContainerState::Stopped)
        }
    }

    /// Drive the container to `Running`, creating it from the pinned
    /// image on first use and restarting the existing one thereafter.
    pub async fn ensure_running(&self) -> Result<(), AnalysisError> {
        match self.container_state().await? {
            ContainerState::Running => Ok(()),
            ContainerState::Stopped => {
                info!(container = %self.config.container, "starting existing analysis container");
                let out = self
                    .exec
                    .run(&["start".into(), self.config.container.clone()])
                    .await?;
                if !out.success {
                    return Err(AnalysisError::ContainerUnavailable {
                        container: self.config.container.clone(),
                        detail: out.combined(),
                    });
                }
                Ok(())
            }
            ContainerState::Absent => {
                info!(
                    container = %self.config.container,
                    image = %self.config.image,
                    "creating analysis container"
                );
                let mount = format!(
                    "{}:{}",
                    self.config.host_root.display(),
                    self.config.mount_point
                );
                let out = self
                    .exec
                    .run(&[
                        "run".into(),
                        "-d".into(),
                        "-t".into(),
                        "--name".into(),
                        self.config.container.clone(),
                        "-v".into(),
                        mount,
                        self.config.image.clone(),
                    ])
                    .await?;
                if !out.success {
                    return Err(AnalysisError::ContainerUnavailable {
                        container: self.config.container.clone(),
                        detail: out.combined(),
                    });
                }
                Ok(())
            }
        }
    }

    async fn exec_in_container(&self, args: &[&str]) -> Result<ExecOutput, AnalysisError> {
        let mut full: Vec<String> = vec!["exec".into(), self.config.container.clone()];
        full.extend(args.iter().map(|s| s.to_string()));
        self.exec.run(&full).await
    }

    /// Run the tool pipeline against one artifact: install and select the
    /// compiler implied by the version directive, then run the analysis
    /// tool with JSON output.
    ///
    /// Empty final output typically means the artifact does not compile;
    /// a secondary non-JSON run is then made solely to capture the
    /// human-readable compiler error as the diagnostic. Non-empty output
    /// that is not JSON is a contract violation and propagates as a
    /// typed error instead of being swallowed.
    #[instrument(skip(self, source), fields(artifact = %artifact_rel.display()))]
    pub async fn analyze(
        &self,
        artifact_rel: &Path,
        source: &str,
    ) -> Result<ToolOutput, AnalysisError> {
        let _guard = self.sequence.lock().await;
        self.ensure_running().await?;

        let version = resolve_solc_version(source);
        debug!(%version, "selecting compiler toolchain");
        for step in [
            vec!["solc-select", "install", version.as_str()],
            vec!["solc-select", "use", version.as_str()],
        ] {
            let out = self.exec_in_container(&step).await?;
            if !out.success {
                return Err(AnalysisError::CommandFailed {
                    command: step.join(" "),
                    detail: out.combined(),
                });
            }
        }

        let target = format!(
            "{}/{}",
            self.config.mount_point,
            artifact_rel.display()
        );
        // Slither exits non-zero when it finds issues; only the emitted
        // JSON decides success here.
        let scan = self
            .exec_in_container(&["slither", &target, "--json", "-"])
            .await?;
        let stdout = scan.stdout.trim().to_string();

        if stdout.is_empty() {
            debug!("empty tool output, capturing compiler diagnostic");
            let fallback = self.exec_in_container(&["slither", &target]).await?;
            return Ok(ToolOutput {
                stdout,
                diagnostic: Some(fallback.combined()),
                interface_json: None,
            });
        }

        if serde_json::from_str::<serde_json::Value>(&stdout).is_err() {
            let snippet: String = stdout.chars().take(200).collect();
            return Err(AnalysisError::MalformedOutput { snippet });
        }

        let interface = self
            .exec_in_container(&["solc", "--combined-json", "abi", &target])
            .await?;
        let interface_json = interface.success.then(|| interface.stdout);

        Ok(ToolOutput {
            stdout,
            diagnostic: None,
            interface_json,
        })
    }
}
