// src/executor/docker.rs — BuildExecutor backed by the docker CLI
//
// Every child is spawned with kill_on_drop so a cancelled or timed-out call
// takes its process down with it. Validation containers are named and
// force-removed on timeout or cancellation, since killing the client does
// not stop them.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{BuildExecutor, BuildReport, ExecutorError, Invocation, RunReport};
use crate::infra::config::DockerConfig;
use crate::util::tail_str;

/// Bytes of build/run output kept.
const OUTPUT_TAIL_BYTES: usize = 8000;

/// Output fragments meaning the daemon, not the Dockerfile, is at fault.
const DAEMON_DOWN_MARKERS: &[&str] = &[
    "Cannot connect to the Docker daemon",
    "Is the docker daemon running",
    "error during connect",
    "permission denied while trying to connect to the Docker daemon",
];

pub struct DockerCli {
    binary: String,
    build_timeout: Duration,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>, build_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            build_timeout,
        }
    }

    pub fn from_config(config: &DockerConfig) -> Self {
        Self::new(
            config.binary.clone(),
            Duration::from_secs(config.build_timeout_secs),
        )
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run to completion within `timeout`. `Ok(None)` means it timed out.
    async fn exec(
        &self,
        mut cmd: Command,
        timeout: Duration,
    ) -> Result<Option<(Option<i32>, String)>, ExecutorError> {
        let child = cmd.spawn().map_err(|e| {
            ExecutorError::Unavailable(format!("failed to start '{}': {}", self.binary, e))
        })?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let combined = format!("{}{}", stdout, stderr);
                Ok(Some((output.status.code(), combined)))
            }
            Ok(Err(e)) => Err(ExecutorError::Unavailable(format!(
                "'{}' did not complete: {}",
                self.binary, e
            ))),
            Err(_) => Ok(None),
        }
    }

    /// Force-remove a validation container, best effort.
    async fn remove_container(&self, name: &str) {
        let mut cmd = self.command();
        cmd.args(["rm", "-f", name]);
        match self.exec(cmd, Duration::from_secs(30)).await {
            Ok(Some((Some(0), _))) => tracing::debug!("Removed container {}", name),
            Ok(Some((_, out))) => tracing::debug!("docker rm {} failed: {}", name, out.trim()),
            Ok(None) => tracing::warn!("docker rm {} timed out", name),
            Err(e) => tracing::warn!("docker rm {}: {}", name, e),
        }
    }
}

/// Container name for one validation run of `image`.
fn container_name(image: &str) -> String {
    let base: String = image
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let base = base.trim_start_matches(['-', '_', '.']);
    let id = uuid::Uuid::new_v4().simple().to_string();
    if base.is_empty() {
        format!("dockersmith-run-{}", &id[..8])
    } else {
        format!("{}-run-{}", base, &id[..8])
    }
}

/// Removes a named container when a run is abandoned mid-flight, e.g. when
/// the caller drops the future on cancellation.
struct ContainerGuard {
    binary: String,
    name: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(binary: &str, name: &str) -> Self {
        Self {
            binary: binary.to_string(),
            name: name.to_string(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::debug!("Reaping abandoned container {}", self.name);
        let mut cmd = Command::new(&self.binary);
        cmd.args(["rm", "-f", self.name.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let name = self.name.clone();
                handle.spawn(async move {
                    if let Err(e) = cmd.status().await {
                        tracing::warn!("docker rm {}: {}", name, e);
                    }
                });
            }
            Err(_) => {
                if let Err(e) = cmd.as_std_mut().status() {
                    tracing::warn!("docker rm {}: {}", self.name, e);
                }
            }
        }
    }
}

fn daemon_unreachable(output: &str) -> bool {
    DAEMON_DOWN_MARKERS.iter().any(|m| output.contains(m))
}

#[async_trait]
impl BuildExecutor for DockerCli {
    fn name(&self) -> &str {
        "docker"
    }

    async fn probe(&self) -> Result<(), ExecutorError> {
        let mut cmd = self.command();
        cmd.args(["version", "--format", "{{.Server.Version}}"]);
        match self.exec(cmd, Duration::from_secs(15)).await? {
            Some((Some(0), out)) => {
                tracing::debug!("docker server version {}", out.trim());
                Ok(())
            }
            Some((_, out)) => Err(ExecutorError::Unavailable(
                tail_str(out.trim(), 500).to_string(),
            )),
            None => Err(ExecutorError::Unavailable(
                "docker version timed out".into(),
            )),
        }
    }

    async fn build(&self, context_dir: &Path, tag: &str) -> Result<BuildReport, ExecutorError> {
        let mut cmd = self.command();
        cmd.arg("build").arg("-t").arg(tag).arg(context_dir);
        tracing::info!("docker build -t {} {}", tag, context_dir.display());

        match self.exec(cmd, self.build_timeout).await? {
            Some((code, out)) => {
                if code != Some(0) && daemon_unreachable(&out) {
                    return Err(ExecutorError::Unavailable(
                        tail_str(out.trim(), 500).to_string(),
                    ));
                }
                Ok(BuildReport {
                    success: code == Some(0),
                    log_tail: tail_str(&out, OUTPUT_TAIL_BYTES).to_string(),
                })
            }
            None => Ok(BuildReport {
                success: false,
                log_tail: format!(
                    "build timed out after {}s",
                    self.build_timeout.as_secs()
                ),
            }),
        }
    }

    async fn run(
        &self,
        image: &str,
        invocation: &Invocation,
        timeout: Duration,
    ) -> Result<RunReport, ExecutorError> {
        let name = container_name(image);
        let mut cmd = self.command();
        cmd.args(["run", "--rm", "--name", name.as_str(), image]);
        if let Invocation::Args(args) = invocation {
            cmd.args(args);
        }
        tracing::info!("docker run --rm --name {} {} {}", name, image, invocation);

        // Killing the client leaves the container running under the daemon.
        let mut guard = ContainerGuard::new(&self.binary, &name);
        let outcome = match self.exec(cmd, timeout).await {
            Ok(outcome) => outcome,
            Err(e) => {
                guard.disarm();
                return Err(e);
            }
        };

        match outcome {
            Some((code, out)) => {
                guard.disarm();
                if code != Some(0) && daemon_unreachable(&out) {
                    return Err(ExecutorError::Unavailable(
                        tail_str(out.trim(), 500).to_string(),
                    ));
                }
                Ok(RunReport {
                    exit_code: code,
                    output: tail_str(&out, OUTPUT_TAIL_BYTES).to_string(),
                    timed_out: false,
                })
            }
            None => {
                guard.disarm();
                self.remove_container(&name).await;
                Ok(RunReport {
                    exit_code: None,
                    output: format!("run timed out after {}s", timeout.as_secs()),
                    timed_out: true,
                })
            }
        }
    }

    async fn remove_image(&self, tag: &str) -> Result<(), ExecutorError> {
        let mut cmd = self.command();
        cmd.args(["rmi", "-f", tag]);
        match self.exec(cmd, Duration::from_secs(60)).await? {
            Some((Some(0), _)) => Ok(()),
            Some((_, out)) => {
                tracing::debug!("docker rmi {} failed: {}", tag, out.trim());
                Ok(())
            }
            None => Ok(()),
        }
    }
}
