// src/executor/mod.rs — Container build/run capability

pub mod docker;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

pub use docker::DockerCli;

/// Result of building an image. A failed build is a normal outcome, not an
/// executor error.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub success: bool,
    pub log_tail: String,
}

/// Result of running a built image once.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// `None` when the process was killed or timed out.
    pub exit_code: Option<i32>,
    pub output: String,
    pub timed_out: bool,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Arguments passed to the container on `run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// The image's own CMD/ENTRYPOINT.
    Default,
    Args(Vec<String>),
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Invocation::Default => write!(f, "<default>"),
            Invocation::Args(args) => write!(f, "{}", args.join(" ")),
        }
    }
}

/// The container runtime itself is missing or broken. Never retried.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutorError {
    #[error("Container executor unavailable: {0}")]
    Unavailable(String),
}

/// Builds images from a context directory and runs them.
#[async_trait]
pub trait BuildExecutor: Send + Sync {
    fn name(&self) -> &str;

    /// Liveness check before the first paid call.
    async fn probe(&self) -> Result<(), ExecutorError>;

    async fn build(&self, context_dir: &Path, tag: &str) -> Result<BuildReport, ExecutorError>;

    async fn run(
        &self,
        image: &str,
        invocation: &Invocation,
        timeout: Duration,
    ) -> Result<RunReport, ExecutorError>;

    async fn remove_image(&self, tag: &str) -> Result<(), ExecutorError>;
}
