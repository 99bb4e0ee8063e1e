// src/infra/errors.rs — Error types for dockersmith

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DockersmithError {
    // Input errors (reported before any paid call)
    #[error("Script '{path}' is not usable: {reason}")]
    InvalidScript { path: PathBuf, reason: String },

    #[error("Output directory '{path}' is outside the allowed root '{root}'")]
    UnsafeOutputPath { path: PathBuf, root: PathBuf },

    // Accounting
    #[error("Invalid cost for '{label}': {amount}")]
    InvalidCost { label: String, amount: f64 },

    // Artifact store
    #[error("Script was already copied into the build context as '{name}'")]
    ScriptAlreadyCopied { name: String },

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DockersmithError {
    /// Input errors are detected before the loop starts and never cost anything.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            DockersmithError::InvalidScript { .. } | DockersmithError::UnsafeOutputPath { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DockersmithError>;
