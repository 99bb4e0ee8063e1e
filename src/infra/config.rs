// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::types::ValidationStrictness;
use crate::infra::errors::{DockersmithError, Result};
use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub refinement: RefinementConfig,

    #[serde(default)]
    pub docker: DockerConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub api_base: String,
    /// Environment variable holding the API key when `--api-key` is not given.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            api_base: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            max_tokens: 2000,
            temperature: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    /// Total generate-build-validate cycles, the first generation included.
    pub max_attempts: u32,
    pub budget_usd: f64,
    pub strictness: ValidationStrictness,
    pub validation_timeout_secs: u64,
    pub expected_output: Option<String>,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            budget_usd: 0.10,
            strictness: ValidationStrictness::Advisory,
            validation_timeout_secs: 30,
            expected_output: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub binary: String,
    pub build_timeout_secs: u64,
    /// Keep validated images instead of removing them after each attempt.
    pub keep_images: bool,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: "docker".into(),
            build_timeout_secs: 600,
            keep_images: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output directories must resolve inside this root. Defaults to the
    /// current working directory.
    pub root: Option<PathBuf>,
    pub default_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: None,
            default_dir: PathBuf::from("./docker_output"),
        }
    }
}

impl Config {
    /// Load config from the platform config file, falling back to defaults.
    pub fn load() -> Result<Self> {
        match paths::config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| DockersmithError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.refinement.budget_usd.is_finite() || self.refinement.budget_usd <= 0.0 {
            return Err(DockersmithError::Config(
                "refinement.budget_usd must be greater than 0".into(),
            ));
        }
        if self.refinement.max_attempts == 0 {
            return Err(DockersmithError::Config(
                "refinement.max_attempts must be at least 1".into(),
            ));
        }
        if self.refinement.validation_timeout_secs == 0 {
            return Err(DockersmithError::Config(
                "refinement.validation_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Root that output directories must stay inside.
    pub fn output_root(&self) -> Result<PathBuf> {
        match &self.output.root {
            Some(root) => Ok(root.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reasonable() {
        let c = Config::default();
        assert_eq!(c.refinement.max_attempts, 4);
        assert!((c.refinement.budget_usd - 0.10).abs() < 0.0001);
        assert_eq!(c.refinement.strictness, ValidationStrictness::Advisory);
        assert_eq!(c.refinement.validation_timeout_secs, 30);
        assert_eq!(c.generation.model, "gpt-4o-mini");
        assert_eq!(c.docker.binary, "docker");
        assert!(!c.docker.keep_images);
        assert_eq!(c.output.default_dir, PathBuf::from("./docker_output"));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.refinement.max_attempts, 4);
        assert_eq!(config.generation.max_tokens, 2000);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[generation]
model = "gpt-4.1-mini"
api_base = "http://localhost:8080/v1"
max_tokens = 1500
temperature = 0.0

[refinement]
max_attempts = 2
budget_usd = 0.5
strictness = "strict"
validation_timeout_secs = 10
expected_output = "hello"

[docker]
binary = "podman"
build_timeout_secs = 120
keep_images = true

[output]
root = "/tmp/work"
default_dir = "out"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.generation.model, "gpt-4.1-mini");
        assert_eq!(config.generation.api_base, "http://localhost:8080/v1");
        assert_eq!(config.generation.max_tokens, 1500);
        assert_eq!(config.refinement.max_attempts, 2);
        assert!((config.refinement.budget_usd - 0.5).abs() < 0.0001);
        assert_eq!(config.refinement.strictness, ValidationStrictness::Strict);
        assert_eq!(config.refinement.expected_output.as_deref(), Some("hello"));
        assert_eq!(config.docker.binary, "podman");
        assert!(config.docker.keep_images);
        assert_eq!(config.output.root, Some(PathBuf::from("/tmp/work")));
        assert_eq!(config.output_root().unwrap(), PathBuf::from("/tmp/work"));
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str("[refinement]\nbudget_usd = 1.0\n").unwrap();
        assert!((config.refinement.budget_usd - 1.0).abs() < 0.0001);
        assert_eq!(config.refinement.max_attempts, 4);
        assert_eq!(config.refinement.validation_timeout_secs, 30);
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let mut c = Config::default();
        c.refinement.budget_usd = 0.0;
        assert!(matches!(c.validate(), Err(DockersmithError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut c = Config::default();
        c.refinement.max_attempts = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(
            deserialized.refinement.max_attempts,
            config.refinement.max_attempts
        );
        assert_eq!(deserialized.generation.model, config.generation.model);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load_from(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(DockersmithError::Io(_))));
    }

    #[test]
    fn test_load_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[refinement\nbroken").unwrap();
        let result = Config::load_from(&path);
        assert!(matches!(result, Err(DockersmithError::Config(_))));
    }
}
