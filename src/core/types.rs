// src/core/types.rs — Core domain types

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::budget::LedgerEntry;

/// Script languages the analyzer can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    Bash,
    Unknown,
}

impl Language {
    pub fn is_supported(&self) -> bool {
        !matches!(self, Language::Unknown)
    }

    /// Interpreter used to invoke a script of this language.
    pub fn interpreter(&self) -> Option<&'static str> {
        match self {
            Language::Python => Some("python"),
            Language::JavaScript => Some("node"),
            Language::Bash => Some("bash"),
            Language::Unknown => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
            Language::JavaScript => write!(f, "javascript"),
            Language::Bash => write!(f, "bash"),
            Language::Unknown => write!(f, "unknown"),
        }
    }
}

/// What an analyzer found out about the subject script. Read-only for the
/// controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptProfile {
    pub script_path: PathBuf,
    pub language: Language,
    /// Declared or inferred third-party dependencies, in order of first use.
    pub dependencies: Vec<String>,
    /// How the script is started inside the image, e.g. `python app.py`.
    pub entry_invocation: String,
    pub example_usage: Option<String>,
    pub runtime_version: Option<String>,
    pub base_image: Option<String>,
}

impl ScriptProfile {
    pub fn new(script_path: impl Into<PathBuf>, language: Language) -> Self {
        let script_path = script_path.into();
        let file_name = script_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let entry_invocation = match language.interpreter() {
            Some(interp) => format!("{} {}", interp, file_name),
            None => format!("./{}", file_name),
        };
        Self {
            script_path,
            language,
            dependencies: Vec::new(),
            entry_invocation,
            example_usage: None,
            runtime_version: None,
            base_image: None,
        }
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_example_usage(mut self, usage: impl Into<String>) -> Self {
        self.example_usage = Some(usage.into());
        self
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    /// File name of the script as it appears in the build context.
    pub fn script_name(&self) -> Option<String> {
        self.script_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }
}

/// How one generate-build-validate cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    /// The provider returned unusable output. The Dockerfile text is empty.
    GenerationFailed,
    BuildFailed,
    ValidationFailed,
    /// The run stopped before this attempt could be built or validated.
    Abandoned,
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptOutcome::Succeeded => write!(f, "succeeded"),
            AttemptOutcome::GenerationFailed => write!(f, "generation-failed"),
            AttemptOutcome::BuildFailed => write!(f, "build-failed"),
            AttemptOutcome::ValidationFailed => write!(f, "validation-failed"),
            AttemptOutcome::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// One recorded cycle. Immutable once pushed into the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub index: u32,
    pub dockerfile: String,
    pub generation_cost: f64,
    pub outcome: AttemptOutcome,
    /// Tail of the build or validation log, or the generation error.
    pub log_excerpt: String,
    pub cumulative_cost: f64,
}

impl Attempt {
    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Succeeded
    }

    pub fn has_dockerfile(&self) -> bool {
        !self.dockerfile.is_empty()
    }
}

/// Why a run stopped. Exactly one per result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    Succeeded,
    MaxAttemptsExceeded,
    BudgetExhausted,
    ExecutorUnavailable,
    UnsupportedLanguage,
    UnsafeOutputPath,
    /// The generation provider refused service (e.g. bad credentials).
    ProviderUnavailable,
    Cancelled,
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalReason::Succeeded => write!(f, "succeeded"),
            TerminalReason::MaxAttemptsExceeded => write!(f, "max attempts exceeded"),
            TerminalReason::BudgetExhausted => write!(f, "budget exhausted"),
            TerminalReason::ExecutorUnavailable => write!(f, "executor unavailable"),
            TerminalReason::UnsupportedLanguage => write!(f, "unsupported language"),
            TerminalReason::UnsafeOutputPath => write!(f, "unsafe output path"),
            TerminalReason::ProviderUnavailable => write!(f, "provider unavailable"),
            TerminalReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal value handed back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub success: bool,
    /// Last Dockerfile produced, validated or not.
    pub final_dockerfile: Option<String>,
    pub total_cost: f64,
    pub budget_ceiling: f64,
    pub attempts: Vec<Attempt>,
    pub reason: TerminalReason,
    pub ledger: Vec<LedgerEntry>,
}

impl WorkflowResult {
    /// Result for a run that stopped before any attempt was made.
    pub fn rejected(reason: TerminalReason, budget_ceiling: f64) -> Self {
        Self {
            success: false,
            final_dockerfile: None,
            total_cost: 0.0,
            budget_ceiling,
            attempts: Vec::new(),
            reason,
            ledger: Vec::new(),
        }
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }
}

/// Controller states. `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Analyzing,
    Generating,
    Building,
    Validating,
    Refining,
    Succeeded,
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Analyzing => write!(f, "analyze"),
            Phase::Generating => write!(f, "generate"),
            Phase::Building => write!(f, "build"),
            Phase::Validating => write!(f, "validate"),
            Phase::Refining => write!(f, "refine"),
            Phase::Succeeded => write!(f, "succeeded"),
            Phase::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle notifications for front ends.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    PhaseEntered {
        phase: Phase,
        attempt: u32,
    },
    AttemptRecorded {
        index: u32,
        outcome: AttemptOutcome,
        cost: f64,
        cumulative_cost: f64,
    },
    Finished {
        reason: TerminalReason,
        attempts: usize,
        total_cost: f64,
    },
}

/// How strictly a built image is judged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStrictness {
    /// Example output is evidence only; a clean exit of the example or the
    /// default invocation passes.
    #[default]
    Advisory,
    /// The example invocation itself must exit cleanly and, when configured,
    /// print the expected output.
    Strict,
}

/// Configuration for the refinement controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub max_attempts: u32,
    pub strictness: ValidationStrictness,
    pub validation_timeout: Duration,
    pub expected_output: Option<String>,
    pub keep_images: bool,
    /// Maximum bytes of build/run output kept per attempt.
    pub log_excerpt_bytes: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            strictness: ValidationStrictness::Advisory,
            validation_timeout: Duration::from_secs(30),
            expected_output: None,
            keep_images: false,
            log_excerpt_bytes: 4000,
        }
    }
}

impl ControllerConfig {
    pub fn from_config(
        refinement: &crate::infra::config::RefinementConfig,
        docker: &crate::infra::config::DockerConfig,
    ) -> Self {
        Self {
            max_attempts: refinement.max_attempts,
            strictness: refinement.strictness,
            validation_timeout: Duration::from_secs(refinement.validation_timeout_secs),
            expected_output: refinement.expected_output.clone(),
            keep_images: docker.keep_images,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── Language ───────────────────────────────────────────────

    #[test]
    fn test_language_support() {
        assert!(Language::Python.is_supported());
        assert!(Language::JavaScript.is_supported());
        assert!(Language::Bash.is_supported());
        assert!(!Language::Unknown.is_supported());
    }

    #[test]
    fn test_language_serde_lowercase() {
        let json = serde_json::to_string(&Language::JavaScript).unwrap();
        assert_eq!(json, "\"javascript\"");
        let parsed: Language = serde_json::from_str("\"bash\"").unwrap();
        assert_eq!(parsed, Language::Bash);
    }

    // ─── ScriptProfile ──────────────────────────────────────────

    #[test]
    fn test_profile_entry_invocation() {
        let p = ScriptProfile::new("/work/scripts/app.py", Language::Python);
        assert_eq!(p.entry_invocation, "python app.py");
        assert_eq!(p.script_name().as_deref(), Some("app.py"));

        let p = ScriptProfile::new("run.sh", Language::Bash);
        assert_eq!(p.entry_invocation, "bash run.sh");

        let p = ScriptProfile::new("tool", Language::Unknown);
        assert_eq!(p.entry_invocation, "./tool");
    }

    #[test]
    fn test_profile_builders() {
        let p = ScriptProfile::new("index.js", Language::JavaScript)
            .with_dependencies(vec!["axios".into()])
            .with_example_usage("node index.js hello");
        assert_eq!(p.dependencies, vec!["axios".to_string()]);
        assert_eq!(p.example_usage.as_deref(), Some("node index.js hello"));
    }

    // ─── Attempt / result ───────────────────────────────────────

    #[test]
    fn test_attempt_helpers() {
        let a = Attempt {
            index: 0,
            dockerfile: String::new(),
            generation_cost: 0.01,
            outcome: AttemptOutcome::GenerationFailed,
            log_excerpt: "no FROM line".into(),
            cumulative_cost: 0.01,
        };
        assert!(!a.is_success());
        assert!(!a.has_dockerfile());
    }

    #[test]
    fn test_rejected_result_is_empty() {
        let r = WorkflowResult::rejected(TerminalReason::UnsupportedLanguage, 0.1);
        assert!(!r.success);
        assert_eq!(r.attempt_count(), 0);
        assert_eq!(r.total_cost, 0.0);
        assert!(r.final_dockerfile.is_none());
        assert!(r.ledger.is_empty());
    }

    #[test]
    fn test_terminal_reason_display() {
        assert_eq!(TerminalReason::BudgetExhausted.to_string(), "budget exhausted");
        assert_eq!(
            TerminalReason::MaxAttemptsExceeded.to_string(),
            "max attempts exceeded"
        );
        assert_eq!(AttemptOutcome::BuildFailed.to_string(), "build-failed");
    }

    #[test]
    fn test_result_serializes_reason_snake_case() {
        let r = WorkflowResult::rejected(TerminalReason::UnsafeOutputPath, 0.1);
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"reason\":\"unsafe_output_path\""));
    }

    // ─── ControllerConfig ───────────────────────────────────────

    #[test]
    fn test_controller_config_defaults() {
        let cfg = ControllerConfig::default();
        assert_eq!(cfg.max_attempts, 4);
        assert_eq!(cfg.strictness, ValidationStrictness::Advisory);
        assert_eq!(cfg.validation_timeout, Duration::from_secs(30));
        assert!(cfg.expected_output.is_none());
    }

    #[test]
    fn test_controller_config_from_config() {
        let refinement = crate::infra::config::RefinementConfig {
            max_attempts: 2,
            budget_usd: 1.0,
            strictness: ValidationStrictness::Strict,
            validation_timeout_secs: 5,
            expected_output: Some("ok".into()),
        };
        let docker = crate::infra::config::DockerConfig {
            keep_images: true,
            ..Default::default()
        };
        let cfg = ControllerConfig::from_config(&refinement, &docker);
        assert_eq!(cfg.max_attempts, 2);
        assert_eq!(cfg.strictness, ValidationStrictness::Strict);
        assert_eq!(cfg.validation_timeout, Duration::from_secs(5));
        assert_eq!(cfg.expected_output.as_deref(), Some("ok"));
        assert!(cfg.keep_images);
    }
}
