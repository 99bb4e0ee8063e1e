// src/cli/run.rs — Default command: containerize one script

use std::path::PathBuf;
use std::sync::Arc;

use super::Cli;
use crate::analyzer::ScriptAnalyzer;
use crate::core::artifacts::{OutputPolicy, DOCKERFILE_NAME};
use crate::core::cancel::CancelSignal;
use crate::core::controller::RefinementController;
use crate::core::types::{ControllerConfig, ValidationStrictness, WorkflowResult};
use crate::executor::DockerCli;
use crate::infra::config::{Config, GenerationConfig};
use crate::provider::{OpenAiGenerator, RetryGenerator};
use crate::util::truncate_str;

/// A finished run plus where its artifacts went.
pub struct RunOutcome {
    pub result: WorkflowResult,
    pub output_dir: PathBuf,
}

/// Fold command-line flags into the loaded configuration.
pub fn apply_overrides(cli: &Cli, config: &mut Config) {
    if let Some(budget) = cli.budget {
        config.refinement.budget_usd = budget;
    }
    if let Some(max) = cli.max_attempts {
        config.refinement.max_attempts = max;
    }
    if let Some(model) = &cli.model {
        config.generation.model = model.clone();
    }
    if cli.strict {
        config.refinement.strictness = ValidationStrictness::Strict;
    }
    if let Some(expected) = &cli.expected_output {
        config.refinement.strictness = ValidationStrictness::Strict;
        config.refinement.expected_output = Some(expected.clone());
    }
}

/// `--api-key`, then the configured environment variable. Custom endpoints
/// (local servers) may run without a key.
pub fn resolve_api_key(cli: &Cli, generation: &GenerationConfig) -> anyhow::Result<String> {
    if let Some(key) = &cli.api_key {
        return Ok(key.clone());
    }
    if let Ok(key) = std::env::var(&generation.api_key_env) {
        if !key.trim().is_empty() {
            return Ok(key);
        }
    }
    if !generation.api_base.contains("api.openai.com") {
        return Ok(String::new());
    }
    anyhow::bail!(
        "No API key: set {} or pass --api-key",
        generation.api_key_env
    )
}

/// Analyze the script and drive the refinement loop to completion.
pub async fn run_generate(
    cli: &Cli,
    config: &Config,
    cancel: CancelSignal,
) -> anyhow::Result<RunOutcome> {
    config.validate()?;

    let analyzer = ScriptAnalyzer::new();
    let mut profile = analyzer.analyze(&cli.script)?;
    if let Some(example) = &cli.example {
        profile = profile.with_example_usage(example.clone());
    }

    // Unsupported scripts stop before any call, so they need no credentials.
    let api_key = if profile.language.is_supported() {
        resolve_api_key(cli, &config.generation)?
    } else {
        String::new()
    };
    let provider = Arc::new(RetryGenerator::new(Arc::new(OpenAiGenerator::from_config(
        api_key,
        &config.generation,
    ))));
    let executor = Arc::new(DockerCli::from_config(&config.docker));

    let policy = OutputPolicy::new(config.output_root()?);
    let output_dir = cli
        .output
        .clone()
        .unwrap_or_else(|| config.output.default_dir.clone());

    let mut controller = RefinementController::new(
        provider,
        executor,
        ControllerConfig::from_config(&config.refinement, &config.docker),
        config.refinement.budget_usd,
    )
    .with_cancel(cancel);
    if !cli.quiet {
        controller = controller.with_progress(super::progress::terminal_progress());
        eprintln!(
            "[start] {} | model: {} | budget: ${:.2} | attempts: {}",
            cli.script.display(),
            config.generation.model,
            config.refinement.budget_usd,
            config.refinement.max_attempts
        );
    }

    let result = controller.run(&profile, &output_dir, &policy).await?;
    Ok(RunOutcome { result, output_dir })
}

/// Human-readable or JSON summary for stdout.
pub fn render(outcome: &RunOutcome, json: bool) -> anyhow::Result<String> {
    let result = &outcome.result;
    if json {
        return Ok(serde_json::to_string_pretty(result)?);
    }

    let mut out = String::new();
    if result.success {
        out.push_str(&format!(
            "Dockerfile ready: {}\n",
            outcome.output_dir.join(DOCKERFILE_NAME).display()
        ));
    } else {
        out.push_str(&format!("Failed: {}\n", result.reason));
        if result.final_dockerfile.is_some() {
            out.push_str(&format!(
                "Last Dockerfile: {}\n",
                outcome.output_dir.join(DOCKERFILE_NAME).display()
            ));
        }
    }
    out.push_str(&format!(
        "Cost: ${:.4} of ${:.4} over {} attempt(s)\n",
        result.total_cost,
        result.budget_ceiling,
        result.attempts.len()
    ));
    for attempt in &result.attempts {
        let last_line = attempt.log_excerpt.lines().last().unwrap_or("");
        out.push_str(&format!(
            "  #{} {:<18} ${:.4}  {}\n",
            attempt.index + 1,
            attempt.outcome.to_string(),
            attempt.generation_cost,
            truncate_str(last_line.trim(), 80)
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Attempt, AttemptOutcome, TerminalReason};
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["dockersmith"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    // ─── Overrides ──────────────────────────────────────────────

    #[test]
    fn test_overrides_applied() {
        let mut config = Config::default();
        apply_overrides(
            &cli(&["app.py", "--budget", "0.5", "--max-attempts", "2", "-m", "gpt-4o"]),
            &mut config,
        );
        assert!((config.refinement.budget_usd - 0.5).abs() < 1e-9);
        assert_eq!(config.refinement.max_attempts, 2);
        assert_eq!(config.generation.model, "gpt-4o");
        assert_eq!(config.refinement.strictness, ValidationStrictness::Advisory);
    }

    #[test]
    fn test_expected_output_implies_strict() {
        let mut config = Config::default();
        apply_overrides(&cli(&["app.py", "--expected-output", "ok"]), &mut config);
        assert_eq!(config.refinement.strictness, ValidationStrictness::Strict);
        assert_eq!(config.refinement.expected_output.as_deref(), Some("ok"));
    }

    #[test]
    fn test_no_overrides_keeps_config() {
        let mut config = Config::default();
        config.refinement.budget_usd = 0.3;
        apply_overrides(&cli(&["app.py"]), &mut config);
        assert!((config.refinement.budget_usd - 0.3).abs() < 1e-9);
    }

    // ─── API key ────────────────────────────────────────────────

    #[test]
    fn test_api_key_flag_wins() {
        let generation = GenerationConfig {
            api_key_env: "DOCKERSMITH_TEST_UNSET_KEY".into(),
            ..Default::default()
        };
        let key = resolve_api_key(&cli(&["a.py", "--api-key", "sk-flag"]), &generation).unwrap();
        assert_eq!(key, "sk-flag");
    }

    #[test]
    fn test_missing_key_for_openai_is_error() {
        let generation = GenerationConfig {
            api_key_env: "DOCKERSMITH_TEST_UNSET_KEY".into(),
            ..Default::default()
        };
        let err = resolve_api_key(&cli(&["a.py"]), &generation).unwrap_err();
        assert!(err.to_string().contains("DOCKERSMITH_TEST_UNSET_KEY"));
    }

    #[test]
    fn test_local_endpoint_needs_no_key() {
        let generation = GenerationConfig {
            api_key_env: "DOCKERSMITH_TEST_UNSET_KEY".into(),
            api_base: "http://localhost:11434/v1".into(),
            ..Default::default()
        };
        assert_eq!(resolve_api_key(&cli(&["a.py"]), &generation).unwrap(), "");
    }

    // ─── Run ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_unsupported_script_rejected_without_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("notes.txt");
        std::fs::write(&script, "shopping list\n- milk\n- eggs\n").unwrap();
        let out = dir.path().join("out");

        let mut config = Config::default();
        config.generation.api_key_env = "DOCKERSMITH_TEST_UNSET_KEY".into();
        config.output.root = Some(dir.path().to_path_buf());
        let args = cli(&[
            script.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "--quiet",
        ]);

        let outcome = run_generate(&args, &config, CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(outcome.result.reason, TerminalReason::UnsupportedLanguage);
        assert_eq!(outcome.result.total_cost, 0.0);
        assert!(outcome.result.attempts.is_empty());
    }

    // ─── Rendering ──────────────────────────────────────────────

    fn outcome(success: bool) -> RunOutcome {
        let attempt = Attempt {
            index: 0,
            dockerfile: "FROM python:3.11-slim\n".into(),
            generation_cost: 0.03,
            outcome: if success {
                AttemptOutcome::Succeeded
            } else {
                AttemptOutcome::BuildFailed
            },
            log_excerpt: "step 1\nERROR: pip failed".into(),
            cumulative_cost: 0.03,
        };
        RunOutcome {
            result: WorkflowResult {
                success,
                final_dockerfile: Some(attempt.dockerfile.clone()),
                total_cost: 0.03,
                budget_ceiling: 0.1,
                attempts: vec![attempt],
                reason: if success {
                    TerminalReason::Succeeded
                } else {
                    TerminalReason::MaxAttemptsExceeded
                },
                ledger: vec![],
            },
            output_dir: PathBuf::from("out"),
        }
    }

    #[test]
    fn test_render_success() {
        let text = render(&outcome(true), false).unwrap();
        assert!(text.starts_with("Dockerfile ready: out/Dockerfile"));
        assert!(text.contains("Cost: $0.0300 of $0.1000 over 1 attempt(s)"));
    }

    #[test]
    fn test_render_failure() {
        let text = render(&outcome(false), false).unwrap();
        assert!(text.starts_with("Failed: max attempts exceeded"));
        assert!(text.contains("Last Dockerfile: out/Dockerfile"));
        assert!(text.contains("ERROR: pip failed"));
    }

    #[test]
    fn test_render_json() {
        let text = render(&outcome(true), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["reason"], "succeeded");
        assert_eq!(value["attempts"][0]["outcome"], "succeeded");
    }
}
