// src/core/controller.rs — Generate, build, validate, refine

use std::path::Path;
use std::sync::Arc;

use super::artifacts::{ArtifactStore, OutputPolicy};
use super::budget::{LedgerEntry, SharedBudget};
use super::cancel::CancelSignal;
use super::safety::SafetyChecker;
use super::types::*;
use super::validation::validate_image;
use crate::executor::{BuildExecutor, ExecutorError};
use crate::infra::errors::{DockersmithError, Result};
use crate::provider::{GenerationError, GenerationProvider, GenerationRequest};
use crate::util::tail_str;

/// Where a run's money comes from.
enum BudgetSource {
    /// A fresh tracker with this ceiling for every run.
    PerRun(f64),
    Shared(SharedBudget),
}

/// Controller states that carry data. `Analyzing` is handled before the loop
/// because it decides whether a build context exists at all.
#[derive(Debug)]
enum Stage {
    Generating,
    Building { dockerfile: String, cost: f64 },
    Validating { dockerfile: String, cost: f64, image: String },
    Refining,
    Done(TerminalReason),
}

/// Mutable state of one run. Dropped when the run ends.
struct RunState<'a> {
    profile: &'a ScriptProfile,
    store: ArtifactStore,
    budget: SharedBudget,
    attempts: Vec<Attempt>,
    /// Spend of this run only, which differs from the tracker's total when
    /// the budget is shared.
    spent: f64,
    ledger: Vec<LedgerEntry>,
    last_dockerfile: Option<String>,
}

impl RunState<'_> {
    fn next_index(&self) -> u32 {
        self.attempts.len() as u32
    }
}

/// Drives one script from analysis to a validated Dockerfile, or to a
/// structural stop: attempt ceiling, budget ceiling, or a fatal fault.
pub struct RefinementController {
    provider: Arc<dyn GenerationProvider>,
    executor: Arc<dyn BuildExecutor>,
    config: ControllerConfig,
    safety: SafetyChecker,
    budget: BudgetSource,
    cancel: CancelSignal,
    on_progress: Option<Box<dyn Fn(ProgressEvent) + Send + Sync>>,
}

impl RefinementController {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        executor: Arc<dyn BuildExecutor>,
        config: ControllerConfig,
        budget_ceiling: f64,
    ) -> Self {
        Self {
            provider,
            executor,
            safety: SafetyChecker::from_config(&config),
            config,
            budget: BudgetSource::PerRun(budget_ceiling),
            cancel: CancelSignal::never(),
            on_progress: None,
        }
    }

    /// Draw on a tracker shared with other runs instead of a fresh one.
    pub fn with_budget(mut self, budget: SharedBudget) -> Self {
        self.budget = BudgetSource::Shared(budget);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set a callback for lifecycle events.
    pub fn with_progress(mut self, cb: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(cb));
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(ref cb) = self.on_progress {
            cb(event);
        }
    }

    fn enter(&self, phase: Phase, attempt: u32) {
        tracing::debug!("→ {} (attempt {})", phase, attempt + 1);
        self.emit(ProgressEvent::PhaseEntered { phase, attempt });
    }

    fn ceiling(&self) -> f64 {
        match &self.budget {
            BudgetSource::PerRun(c) => *c,
            BudgetSource::Shared(b) => b.ceiling(),
        }
    }

    fn finish_early(&self, reason: TerminalReason) -> WorkflowResult {
        tracing::warn!("Run rejected before generation: {}", reason);
        self.emit(ProgressEvent::Finished {
            reason,
            attempts: 0,
            total_cost: 0.0,
        });
        WorkflowResult::rejected(reason, self.ceiling())
    }

    /// Run the loop for one script. Stage failures end up in the result;
    /// `Err` means the output directory itself could not be written.
    pub async fn run(
        &self,
        profile: &ScriptProfile,
        output_dir: &Path,
        policy: &OutputPolicy,
    ) -> Result<WorkflowResult> {
        self.enter(Phase::Analyzing, 0);

        let store = match self.analyze(profile, output_dir, policy).await? {
            Ok(store) => store,
            Err(reason) => return Ok(self.finish_early(reason)),
        };

        let budget = match &self.budget {
            BudgetSource::PerRun(ceiling) => SharedBudget::new(*ceiling),
            BudgetSource::Shared(shared) => shared.clone(),
        };

        let mut run = RunState {
            profile,
            store,
            budget,
            attempts: Vec::new(),
            spent: 0.0,
            ledger: Vec::new(),
            last_dockerfile: None,
        };

        let mut stage = Stage::Generating;
        let reason = loop {
            stage = match stage {
                Stage::Generating => self.generate(&mut run).await?,
                Stage::Building { dockerfile, cost } => {
                    self.build(&mut run, dockerfile, cost).await?
                }
                Stage::Validating {
                    dockerfile,
                    cost,
                    image,
                } => self.validate(&mut run, dockerfile, cost, image).await?,
                Stage::Refining => self.refine(&mut run)?,
                Stage::Done(reason) => break reason,
            };
        };

        self.enter(
            if reason == TerminalReason::Succeeded {
                Phase::Succeeded
            } else {
                Phase::Failed
            },
            run.next_index().saturating_sub(1),
        );

        let summary = format!(
            "result: {}\nattempts: {}\ncost: ${:.4} of ${:.4}",
            reason,
            run.attempts.len(),
            run.spent,
            run.budget.ceiling()
        );
        run.store.append_log(None, "finish", &summary)?;

        tracing::info!(
            "Finished: {} after {} attempt(s), ${:.4}",
            reason,
            run.attempts.len(),
            run.spent
        );
        self.emit(ProgressEvent::Finished {
            reason,
            attempts: run.attempts.len(),
            total_cost: run.spent,
        });

        Ok(WorkflowResult {
            success: reason == TerminalReason::Succeeded,
            final_dockerfile: run.last_dockerfile,
            total_cost: run.spent,
            budget_ceiling: run.budget.ceiling(),
            attempts: run.attempts,
            reason,
            ledger: run.ledger,
        })
    }

    // ─── Analyzing ──────────────────────────────────────────────

    /// Zero-cost checks. `Ok(Err(reason))` stops the run with no attempts.
    async fn analyze(
        &self,
        profile: &ScriptProfile,
        output_dir: &Path,
        policy: &OutputPolicy,
    ) -> Result<std::result::Result<ArtifactStore, TerminalReason>> {
        if !profile.language.is_supported() {
            return Ok(Err(TerminalReason::UnsupportedLanguage));
        }
        // A zero ceiling admits no attempt at all, not even the first paid one.
        if self.config.max_attempts == 0 {
            return Ok(Err(TerminalReason::MaxAttemptsExceeded));
        }

        let mut store = match ArtifactStore::open(output_dir, policy) {
            Ok(store) => store,
            Err(DockersmithError::UnsafeOutputPath { path, root }) => {
                tracing::warn!(
                    "Output directory {} is outside {}",
                    path.display(),
                    root.display()
                );
                return Ok(Err(TerminalReason::UnsafeOutputPath));
            }
            Err(e) => return Err(e),
        };

        store.copy_script(profile.script_path())?;
        store.write_dockerignore()?;

        let deps = if profile.dependencies.is_empty() {
            "none".to_string()
        } else {
            profile.dependencies.join(", ")
        };
        store.append_log(
            None,
            "analyze",
            &format!(
                "script: {}\nlanguage: {}\ndependencies: {}\nentry: {}\nexample: {}",
                profile.script_path().display(),
                profile.language,
                deps,
                profile.entry_invocation,
                profile.example_usage.as_deref().unwrap_or("none")
            ),
        )?;

        let probe = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(Err(TerminalReason::Cancelled)),
            probe = self.executor.probe() => probe,
        };
        if let Err(ExecutorError::Unavailable(message)) = probe {
            store.append_log(None, "probe", &message)?;
            return Ok(Err(TerminalReason::ExecutorUnavailable));
        }

        Ok(Ok(store))
    }

    // ─── Generating ─────────────────────────────────────────────

    async fn generate(&self, run: &mut RunState<'_>) -> Result<Stage> {
        let index = run.next_index();
        self.enter(Phase::Generating, index);

        if self.cancel.is_cancelled() {
            return Ok(Stage::Done(TerminalReason::Cancelled));
        }

        let request = GenerationRequest::new(run.profile.clone(), run.attempts.clone());
        let estimate = self.provider.estimate_cost(&request);
        if !run.budget.reserve(estimate) {
            let message = format!(
                "budget refused: estimate {}, remaining ${:.4}",
                estimate
                    .map(|e| format!("${:.4}", e))
                    .unwrap_or_else(|| "unknown".into()),
                run.budget.remaining()
            );
            tracing::info!("{}", message);
            run.store.append_log(Some(index), "generate", &message)?;
            return Ok(Stage::Done(TerminalReason::BudgetExhausted));
        }

        tracing::info!(
            "Generating Dockerfile (attempt {}, {} prior)",
            index + 1,
            request.history.len()
        );
        let result = self.provider.generate(request, self.cancel.clone()).await;
        let cost = match &result {
            Ok(generation) => generation.cost,
            Err(e) => e.cost(),
        };

        let label = format!("generate#{}", index);
        if let Err(e) = run.budget.charge(&label, cost) {
            // A provider reporting a nonsensical cost cannot be trusted further,
            // and neither can its text: nothing is written or kept.
            tracing::error!("{}", e);
            run.store.append_log(Some(index), "generate", &e.to_string())?;
            self.record(run, String::new(), 0.0, AttemptOutcome::Abandoned, e.to_string())?;
            return Ok(Stage::Done(TerminalReason::ProviderUnavailable));
        }
        run.spent += cost;
        run.ledger.push(LedgerEntry {
            label,
            amount: cost,
            cumulative: run.spent,
        });

        let over_budget = run.budget.is_over_budget();

        match result {
            Ok(generation) => {
                run.store.write_dockerfile(&generation.dockerfile)?;
                run.store.append_log(
                    Some(index),
                    "generate",
                    &format!(
                        "model: {}\ncost: ${:.5}\n\n{}",
                        generation.model, cost, generation.dockerfile
                    ),
                )?;
                run.last_dockerfile = Some(generation.dockerfile.clone());

                if self.cancel.is_cancelled() {
                    self.record(
                        run,
                        generation.dockerfile,
                        cost,
                        AttemptOutcome::Abandoned,
                        "cancelled after generation".into(),
                    )?;
                    return Ok(Stage::Done(TerminalReason::Cancelled));
                }
                if over_budget {
                    self.record(
                        run,
                        generation.dockerfile,
                        cost,
                        AttemptOutcome::Abandoned,
                        "budget exhausted by this generation".into(),
                    )?;
                    return Ok(Stage::Done(TerminalReason::BudgetExhausted));
                }
                Ok(Stage::Building {
                    dockerfile: generation.dockerfile,
                    cost,
                })
            }
            Err(GenerationError::Cancelled { .. }) => {
                run.store
                    .append_log(Some(index), "generate", "cancelled")?;
                self.record(
                    run,
                    String::new(),
                    cost,
                    AttemptOutcome::Abandoned,
                    "generation cancelled".into(),
                )?;
                Ok(Stage::Done(TerminalReason::Cancelled))
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!("Generation failed: {}", message);
                run.store.append_log(Some(index), "generate", &message)?;
                self.record(
                    run,
                    String::new(),
                    cost,
                    AttemptOutcome::GenerationFailed,
                    message,
                )?;
                if over_budget {
                    return Ok(Stage::Done(TerminalReason::BudgetExhausted));
                }
                match e {
                    GenerationError::Unavailable { .. } => {
                        Ok(Stage::Done(TerminalReason::ProviderUnavailable))
                    }
                    _ => Ok(Stage::Refining),
                }
            }
        }
    }

    // ─── Building ───────────────────────────────────────────────

    async fn build(&self, run: &mut RunState<'_>, dockerfile: String, cost: f64) -> Result<Stage> {
        let index = run.next_index();
        self.enter(Phase::Building, index);

        let tag = image_tag();
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            outcome = self.executor.build(run.store.dir(), &tag) => Some(outcome),
        };

        match outcome {
            None => {
                run.store.append_log(Some(index), "build", "cancelled")?;
                self.record(
                    run,
                    dockerfile,
                    cost,
                    AttemptOutcome::Abandoned,
                    "build cancelled".into(),
                )?;
                Ok(Stage::Done(TerminalReason::Cancelled))
            }
            Some(Err(ExecutorError::Unavailable(message))) => {
                tracing::error!("Executor failed during build: {}", message);
                run.store.append_log(Some(index), "build", &message)?;
                self.record(run, dockerfile, cost, AttemptOutcome::Abandoned, message)?;
                Ok(Stage::Done(TerminalReason::ExecutorUnavailable))
            }
            Some(Ok(report)) => {
                run.store
                    .append_log(Some(index), "build", &report.log_tail)?;
                if report.success {
                    tracing::info!("Build succeeded: {}", tag);
                    Ok(Stage::Validating {
                        dockerfile,
                        cost,
                        image: tag,
                    })
                } else {
                    tracing::info!("Build failed (attempt {})", index + 1);
                    let excerpt = tail_str(&report.log_tail, self.config.log_excerpt_bytes);
                    self.record(
                        run,
                        dockerfile,
                        cost,
                        AttemptOutcome::BuildFailed,
                        excerpt.to_string(),
                    )?;
                    Ok(Stage::Refining)
                }
            }
        }
    }

    // ─── Validating ─────────────────────────────────────────────

    async fn validate(
        &self,
        run: &mut RunState<'_>,
        dockerfile: String,
        cost: f64,
        image: String,
    ) -> Result<Stage> {
        let index = run.next_index();
        self.enter(Phase::Validating, index);

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            outcome = validate_image(self.executor.as_ref(), &image, run.profile, &self.config) => Some(outcome),
        };

        if !self.config.keep_images {
            if let Err(e) = self.executor.remove_image(&image).await {
                tracing::debug!("Could not remove {}: {}", image, e);
            }
        }

        match outcome {
            None => {
                run.store.append_log(Some(index), "validate", "cancelled")?;
                self.record(
                    run,
                    dockerfile,
                    cost,
                    AttemptOutcome::Abandoned,
                    "validation cancelled".into(),
                )?;
                Ok(Stage::Done(TerminalReason::Cancelled))
            }
            Some(Err(ExecutorError::Unavailable(message))) => {
                tracing::error!("Executor failed during validation: {}", message);
                run.store.append_log(Some(index), "validate", &message)?;
                self.record(run, dockerfile, cost, AttemptOutcome::Abandoned, message)?;
                Ok(Stage::Done(TerminalReason::ExecutorUnavailable))
            }
            Some(Ok(verdict)) => {
                run.store
                    .append_log(Some(index), "validate", &verdict.log)?;
                let excerpt = tail_str(&verdict.log, self.config.log_excerpt_bytes).to_string();
                if verdict.passed {
                    tracing::info!("Validation passed (attempt {})", index + 1);
                    self.record(run, dockerfile, cost, AttemptOutcome::Succeeded, excerpt)?;
                    Ok(Stage::Done(TerminalReason::Succeeded))
                } else {
                    tracing::info!("Validation failed (attempt {})", index + 1);
                    self.record(
                        run,
                        dockerfile,
                        cost,
                        AttemptOutcome::ValidationFailed,
                        excerpt,
                    )?;
                    Ok(Stage::Refining)
                }
            }
        }
    }

    // ─── Refining ───────────────────────────────────────────────

    fn refine(&self, run: &mut RunState<'_>) -> Result<Stage> {
        self.enter(Phase::Refining, run.next_index());

        if self.cancel.is_cancelled() {
            return Ok(Stage::Done(TerminalReason::Cancelled));
        }

        let verdict = {
            let budget = run.budget.lock();
            self.safety.check(&run.attempts, &budget)
        };
        match verdict {
            Some(reason) => Ok(Stage::Done(reason)),
            None => Ok(Stage::Generating),
        }
    }

    // ─── Attempts ───────────────────────────────────────────────

    fn record(
        &self,
        run: &mut RunState<'_>,
        dockerfile: String,
        cost: f64,
        outcome: AttemptOutcome,
        log_excerpt: String,
    ) -> Result<()> {
        let index = run.next_index();
        run.store.append_log(
            Some(index),
            "outcome",
            &format!("{} (cumulative ${:.4})", outcome, run.spent),
        )?;
        run.attempts.push(Attempt {
            index,
            dockerfile,
            generation_cost: cost,
            outcome,
            log_excerpt,
            cumulative_cost: run.spent,
        });
        self.emit(ProgressEvent::AttemptRecorded {
            index,
            outcome,
            cost,
            cumulative_cost: run.spent,
        });
        Ok(())
    }
}

/// Unique tag for one build.
fn image_tag() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("dockersmith-{}", &id[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_tag_format() {
        let tag = image_tag();
        assert!(tag.starts_with("dockersmith-"));
        assert_eq!(tag.len(), "dockersmith-".len() + 8);
        assert_ne!(image_tag(), tag);
    }
}
