// src/provider/mod.rs — Dockerfile generation capability

pub mod openai;
pub mod pricing;
pub mod prompt;
pub mod retry;

use async_trait::async_trait;
use std::time::Duration;

use crate::core::cancel::CancelSignal;
use crate::core::types::{Attempt, ScriptProfile};

pub use openai::OpenAiGenerator;
pub use retry::RetryGenerator;

/// Everything a provider needs for one call. History is passed by value so a
/// provider can never observe later mutation.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub profile: ScriptProfile,
    /// Every prior attempt of this run, oldest first.
    pub history: Vec<Attempt>,
}

impl GenerationRequest {
    pub fn new(profile: ScriptProfile, history: Vec<Attempt>) -> Self {
        Self { profile, history }
    }

    pub fn is_refinement(&self) -> bool {
        !self.history.is_empty()
    }

    /// Most recent attempt that produced Dockerfile text.
    pub fn latest_dockerfile(&self) -> Option<&Attempt> {
        self.history.iter().rev().find(|a| a.has_dockerfile())
    }
}

/// A successful generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub dockerfile: String,
    /// Metered cost in USD.
    pub cost: f64,
    pub model: String,
}

/// Failed generation. Every variant carries whatever was already spent.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    /// The call completed but the output is not a usable Dockerfile.
    #[error("Unusable generation: {message}")]
    Content { message: String, cost: f64 },

    /// Rate limit, server error or network trouble. Worth retrying.
    #[error("Transient provider error: {message}")]
    Transient {
        message: String,
        cost: f64,
        retry_after: Option<Duration>,
    },

    /// The provider refuses service (bad credentials, unknown model).
    #[error("Provider unavailable: {message}")]
    Unavailable { message: String, cost: f64 },

    #[error("Generation cancelled")]
    Cancelled { cost: f64 },
}

impl GenerationError {
    pub fn cost(&self) -> f64 {
        match self {
            GenerationError::Content { cost, .. }
            | GenerationError::Transient { cost, .. }
            | GenerationError::Unavailable { cost, .. }
            | GenerationError::Cancelled { cost } => *cost,
        }
    }

    /// Same error with `extra` added to its cost.
    pub fn plus_cost(mut self, extra: f64) -> Self {
        match &mut self {
            GenerationError::Content { cost, .. }
            | GenerationError::Transient { cost, .. }
            | GenerationError::Unavailable { cost, .. }
            | GenerationError::Cancelled { cost } => *cost += extra,
        }
        self
    }
}

/// Produces Dockerfiles for a script profile, learning from prior attempts.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancelSignal,
    ) -> Result<Generation, GenerationError>;

    /// Upper bound on what `generate` would cost, if the provider can tell.
    fn estimate_cost(&self, _request: &GenerationRequest) -> Option<f64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AttemptOutcome, Language};

    fn attempt(index: u32, dockerfile: &str) -> Attempt {
        Attempt {
            index,
            dockerfile: dockerfile.into(),
            generation_cost: 0.01,
            outcome: if dockerfile.is_empty() {
                AttemptOutcome::GenerationFailed
            } else {
                AttemptOutcome::BuildFailed
            },
            log_excerpt: String::new(),
            cumulative_cost: 0.01,
        }
    }

    #[test]
    fn test_latest_dockerfile_skips_empty() {
        let profile = ScriptProfile::new("app.py", Language::Python);
        let req = GenerationRequest::new(
            profile,
            vec![attempt(0, "FROM a"), attempt(1, "FROM b"), attempt(2, "")],
        );
        assert!(req.is_refinement());
        assert_eq!(req.latest_dockerfile().unwrap().dockerfile, "FROM b");
    }

    #[test]
    fn test_first_request_is_not_refinement() {
        let req = GenerationRequest::new(ScriptProfile::new("a.sh", Language::Bash), vec![]);
        assert!(!req.is_refinement());
        assert!(req.latest_dockerfile().is_none());
    }

    #[test]
    fn test_error_cost_accumulates() {
        let e = GenerationError::Transient {
            message: "HTTP 503".into(),
            cost: 0.0,
            retry_after: None,
        };
        let e = e.plus_cost(0.02).plus_cost(0.01);
        assert!((e.cost() - 0.03).abs() < 1e-9);

        let e = GenerationError::Cancelled { cost: 0.5 };
        assert_eq!(e.cost(), 0.5);
        assert_eq!(e.to_string(), "Generation cancelled");
    }
}
