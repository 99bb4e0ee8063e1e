// src/core/safety.rs — Stop conditions for the refinement loop

use super::budget::BudgetTracker;
use super::types::{Attempt, ControllerConfig, TerminalReason};

/// Decides whether another generation may be attempted.
///
/// The attempt cap is checked before the budget so a run that used all its
/// attempts reports `MaxAttemptsExceeded` even if money also ran out.
pub struct SafetyChecker {
    pub max_attempts: u32,
}

impl SafetyChecker {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
        }
    }

    pub fn check(&self, attempts: &[Attempt], budget: &BudgetTracker) -> Option<TerminalReason> {
        if attempts.len() as u64 >= self.max_attempts as u64 {
            return Some(TerminalReason::MaxAttemptsExceeded);
        }

        if budget.is_over_budget() || !budget.reserve(None) {
            return Some(TerminalReason::BudgetExhausted);
        }

        None
    }
}
