// src/core/budget.rs — Budget tracking for paid generation calls

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::infra::errors::{DockersmithError, Result};

/// One charged operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub label: String,
    pub amount: f64,
    /// Running total after this entry.
    pub cumulative: f64,
}

/// Tracks spend against a fixed ceiling.
///
/// `reserve` answers whether a call with a known or unknown cost may start.
/// `charge` always records the true cost afterwards, even when that pushes
/// the total past the ceiling; the overrun is then visible through
/// `is_over_budget`.
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    ceiling: f64,
    spent: f64,
    ledger: Vec<LedgerEntry>,
}

impl BudgetTracker {
    pub fn new(ceiling: f64) -> Self {
        Self {
            ceiling,
            spent: 0.0,
            ledger: Vec::new(),
        }
    }

    /// Whether a call may start. With an estimate, the call must fit in what
    /// remains. Without one, any positive headroom is enough.
    pub fn reserve(&self, estimate: Option<f64>) -> bool {
        let remaining = self.remaining();
        match estimate {
            Some(cost) if cost.is_finite() && cost >= 0.0 => cost <= remaining,
            _ => remaining > 0.0,
        }
    }

    /// Record the actual cost of a completed call.
    pub fn charge(&mut self, label: &str, amount: f64) -> Result<()> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(DockersmithError::InvalidCost {
                label: label.to_string(),
                amount,
            });
        }
        self.spent += amount;
        self.ledger.push(LedgerEntry {
            label: label.to_string(),
            amount,
            cumulative: self.spent,
        });
        if self.spent > self.ceiling {
            tracing::warn!(
                "Budget ceiling ${:.4} exceeded: spent ${:.4} after '{}'",
                self.ceiling,
                self.spent,
                label
            );
        }
        Ok(())
    }

    pub fn remaining(&self) -> f64 {
        (self.ceiling - self.spent).max(0.0)
    }

    pub fn spent(&self) -> f64 {
        self.spent
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    pub fn is_over_budget(&self) -> bool {
        self.spent > self.ceiling
    }

    pub fn ledger(&self) -> &[LedgerEntry] {
        &self.ledger
    }

    pub fn summary(&self) -> String {
        format!(
            "${:.4} of ${:.4} ({} charges)",
            self.spent,
            self.ceiling,
            self.ledger.len()
        )
    }
}

/// A tracker shared between concurrent runs drawing on one ceiling.
#[derive(Debug, Clone)]
pub struct SharedBudget {
    inner: Arc<Mutex<BudgetTracker>>,
}

impl SharedBudget {
    pub fn new(ceiling: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BudgetTracker::new(ceiling))),
        }
    }

    /// Locks the tracker. A poisoned lock still yields the data: every
    /// mutation is a single push plus an add, so the tracker stays consistent.
    pub fn lock(&self) -> MutexGuard<'_, BudgetTracker> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn reserve(&self, estimate: Option<f64>) -> bool {
        self.lock().reserve(estimate)
    }

    pub fn charge(&self, label: &str, amount: f64) -> Result<()> {
        self.lock().charge(label, amount)
    }

    pub fn remaining(&self) -> f64 {
        self.lock().remaining()
    }

    pub fn spent(&self) -> f64 {
        self.lock().spent()
    }

    pub fn ceiling(&self) -> f64 {
        self.lock().ceiling()
    }

    pub fn is_over_budget(&self) -> bool {
        self.lock().is_over_budget()
    }

    pub fn ledger(&self) -> Vec<LedgerEntry> {
        self.lock().ledger().to_vec()
    }
}
