// src/core/mod.rs — Refinement engine

pub mod artifacts;
pub mod budget;
pub mod cancel;
pub mod controller;
pub mod safety;
pub mod types;
pub mod validation;

pub use artifacts::{ArtifactStore, OutputPolicy};
pub use budget::{BudgetTracker, LedgerEntry, SharedBudget};
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use controller::RefinementController;
