// src/cli/progress.rs — Terminal progress renderer

use crate::core::types::{Phase, ProgressEvent};

/// One line per interesting event, or None for events not worth printing.
pub fn format_event(event: &ProgressEvent) -> Option<String> {
    match event {
        ProgressEvent::PhaseEntered { phase, attempt } => match phase {
            Phase::Analyzing => Some("[analyze] checking script and output directory".into()),
            Phase::Generating => Some(format!("[attempt {}] generating...", attempt + 1)),
            Phase::Building => Some(format!("[attempt {}] building image...", attempt + 1)),
            Phase::Validating => Some(format!("[attempt {}] validating...", attempt + 1)),
            Phase::Refining | Phase::Succeeded | Phase::Failed => None,
        },
        ProgressEvent::AttemptRecorded {
            index,
            outcome,
            cost,
            cumulative_cost,
        } => Some(format!(
            "[attempt {}] {} (${:.4}, total ${:.4})",
            index + 1,
            outcome,
            cost,
            cumulative_cost
        )),
        ProgressEvent::Finished {
            reason,
            attempts,
            total_cost,
        } => Some(format!(
            "[done] {} after {} attempt(s), ${:.4}",
            reason, attempts, total_cost
        )),
    }
}

/// Build a progress callback that writes to stderr, keeping stdout clean
/// for the result.
pub fn terminal_progress() -> impl Fn(ProgressEvent) + Send + Sync + 'static {
    move |event| {
        if let Some(line) = format_event(&event) {
            eprintln!("{}", line);
        }
    }
}
