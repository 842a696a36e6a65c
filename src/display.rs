//! Console rendering of pass summaries.

use crate::reconciler::{PassSummary, PolicyOutcome, RecordOutcome};

/// Print a pass summary: counts first, then one line per item.
pub fn print_pass_summary(summary: &PassSummary) {
    println!(
        "[{}] Pass complete: {} updated, {} unchanged, {} failed",
        summary.completed_at.format("%Y-%m-%d %H:%M:%S"),
        summary.updated(),
        summary.unchanged(),
        summary.failed()
    );

    for outcome in &summary.records {
        println!("  {}", record_line(outcome));
    }
    for outcome in &summary.policies {
        println!("  {}", policy_line(outcome));
    }
}

fn record_line(outcome: &RecordOutcome) -> String {
    let label = format!(
        "{} {} ({})",
        outcome.record_type, outcome.record_name, outcome.zone_name
    );

    if !outcome.success {
        return format!(
            "{}: FAILED - {}",
            label,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }

    if outcome.is_unchanged() {
        format!(
            "{}: unchanged ({})",
            label,
            outcome.old_ip.as_deref().unwrap_or("-")
        )
    } else {
        format!(
            "{}: {} -> {}",
            label,
            outcome.old_ip.as_deref().unwrap_or("-"),
            outcome.new_ip.as_deref().unwrap_or("-")
        )
    }
}

fn policy_line(outcome: &PolicyOutcome) -> String {
    let label = format!("policy {} ({})", outcome.policy_name, outcome.app_name);

    if !outcome.success {
        return format!(
            "{}: FAILED - {}",
            label,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }

    if outcome.is_unchanged() {
        format!(
            "{}: unchanged ({})",
            label,
            outcome.old_ip.as_deref().unwrap_or("-")
        )
    } else {
        format!(
            "{}: {} -> {}",
            label,
            outcome.old_ip.as_deref().unwrap_or("-"),
            outcome.new_ip.as_deref().unwrap_or("-")
        )
    }
}
