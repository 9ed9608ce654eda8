use std::fmt::Write;

use uuid::Uuid;

use crate::models::{Challenge, LeaderboardEntry, ParticipantStatus};
use crate::reconcile::ReconcileRun;

pub fn build_run_report(client_id: Uuid, run: &ReconcileRun) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Challenge Progress Reconciliation");
    let _ = writeln!(
        output,
        "Client {}: {} updated, {} skipped, {} failed",
        client_id,
        run.updates.len(),
        run.skipped,
        run.failures.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Updated Challenges");

    if run.updates.is_empty() {
        let _ = writeln!(output, "No wearable challenges were updated.");
    } else {
        for update in &run.updates {
            let _ = writeln!(
                output,
                "- {}: {} -> {} (verified {}){}",
                update.challenge_id,
                update.previous_progress,
                update.current_progress,
                update.verified_progress,
                if update.completed() { ", completed" } else { "" }
            );
        }
    }

    if !run.failures.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Failures");
        for failure in &run.failures {
            let _ = writeln!(output, "- {failure}");
        }
    }

    output
}

pub fn build_leaderboard(challenge: &Challenge, entries: &[LeaderboardEntry]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {} Leaderboard", challenge.title);
    let _ = writeln!(
        output,
        "Target {} between {} and {}",
        challenge.target_value, challenge.start_date, challenge.end_date
    );
    let _ = writeln!(output);

    if entries.is_empty() {
        let _ = writeln!(output, "No participants yet.");
        return output;
    }

    for (rank, entry) in entries.iter().enumerate() {
        let verified = entry
            .verified_progress
            .map(|value| format!("verified {value}"))
            .unwrap_or_else(|| "unverified".to_string());
        let badge = match (entry.status, entry.completed_at) {
            (ParticipantStatus::Completed, Some(at)) => format!(" [completed {}]", at.date_naive()),
            (ParticipantStatus::Completed, None) => " [completed]".to_string(),
            _ => String::new(),
        };
        let _ = writeln!(
            output,
            "{}. {} {} ({}){}",
            rank + 1,
            entry.client_id,
            entry.current_progress,
            verified,
            badge
        );
    }

    output
}
