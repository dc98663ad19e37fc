//! Feedback commands: record, show and prune strategy outcomes.

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use unblock_core::feedback::JsonFileFeedbackStore;
use unblock_core::{DiagnosisId, FeedbackKey, FeedbackStore, StrategyId, StrategyOutcome};

use super::{parse_diagnosis, parse_strategy};
use crate::cli::{FeedbackAction, FeedbackCommand};
use crate::config::Config;

/// One row of `feedback show`.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackRow {
    pub diagnosis_id: DiagnosisId,
    pub strategy_id: StrategyId,
    pub success_count: u64,
    pub failure_count: u64,
    pub success_rate: f64,
    pub last_updated: DateTime<Utc>,
}

/// Execute feedback command.
pub async fn execute(cmd: FeedbackCommand, config: &Config) -> Result<()> {
    let store = JsonFileFeedbackStore::open(config.feedback_path(), config.feedback.clone());

    match cmd.action {
        FeedbackAction::Record {
            diagnosis,
            strategy,
            outcome,
        } => {
            let key = FeedbackKey::new(parse_diagnosis(&diagnosis)?, parse_strategy(&strategy)?);
            let outcome = StrategyOutcome::parse(&outcome)?;
            if record(&store, key, outcome, Utc::now()) {
                println!("{} Recorded {:?} for {}", "✓".green(), outcome, key);
            } else {
                println!("{}", "Unknown outcomes are not recorded".yellow());
            }
        }
        FeedbackAction::Show { diagnosis, json } => {
            let filter = diagnosis.as_deref().map(parse_diagnosis).transpose()?;
            let rows = rows(&store, filter);
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print_rows(&rows, config);
            }
        }
        FeedbackAction::Prune => {
            let removed = store.prune(Utc::now());
            store.save()?;
            println!(
                "{} Pruned {} entries ({} remaining)",
                "✓".green(),
                removed,
                store.entries().len()
            );
        }
    }

    Ok(())
}

/// Record `outcome`; returns false when the outcome is not attributable.
fn record(
    store: &dyn FeedbackStore,
    key: FeedbackKey,
    outcome: StrategyOutcome,
    at: DateTime<Utc>,
) -> bool {
    if outcome == StrategyOutcome::Unknown {
        return false;
    }
    store.record(key, outcome, at);
    true
}

fn rows(store: &dyn FeedbackStore, diagnosis: Option<DiagnosisId>) -> Vec<FeedbackRow> {
    store
        .entries()
        .into_iter()
        .filter(|(key, _)| diagnosis.is_none_or(|d| key.diagnosis_id == d))
        .map(|(key, stats)| FeedbackRow {
            diagnosis_id: key.diagnosis_id,
            strategy_id: key.strategy_id,
            success_count: stats.success_count,
            failure_count: stats.failure_count,
            success_rate: stats.success_rate(),
            last_updated: stats.last_updated,
        })
        .collect()
}

fn print_rows(rows: &[FeedbackRow], config: &Config) {
    println!("{}", "Strategy Feedback".cyan().bold());
    println!("{}", "─".repeat(50));
    println!("  Store: {}", config.feedback_path().display());
    println!();

    if rows.is_empty() {
        println!("  {}", "No feedback recorded".yellow());
        return;
    }

    for row in rows {
        let rate = format!("{:>5.1}%", row.success_rate * 100.0);
        let rate = if row.success_rate >= 0.5 {
            rate.green()
        } else {
            rate.red()
        };
        println!(
            "  {:<18} {:<20} {} ({} ok / {} failed, {})",
            row.diagnosis_id.to_string(),
            row.strategy_id.to_string().bold(),
            rate,
            row.success_count,
            row.failure_count,
            row.last_updated.format("%Y-%m-%d %H:%M")
        );
    }
}
