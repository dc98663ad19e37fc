//! Plan command: diagnosis in, ranked bypass plan out.

use anyhow::Result;
use colored::Colorize;
use std::sync::Arc;

use unblock_core::feedback::JsonFileFeedbackStore;
use unblock_core::{
    BypassPlan, DiagnosisResult, RecommendationFormatter, RiskLevel, StrategySelector,
};

use super::parse_diagnosis;
use crate::cli::PlanArgs;
use crate::config::Config;

/// Execute the plan command.
pub async fn execute(args: PlanArgs, config: &Config) -> Result<()> {
    let diagnosis = diagnosis_from_args(&args)?;
    let selector = selector_for(&args, config);

    let warn = |message: &str| eprintln!("{}", message.yellow());
    let plan = selector.select_with_sink(&diagnosis, Some(&warn));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    print_plan(&diagnosis, &plan, config);
    Ok(())
}

fn diagnosis_from_args(args: &PlanArgs) -> Result<DiagnosisResult> {
    let id = parse_diagnosis(&args.diagnosis)?;
    let mut diagnosis = DiagnosisResult::new(id, args.confidence).with_rule("cli");
    for note in &args.note {
        diagnosis = diagnosis.with_note(note.as_str());
    }
    for (key, value) in &args.evidence {
        diagnosis = diagnosis.with_evidence(key.as_str(), value.as_str());
    }
    Ok(diagnosis)
}

fn selector_for(args: &PlanArgs, config: &Config) -> StrategySelector {
    let selector = StrategySelector::new(config.selector.clone());
    if args.no_feedback {
        return selector;
    }
    let store = JsonFileFeedbackStore::open(config.feedback_path(), config.feedback.clone());
    selector.with_feedback(Arc::new(store))
}

fn print_plan(diagnosis: &DiagnosisResult, plan: &BypassPlan, config: &Config) {
    println!("{}", "Bypass Plan".cyan().bold());
    println!("{}", "─".repeat(50));
    println!(
        "  Diagnosis:  {} ({}%)",
        plan.for_diagnosis.to_string().bold(),
        plan.plan_confidence
    );
    println!("  Reason:     {}", plan.reason);
    println!("  Reasoning:  {}", plan.reasoning.dimmed());
    println!();

    if plan.is_empty() {
        println!("  {}", "No strategies recommended".yellow());
    } else {
        for (i, strategy) in plan.strategies.iter().enumerate() {
            let risk = match strategy.risk {
                RiskLevel::Low => strategy.risk.to_string().green(),
                RiskLevel::Medium => strategy.risk.to_string().yellow(),
                RiskLevel::High => strategy.risk.to_string().red(),
            };
            println!(
                "  {}. {:<20} priority {:>3}  risk {}",
                i + 1,
                strategy.id.to_string().bold(),
                strategy.base_priority,
                risk
            );
        }
    }

    if plan.drop_udp_443 {
        println!("  {} drop UDP/443 (QUIC -> TCP)", "+".green());
    }
    if plan.allow_no_sni {
        println!("  {} allow connections without SNI", "+".green());
    }

    // Lines as the runtime logs them
    let formatter = RecommendationFormatter::new(config.formatter.clone());
    println!();
    if let Some(suffix) = formatter.format_diagnosis_suffix(&diagnosis.to_annotation()) {
        println!("  {}", suffix.dimmed());
    }
    if let Some(line) =
        formatter.build_recommendation_line("cli", &plan.to_strategy_text(), None)
    {
        println!("  {}", line);
    }
}
