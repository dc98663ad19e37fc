//! Capabilities command: which strategies the executor can apply.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use unblock_core::strategy::capability::RESERVED;
use unblock_core::{CapabilityRegistry, RiskLevel, StrategyId};

/// Capability status of one strategy.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityRow {
    pub strategy_id: StrategyId,
    pub legacy_token: &'static str,
    pub implemented: bool,
    pub reserved: bool,
}

/// Execute the capabilities command.
pub async fn execute(json: bool) -> Result<()> {
    let registry = CapabilityRegistry::with_defaults();
    let rows = rows(&registry);

    if json {
        let report = serde_json::json!({
            "catalog_version": StrategyId::CATALOG_VERSION,
            "strategies": rows,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} (catalog v{})",
        "Strategy Capabilities".cyan().bold(),
        StrategyId::CATALOG_VERSION
    );
    println!("{}", "─".repeat(50));
    for row in &rows {
        let status = if row.implemented {
            "✓ implemented".green()
        } else if row.reserved {
            "○ reserved".dimmed()
        } else {
            "✗ unavailable".red()
        };
        println!(
            "  {:<20} {:<20} {}",
            row.strategy_id.to_string().bold(),
            row.legacy_token,
            status
        );
    }
    println!();
    println!(
        "  High-risk strategies ({}) also need confidence >= {}",
        RiskLevel::High,
        unblock_core::types::MIN_CONFIDENCE_FOR_HIGH_RISK
    );

    Ok(())
}

fn rows(registry: &CapabilityRegistry) -> Vec<CapabilityRow> {
    StrategyId::ALL
        .into_iter()
        .map(|id| CapabilityRow {
            strategy_id: id,
            legacy_token: id.legacy_token(),
            implemented: registry.is_implemented(id),
            reserved: RESERVED.contains(&id),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_cover_catalog() {
        let rows = rows(&CapabilityRegistry::with_defaults());
        assert_eq!(rows.len(), StrategyId::ALL.len());

        let fake_ttl = rows
            .iter()
            .find(|r| r.strategy_id == StrategyId::TlsFakeTtl)
            .unwrap();
        assert!(!fake_ttl.implemented);
        assert!(fake_ttl.reserved);

        let doh = rows.iter().find(|r| r.strategy_id == StrategyId::UseDoh).unwrap();
        assert!(doh.implemented);
        assert_eq!(doh.legacy_token, "DOH");
    }

    #[test]
    fn test_marking_reserved_strategy_implemented() {
        let registry = CapabilityRegistry::with_defaults();
        registry.mark_implemented(StrategyId::QuicObfuscation);
        let rows = rows(&registry);
        let quic = rows
            .iter()
            .find(|r| r.strategy_id == StrategyId::QuicObfuscation)
            .unwrap();
        assert!(quic.implemented && quic.reserved);
    }
}
