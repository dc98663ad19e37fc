//! Static diagnosis -> candidate strategy table.

use serde_json::json;

use crate::types::{BypassStrategy, DiagnosisId, RiskLevel, StrategyId, StrategyParams};

/// Candidates known for a diagnosis.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateSet {
    /// Templates to rank, freshly built for this call.
    Mapped(Vec<BypassStrategy>),
    /// Deliberately not acted upon (low-value or noisy).
    Excluded,
    /// No mapping exists yet.
    Unmapped,
}

/// Look up the candidate templates for `diagnosis`.
pub fn candidates(diagnosis: DiagnosisId) -> CandidateSet {
    use RiskLevel::*;
    use StrategyId::*;

    let mapped = match diagnosis {
        DiagnosisId::NoBlockage => return CandidateSet::Excluded,
        DiagnosisId::QuicInterference => return CandidateSet::Unmapped,

        // Too little data to classify: offer only the baseline TLS bypass.
        DiagnosisId::Unknown => vec![fragment(60)],
        DiagnosisId::DnsHijack => vec![template(UseDoh, 80, Low)],
        DiagnosisId::SilentDrop => vec![fragment(90), template(DropRst, 50, Medium)],
        DiagnosisId::MultiLayerBlock => vec![
            template(UseDoh, 100, Low),
            template(TlsDisorder, 90, Medium),
            template(DropRst, 50, Medium),
        ],
        DiagnosisId::TlsInterference => vec![
            template(TlsDisorder, 90, Medium),
            fragment(80),
            template(DropRst, 30, Medium),
        ],
        DiagnosisId::HttpRedirect => vec![template(HttpHostTricks, 85, Medium)],
        DiagnosisId::ActiveDpiEdge | DiagnosisId::StatefulDpi => vec![
            template(TlsDisorder, 90, Medium),
            fragment(80),
            template(DropRst, 50, Medium),
            template(HttpHostTricks, 10, Medium),
            template(BadChecksum, 1, High),
            template(AggressiveFragment, 20, High),
        ],
    };

    CandidateSet::Mapped(mapped)
}

fn template(id: StrategyId, base_priority: i32, risk: RiskLevel) -> BypassStrategy {
    BypassStrategy {
        id,
        base_priority,
        risk,
        parameters: StrategyParams::new(),
    }
}

/// TLS fragmentation with the standard preset.
fn fragment(base_priority: i32) -> BypassStrategy {
    let mut strategy = template(StrategyId::TlsFragment, base_priority, RiskLevel::Medium);
    strategy.parameters.insert("preset_name".into(), json!("standard"));
    strategy.parameters.insert("tls_fragment_sizes".into(), json!([64]));
    strategy.parameters.insert("auto_adjust_aggressive".into(), json!(false));
    strategy
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapped(diagnosis: DiagnosisId) -> Vec<BypassStrategy> {
        match candidates(diagnosis) {
            CandidateSet::Mapped(list) => list,
            other => panic!("expected mapping for {diagnosis}, got {other:?}"),
        }
    }

    #[test]
    fn test_excluded_and_unmapped() {
        assert_eq!(candidates(DiagnosisId::NoBlockage), CandidateSet::Excluded);
        assert_eq!(candidates(DiagnosisId::QuicInterference), CandidateSet::Unmapped);
    }

    #[test]
    fn test_templates_have_unique_ids() {
        for diagnosis in DiagnosisId::ALL {
            if let CandidateSet::Mapped(list) = candidates(diagnosis) {
                let mut ids: Vec<StrategyId> = list.iter().map(|s| s.id).collect();
                ids.sort();
                ids.dedup();
                assert_eq!(ids.len(), list.len(), "duplicate template for {diagnosis}");
            }
        }
    }

    #[test]
    fn test_fragment_parameters() {
        let list = mapped(DiagnosisId::SilentDrop);
        let fragment = &list[0];
        assert_eq!(fragment.id, StrategyId::TlsFragment);
        assert_eq!(fragment.base_priority, 90);
        assert_eq!(fragment.parameters["tls_fragment_sizes"], json!([64]));
        assert_eq!(fragment.parameters["auto_adjust_aggressive"], json!(false));
    }

    #[test]
    fn test_unknown_falls_back_to_fragment() {
        let list = mapped(DiagnosisId::Unknown);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, StrategyId::TlsFragment);
        assert_eq!(list[0].base_priority, 60);
    }

    #[test]
    fn test_dpi_table_contains_high_risk() {
        let list = mapped(DiagnosisId::StatefulDpi);
        assert_eq!(list.len(), 6);
        assert!(list.iter().any(|s| s.risk == RiskLevel::High));
        assert_eq!(mapped(DiagnosisId::ActiveDpiEdge), list);
    }
}
