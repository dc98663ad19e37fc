//! Strategy selection engine
//!
//! Turns a diagnosis into a ranked, risk-gated plan. Selection is a pure
//! function of the diagnosis, the feedback statistics and the capability
//! registry; the only side effect is the warning emitted for candidates the
//! execution layer cannot apply.

use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

use super::capability::CapabilityRegistry;
use super::catalog::{self, CandidateSet};
use super::evidence;
use crate::config::SelectorConfig;
use crate::feedback::{FeedbackKey, FeedbackSource};
use crate::types::{
    BypassPlan, BypassStrategy, DiagnosisId, DiagnosisResult, PlanReason, RiskLevel, StrategyId,
    MIN_CONFIDENCE_FOR_HIGH_RISK, MIN_CONFIDENCE_FOR_PLAN,
};

/// Minimum no-SNI share among tested hosts before `allow_no_sni` is suggested.
const NO_SNI_RATIO_THRESHOLD: f64 = 0.70;
const NO_SNI_MIN_COUNT: u32 = 2;

/// Callback receiving human-readable selection warnings.
pub type WarningSink<'a> = &'a dyn Fn(&str);

struct Ranked {
    strategy: BypassStrategy,
    boost: i32,
}

impl Ranked {
    fn effective_priority(&self) -> i32 {
        self.strategy.base_priority.saturating_add(self.boost)
    }
}

/// Diagnosis -> plan selector.
pub struct StrategySelector {
    feedback: Option<Arc<dyn FeedbackSource>>,
    capabilities: Arc<CapabilityRegistry>,
    config: SelectorConfig,
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new(SelectorConfig::default())
    }
}

impl StrategySelector {
    /// Selector with the default capability set and no feedback.
    pub fn new(config: SelectorConfig) -> Self {
        Self {
            feedback: None,
            capabilities: Arc::new(CapabilityRegistry::with_defaults()),
            config,
        }
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn FeedbackSource>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Share a capability registry with the execution layer.
    pub fn with_capabilities(mut self, capabilities: Arc<CapabilityRegistry>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn capabilities(&self) -> &Arc<CapabilityRegistry> {
        &self.capabilities
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Build a plan, logging skipped strategies through `tracing`.
    pub fn select(&self, diagnosis: &DiagnosisResult) -> BypassPlan {
        self.select_with_sink(diagnosis, None)
    }

    /// Build a plan, routing selection warnings to `sink` when one is given.
    pub fn select_with_sink(
        &self,
        diagnosis: &DiagnosisResult,
        sink: Option<WarningSink<'_>>,
    ) -> BypassPlan {
        let diagnosis_id = diagnosis.diagnosis_id;
        let confidence = diagnosis.confidence.clamp(0, 100);

        if confidence < MIN_CONFIDENCE_FOR_PLAN {
            return BypassPlan::empty(diagnosis_id, confidence, PlanReason::ConfidenceBelowThreshold);
        }

        let (candidates, unmapped) = match catalog::candidates(diagnosis_id) {
            CandidateSet::Mapped(list) => (list, false),
            CandidateSet::Unmapped => (Vec::new(), true),
            CandidateSet::Excluded => {
                return BypassPlan::empty(diagnosis_id, confidence, PlanReason::DiagnosisExcluded);
            }
        };

        let mut ranked: Vec<Ranked> = candidates
            .into_iter()
            .filter(|candidate| self.admit(diagnosis_id, candidate, confidence, sink))
            .map(|strategy| Ranked {
                boost: self.feedback_boost(diagnosis_id, strategy.id),
                strategy,
            })
            .collect();
        let feedback_applied = ranked.iter().any(|r| r.boost != 0);

        ranked.sort_by(compare_ranked);
        let strategies = keep_one_tls_mode(ranked.into_iter().map(|r| r.strategy));

        let has_tls_bypass = strategies.iter().any(|s| s.id.is_tls_bypass());
        let drop_udp_443 = recommend_drop_udp_443(diagnosis);
        let allow_no_sni = has_tls_bypass && recommend_allow_no_sni(diagnosis);

        if strategies.is_empty() && !drop_udp_443 && !allow_no_sni {
            let reason = if unmapped {
                PlanReason::DiagnosisUnmapped
            } else {
                PlanReason::AllCandidatesFiltered
            };
            return BypassPlan::empty(diagnosis_id, confidence, reason);
        }

        let reason = if feedback_applied {
            PlanReason::PlannedWithFeedback
        } else {
            PlanReason::Planned
        };

        let mut reasoning = reason.description().to_string();
        if unmapped {
            reasoning.push_str("; ");
            reasoning.push_str(PlanReason::DiagnosisUnmapped.description());
        }
        if drop_udp_443 {
            reasoning.push_str("; assist: QUIC->TCP");
        }
        if allow_no_sni {
            reasoning.push_str("; assist: No SNI");
        }
        if diagnosis_id == DiagnosisId::HttpRedirect {
            if let Some(host) = diagnosis
                .evidence
                .get(evidence::REDIRECT_HOST)
                .map(|h| h.trim())
                .filter(|h| !h.is_empty())
            {
                reasoning.push_str(&format!("; redirect_host={}", host));
                if confidence < MIN_CONFIDENCE_FOR_HIGH_RISK {
                    reasoning.push_str("; possibly a captive portal or router page");
                }
            }
        }

        debug!(
            diagnosis = %diagnosis_id,
            confidence,
            strategies = strategies.len(),
            drop_udp_443,
            allow_no_sni,
            reason = %reason,
            "Built bypass plan"
        );

        BypassPlan {
            for_diagnosis: diagnosis_id,
            strategies,
            plan_confidence: confidence,
            reason,
            reasoning,
            drop_udp_443,
            allow_no_sni,
            planned_at: chrono::Utc::now(),
        }
    }

    /// Priority adjustment derived from recorded outcomes.
    ///
    /// Zero without a feedback source or below the sample threshold; otherwise
    /// proportional to how far the success rate is from 50%, rounded half away
    /// from zero and clamped to the configured maximum.
    pub fn feedback_boost(&self, diagnosis_id: DiagnosisId, strategy_id: StrategyId) -> i32 {
        let Some(feedback) = &self.feedback else {
            return 0;
        };
        let Some(stats) = feedback.try_get_stats(&FeedbackKey::new(diagnosis_id, strategy_id))
        else {
            return 0;
        };
        if stats.total_count() < u64::from(self.config.min_samples_to_affect_ranking) {
            return 0;
        }

        let max = self.config.max_priority_boost_abs.max(0);
        let raw = ((stats.success_rate() - 0.5) * 2.0 * f64::from(max)).round();
        (raw as i32).clamp(-max, max)
    }

    fn admit(
        &self,
        diagnosis_id: DiagnosisId,
        candidate: &BypassStrategy,
        confidence: i32,
        sink: Option<WarningSink<'_>>,
    ) -> bool {
        if candidate.risk == RiskLevel::High && confidence < MIN_CONFIDENCE_FOR_HIGH_RISK {
            return false;
        }

        if !self.capabilities.is_implemented(candidate.id) {
            match sink {
                Some(sink) => sink(&format!(
                    "[INTEL][Selector] strategy {} is not implemented, skipping",
                    candidate.id
                )),
                None => warn!(
                    diagnosis = %diagnosis_id,
                    strategy = %candidate.id,
                    "Strategy not implemented, skipping"
                ),
            }
            return false;
        }

        true
    }
}

/// Effective priority desc, base priority desc, risk asc, id asc.
fn compare_ranked(a: &Ranked, b: &Ranked) -> Ordering {
    b.effective_priority()
        .cmp(&a.effective_priority())
        .then_with(|| b.strategy.base_priority.cmp(&a.strategy.base_priority))
        .then_with(|| a.strategy.risk.cmp(&b.strategy.risk))
        .then_with(|| a.strategy.id.cmp(&b.strategy.id))
}

/// Keep the highest-ranked TLS mode strategy and drop the rest of the group.
fn keep_one_tls_mode(ordered: impl Iterator<Item = BypassStrategy>) -> Vec<BypassStrategy> {
    let mut tls_mode_taken = false;
    ordered
        .filter(|s| {
            if !s.id.is_tls_mode() {
                return true;
            }
            !std::mem::replace(&mut tls_mode_taken, true)
        })
        .collect()
}

fn recommend_drop_udp_443(diagnosis: &DiagnosisResult) -> bool {
    if diagnosis.evidence_flag(evidence::TLS_TIMEOUT) {
        return false;
    }

    match diagnosis.diagnosis_id {
        DiagnosisId::DnsHijack => false,
        DiagnosisId::ActiveDpiEdge | DiagnosisId::StatefulDpi => true,
        DiagnosisId::QuicInterference => diagnosis.evidence_flag(evidence::QUIC_FAILURE),
        _ => diagnosis.evidence_flag(evidence::HTTP3_FAILURE_ONLY),
    }
}

fn recommend_allow_no_sni(diagnosis: &DiagnosisResult) -> bool {
    let tested = diagnosis.evidence_count(evidence::HOST_TESTED_COUNT).unwrap_or(0);
    let no_sni = diagnosis
        .evidence_count(evidence::HOST_TESTED_NO_SNI_COUNT)
        .unwrap_or(0);
    if tested < 2 || no_sni < NO_SNI_MIN_COUNT {
        return false;
    }
    f64::from(no_sni) / f64::from(tested) >= NO_SNI_RATIO_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{FeedbackStore, InMemoryFeedbackStore, StrategyOutcome};
    use chrono::Utc;
    use std::cell::RefCell;

    fn diagnose(id: DiagnosisId, confidence: i32) -> DiagnosisResult {
        DiagnosisResult::new(id, confidence)
    }

    fn record(store: &InMemoryFeedbackStore, diagnosis: DiagnosisId, strategy: StrategyId, ok: u32, fail: u32) {
        let key = FeedbackKey::new(diagnosis, strategy);
        for _ in 0..ok {
            store.record(key, StrategyOutcome::Success, Utc::now());
        }
        for _ in 0..fail {
            store.record(key, StrategyOutcome::Failure, Utc::now());
        }
    }

    fn with_store(store: InMemoryFeedbackStore) -> StrategySelector {
        StrategySelector::default().with_feedback(Arc::new(store))
    }

    #[test]
    fn test_low_confidence_yields_empty_plan() {
        let plan = StrategySelector::default().select(&diagnose(DiagnosisId::StatefulDpi, 49));
        assert!(plan.is_empty());
        assert_eq!(plan.reason, PlanReason::ConfidenceBelowThreshold);
        assert!(!plan.drop_udp_443);
        assert!(!plan.allow_no_sni);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let selector = StrategySelector::default();
        assert_eq!(selector.select(&diagnose(DiagnosisId::SilentDrop, 250)).plan_confidence, 100);
        let plan = selector.select(&diagnose(DiagnosisId::SilentDrop, -5));
        assert_eq!(plan.plan_confidence, 0);
        assert_eq!(plan.reason, PlanReason::ConfidenceBelowThreshold);
    }

    #[test]
    fn test_excluded_and_unmapped_are_distinguished() {
        let selector = StrategySelector::default();

        let excluded = selector.select(&diagnose(DiagnosisId::NoBlockage, 95));
        assert!(excluded.is_empty());
        assert_eq!(excluded.reason, PlanReason::DiagnosisExcluded);

        let unmapped = selector.select(&diagnose(DiagnosisId::QuicInterference, 95));
        assert!(unmapped.is_empty());
        assert_eq!(unmapped.reason, PlanReason::DiagnosisUnmapped);
        assert_ne!(excluded.reasoning, unmapped.reasoning);
    }

    #[test]
    fn test_assist_only_plan_for_quic_interference() {
        let diagnosis = diagnose(DiagnosisId::QuicInterference, 80)
            .with_evidence(evidence::QUIC_FAILURE, "true");
        let plan = StrategySelector::default().select(&diagnosis);

        assert!(plan.is_empty());
        assert!(plan.drop_udp_443);
        assert_eq!(plan.reason, PlanReason::Planned);
        assert!(plan.reasoning.contains("no strategy mapping"));
        assert!(plan.reasoning.contains("assist: QUIC->TCP"));
        assert_eq!(plan.to_strategy_text(), "plan:DropUdp443 (conf=80)");
    }

    #[test]
    fn test_silent_drop_plan() {
        let plan = StrategySelector::default().select(&diagnose(DiagnosisId::SilentDrop, 78));
        assert_eq!(plan.strategy_ids(), vec![StrategyId::TlsFragment, StrategyId::DropRst]);
        assert_eq!(plan.reason, PlanReason::Planned);
        assert!(!plan.drop_udp_443);
        assert_eq!(plan.to_strategy_text(), "plan:TlsFragment + DropRst (conf=78)");
    }

    #[test]
    fn test_high_risk_gated_by_confidence() {
        let selector = StrategySelector::default();

        let plan = selector.select(&diagnose(DiagnosisId::StatefulDpi, 60));
        assert_eq!(
            plan.strategy_ids(),
            vec![StrategyId::TlsDisorder, StrategyId::DropRst, StrategyId::HttpHostTricks]
        );
        assert!(plan.strategies.iter().all(|s| s.risk != RiskLevel::High));
        assert!(plan.drop_udp_443);

        let plan = selector.select(&diagnose(DiagnosisId::StatefulDpi, 90));
        assert!(plan.contains(StrategyId::BadChecksum));
    }

    #[test]
    fn test_unimplemented_strategy_is_reported_to_sink() {
        let warnings = RefCell::new(Vec::<String>::new());
        let sink = |message: &str| warnings.borrow_mut().push(message.to_string());

        let diagnosis = diagnose(DiagnosisId::ActiveDpiEdge, 90).with_evidence(evidence::TLS_TIMEOUT, "true");
        let plan = StrategySelector::default().select_with_sink(&diagnosis, Some(&sink));

        assert_eq!(
            plan.strategy_ids(),
            vec![
                StrategyId::TlsDisorder,
                StrategyId::DropRst,
                StrategyId::HttpHostTricks,
                StrategyId::BadChecksum
            ]
        );
        assert!(!plan.drop_udp_443);
        let warnings = warnings.borrow();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("AggressiveFragment"));
    }

    #[test]
    fn test_capability_changes_apply_to_next_selection() {
        let registry = Arc::new(CapabilityRegistry::with_defaults());
        let selector = StrategySelector::default().with_capabilities(Arc::clone(&registry));

        registry.mark_implemented(StrategyId::AggressiveFragment);
        registry.revoke(StrategyId::TlsDisorder);
        registry.revoke(StrategyId::TlsFragment);

        let plan = selector.select(&diagnose(DiagnosisId::StatefulDpi, 90));
        assert_eq!(
            plan.strategy_ids(),
            vec![
                StrategyId::DropRst,
                StrategyId::AggressiveFragment,
                StrategyId::HttpHostTricks,
                StrategyId::BadChecksum
            ]
        );
    }

    #[test]
    fn test_all_filtered() {
        let selector =
            StrategySelector::default().with_capabilities(Arc::new(CapabilityRegistry::new()));
        let silent = |_: &str| {};
        let plan = selector.select_with_sink(&diagnose(DiagnosisId::HttpRedirect, 90), Some(&silent));
        assert!(plan.is_empty());
        assert_eq!(plan.reason, PlanReason::AllCandidatesFiltered);
    }

    #[test]
    fn test_plan_invariants_hold_for_every_diagnosis() {
        let selector = StrategySelector::default();
        let silent = |_: &str| {};
        for id in DiagnosisId::ALL {
            for confidence in [0, 50, 69, 70, 100] {
                let plan = selector.select_with_sink(&diagnose(id, confidence), Some(&silent));
                let tls_modes = plan.strategies.iter().filter(|s| s.id.is_tls_mode()).count();
                assert!(tls_modes <= 1, "{id} at {confidence}");

                let mut ids = plan.strategy_ids();
                ids.sort();
                ids.dedup();
                assert_eq!(ids.len(), plan.strategies.len());

                if plan.plan_confidence < 70 {
                    assert!(plan.strategies.iter().all(|s| s.risk != RiskLevel::High));
                }
                for s in &plan.strategies {
                    assert!(selector.capabilities().is_implemented(s.id));
                }
            }
        }
    }

    #[test]
    fn test_feedback_reorders_plan() {
        let store = InMemoryFeedbackStore::default();
        record(&store, DiagnosisId::TlsInterference, StrategyId::TlsFragment, 10, 0);
        let selector = with_store(store);

        assert_eq!(selector.feedback_boost(DiagnosisId::TlsInterference, StrategyId::TlsFragment), 15);

        let plan = selector.select(&diagnose(DiagnosisId::TlsInterference, 80));
        assert_eq!(plan.strategy_ids(), vec![StrategyId::TlsFragment, StrategyId::DropRst]);
        assert_eq!(plan.reason, PlanReason::PlannedWithFeedback);
        assert!(plan.reasoning.contains("feedback"));
    }

    #[test]
    fn test_feedback_below_sample_threshold_is_ignored() {
        let store = InMemoryFeedbackStore::default();
        record(&store, DiagnosisId::TlsInterference, StrategyId::TlsFragment, 4, 0);
        let selector = with_store(store);

        assert_eq!(selector.feedback_boost(DiagnosisId::TlsInterference, StrategyId::TlsFragment), 0);
        let plan = selector.select(&diagnose(DiagnosisId::TlsInterference, 80));
        assert_eq!(plan.strategy_ids(), vec![StrategyId::TlsDisorder, StrategyId::DropRst]);
        assert_eq!(plan.reason, PlanReason::Planned);
    }

    #[test]
    fn test_boost_rounds_half_away_from_zero() {
        let store = InMemoryFeedbackStore::default();
        record(&store, DiagnosisId::SilentDrop, StrategyId::TlsFragment, 3, 1);
        record(&store, DiagnosisId::SilentDrop, StrategyId::DropRst, 1, 3);
        record(&store, DiagnosisId::SilentDrop, StrategyId::UseDoh, 5, 5);
        let selector = with_store(store);

        assert_eq!(selector.feedback_boost(DiagnosisId::SilentDrop, StrategyId::TlsFragment), 8);
        assert_eq!(selector.feedback_boost(DiagnosisId::SilentDrop, StrategyId::DropRst), -8);
        assert_eq!(selector.feedback_boost(DiagnosisId::SilentDrop, StrategyId::UseDoh), 0);
    }

    #[test]
    fn test_boost_is_monotonic_in_success_rate() {
        let mut previous = i32::MIN;
        for successes in 0..=10 {
            let store = InMemoryFeedbackStore::default();
            record(&store, DiagnosisId::SilentDrop, StrategyId::DropRst, successes, 10 - successes);
            let boost = with_store(store).feedback_boost(DiagnosisId::SilentDrop, StrategyId::DropRst);
            assert!(boost >= previous);
            assert!((-15..=15).contains(&boost));
            previous = boost;
        }
    }

    #[test]
    fn test_equal_effective_priority_prefers_higher_base() {
        let store = InMemoryFeedbackStore::default();
        // 1/6 success rate -> boost -10, bringing TlsDisorder (90) level with TlsFragment (80).
        record(&store, DiagnosisId::TlsInterference, StrategyId::TlsDisorder, 1, 5);
        let selector = with_store(store);

        assert_eq!(selector.feedback_boost(DiagnosisId::TlsInterference, StrategyId::TlsDisorder), -10);
        let plan = selector.select(&diagnose(DiagnosisId::TlsInterference, 80));
        assert_eq!(plan.strategy_ids()[0], StrategyId::TlsDisorder);
    }

    #[test]
    fn test_allow_no_sni() {
        let selector = StrategySelector::default();
        let base = diagnose(DiagnosisId::TlsInterference, 80);

        let plan = selector.select(
            &base
                .clone()
                .with_evidence(evidence::HOST_TESTED_COUNT, "3")
                .with_evidence(evidence::HOST_TESTED_NO_SNI_COUNT, "3"),
        );
        assert!(plan.allow_no_sni);
        assert!(plan.reasoning.contains("assist: No SNI"));
        assert!(plan.to_strategy_text().contains("AllowNoSni"));

        let plan = selector.select(
            &base
                .clone()
                .with_evidence(evidence::HOST_TESTED_COUNT, "3")
                .with_evidence(evidence::HOST_TESTED_NO_SNI_COUNT, "2"),
        );
        assert!(!plan.allow_no_sni);

        // No TLS bypass in a DNS plan.
        let plan = selector.select(
            &diagnose(DiagnosisId::DnsHijack, 80)
                .with_evidence(evidence::HOST_TESTED_COUNT, "4")
                .with_evidence(evidence::HOST_TESTED_NO_SNI_COUNT, "4"),
        );
        assert!(!plan.allow_no_sni);
    }

    #[test]
    fn test_dns_hijack_never_drops_udp() {
        let diagnosis = diagnose(DiagnosisId::DnsHijack, 90)
            .with_evidence(evidence::HTTP3_FAILURE_ONLY, "true");
        let plan = StrategySelector::default().select(&diagnosis);
        assert_eq!(plan.strategy_ids(), vec![StrategyId::UseDoh]);
        assert!(!plan.drop_udp_443);

        let diagnosis = diagnose(DiagnosisId::SilentDrop, 90)
            .with_evidence(evidence::HTTP3_FAILURE_ONLY, "true");
        assert!(StrategySelector::default().select(&diagnosis).drop_udp_443);
    }

    #[test]
    fn test_redirect_host_in_reasoning() {
        let diagnosis = diagnose(DiagnosisId::HttpRedirect, 60)
            .with_evidence(evidence::REDIRECT_HOST, "warning.rt.example");
        let plan = StrategySelector::default().select(&diagnosis);
        assert!(plan.reasoning.contains("redirect_host=warning.rt.example"));
        assert!(plan.reasoning.contains("captive portal"));
    }
}
