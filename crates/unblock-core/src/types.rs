//! Shared contract types for unblock-core.
//!
//! Diagnoses come in from an upstream diagnosis engine, plans go out to the UI
//! and execution layers. All of these are plain values: built once, never
//! mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Wire markers
// ─────────────────────────────────────────────────────────────────────────────

/// Marker that opens a diagnosis annotation: `(intel:<Id> conf=<N>; ...)`.
pub const INTEL_MARKER: &str = "intel:";
/// Confidence marker inside a diagnosis annotation.
pub const CONFIDENCE_MARKER: &str = "conf=";
/// Optional prefix of a strategy list: `plan:A + B (conf=N)`.
pub const PLAN_PREFIX: &str = "plan:";
/// Sentinel for "no strategy".
pub const STRATEGY_NONE: &str = "NONE";
/// Sentinel for "unknown strategy".
pub const STRATEGY_UNKNOWN: &str = "UNKNOWN";
/// Assist token: suppress UDP/443 so clients fall back from QUIC to TCP.
pub const ASSIST_DROP_UDP_443: &str = "DropUdp443";
/// Assist token: allow bypass even when no SNI was recognized.
pub const ASSIST_ALLOW_NO_SNI: &str = "AllowNoSni";

/// Confidence required before any plan is produced.
pub const MIN_CONFIDENCE_FOR_PLAN: i32 = 50;
/// Confidence required before High-risk strategies may be recommended.
pub const MIN_CONFIDENCE_FOR_HIGH_RISK: i32 = 70;

// ─────────────────────────────────────────────────────────────────────────────
// Diagnosis
// ─────────────────────────────────────────────────────────────────────────────

/// Classification of why connections to a host are degraded or blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiagnosisId {
    /// Not enough data, or no rule matched.
    Unknown,
    /// Fast RST with a TTL anomaly.
    ActiveDpiEdge,
    /// Slow RST, stateful inspection.
    StatefulDpi,
    /// Timeouts with a high retransmission share.
    SilentDrop,
    /// DNS answers are spoofed or intercepted.
    DnsHijack,
    /// HTTP stub page or redirect.
    HttpRedirect,
    /// DNS tampering and DPI at the same time.
    MultiLayerBlock,
    /// TLS handshake problems without enough evidence for DPI.
    TlsInterference,
    /// QUIC/HTTP3 handshakes go unanswered.
    QuicInterference,
    /// The host is legitimately unreachable, not blocked.
    NoBlockage,
}

impl DiagnosisId {
    /// Every diagnosis, in declaration order.
    pub const ALL: [DiagnosisId; 10] = [
        DiagnosisId::Unknown,
        DiagnosisId::ActiveDpiEdge,
        DiagnosisId::StatefulDpi,
        DiagnosisId::SilentDrop,
        DiagnosisId::DnsHijack,
        DiagnosisId::HttpRedirect,
        DiagnosisId::MultiLayerBlock,
        DiagnosisId::TlsInterference,
        DiagnosisId::QuicInterference,
        DiagnosisId::NoBlockage,
    ];

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosisId::Unknown => "Unknown",
            DiagnosisId::ActiveDpiEdge => "ActiveDpiEdge",
            DiagnosisId::StatefulDpi => "StatefulDpi",
            DiagnosisId::SilentDrop => "SilentDrop",
            DiagnosisId::DnsHijack => "DnsHijack",
            DiagnosisId::HttpRedirect => "HttpRedirect",
            DiagnosisId::MultiLayerBlock => "MultiLayerBlock",
            DiagnosisId::TlsInterference => "TlsInterference",
            DiagnosisId::QuicInterference => "QuicInterference",
            DiagnosisId::NoBlockage => "NoBlockage",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for DiagnosisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the upstream diagnosis engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub diagnosis_id: DiagnosisId,
    /// Confidence, nominally 0..=100. The selector clamps it.
    pub confidence: i32,
    /// Rule or heuristic that fired
    #[serde(default)]
    pub matched_rule: Option<String>,
    /// Minimal facts the diagnosis is based on
    #[serde(default)]
    pub evidence: BTreeMap<String, String>,
    /// Short explanations for UI and logs
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default = "Utc::now")]
    pub diagnosed_at: DateTime<Utc>,
}

impl DiagnosisResult {
    /// Create a diagnosis with no evidence or notes.
    pub fn new(diagnosis_id: DiagnosisId, confidence: i32) -> Self {
        Self {
            diagnosis_id,
            confidence,
            matched_rule: None,
            evidence: BTreeMap::new(),
            notes: Vec::new(),
            diagnosed_at: Utc::now(),
        }
    }

    /// Set the matched rule name
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.matched_rule = Some(rule.into());
        self
    }

    /// Append an explanation note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Add an evidence fact
    pub fn with_evidence(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.evidence.insert(key.into(), value.into());
        self
    }

    /// Evidence value interpreted as a boolean flag.
    pub fn evidence_flag(&self, key: &str) -> bool {
        self.evidence
            .get(key)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false)
    }

    /// Evidence value interpreted as a counter.
    pub fn evidence_count(&self, key: &str) -> Option<u32> {
        self.evidence.get(key).and_then(|v| v.trim().parse().ok())
    }

    /// Render the annotation tail consumed by the recommendation formatter.
    ///
    /// `(intel:SilentDrop conf=78; timeout+retrans high; ...)`
    pub fn to_annotation(&self) -> String {
        let header = format!(
            "{}{} {}{}",
            INTEL_MARKER, self.diagnosis_id, CONFIDENCE_MARKER, self.confidence
        );
        if self.notes.is_empty() {
            format!("({})", header)
        } else {
            format!("({}; {})", header, self.notes.join("; "))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Strategies
// ─────────────────────────────────────────────────────────────────────────────

/// Logical bypass technique identifier.
///
/// The set is versioned by [`StrategyId::CATALOG_VERSION`]. Declaration order
/// is the final ranking tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StrategyId {
    TlsDisorder,
    TlsFragment,
    /// Fake ClientHello with a short TTL. Reserved.
    TlsFakeTtl,
    DropRst,
    HttpHostTricks,
    /// Reserved; QUIC fallback is expressed through the `drop_udp_443` assist flag.
    QuicObfuscation,
    /// Only affects fake packets.
    BadChecksum,
    UseDoh,
    /// High-risk fragmentation. Reserved.
    AggressiveFragment,
}

impl StrategyId {
    /// Bumped whenever identifiers are added or retired.
    pub const CATALOG_VERSION: u32 = 2;

    /// Every strategy, in declaration order.
    pub const ALL: [StrategyId; 9] = [
        StrategyId::TlsDisorder,
        StrategyId::TlsFragment,
        StrategyId::TlsFakeTtl,
        StrategyId::DropRst,
        StrategyId::HttpHostTricks,
        StrategyId::QuicObfuscation,
        StrategyId::BadChecksum,
        StrategyId::UseDoh,
        StrategyId::AggressiveFragment,
    ];

    /// Mutually exclusive TLS modes: at most one per plan.
    pub const TLS_MODE_GROUP: [StrategyId; 3] = [
        StrategyId::TlsDisorder,
        StrategyId::TlsFragment,
        StrategyId::AggressiveFragment,
    ];

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyId::TlsDisorder => "TlsDisorder",
            StrategyId::TlsFragment => "TlsFragment",
            StrategyId::TlsFakeTtl => "TlsFakeTtl",
            StrategyId::DropRst => "DropRst",
            StrategyId::HttpHostTricks => "HttpHostTricks",
            StrategyId::QuicObfuscation => "QuicObfuscation",
            StrategyId::BadChecksum => "BadChecksum",
            StrategyId::UseDoh => "UseDoh",
            StrategyId::AggressiveFragment => "AggressiveFragment",
        }
    }

    /// Token understood by legacy UI toggles and log parsers.
    pub fn legacy_token(&self) -> &'static str {
        match self {
            StrategyId::TlsDisorder => "TLS_DISORDER",
            StrategyId::TlsFragment => "TLS_FRAGMENT",
            StrategyId::TlsFakeTtl => "TLS_FAKE",
            StrategyId::DropRst => "DROP_RST",
            StrategyId::HttpHostTricks => "HTTPHOSTTRICKS",
            StrategyId::QuicObfuscation => "QUICOBFUSCATION",
            StrategyId::BadChecksum => "BADCHECKSUM",
            StrategyId::UseDoh => "DOH",
            StrategyId::AggressiveFragment => "AGGRESSIVEFRAGMENT",
        }
    }

    /// Parse from an identifier name or a legacy token (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|id| {
            id.as_str().eq_ignore_ascii_case(s) || id.legacy_token().eq_ignore_ascii_case(s)
        })
    }

    /// Member of the mutually exclusive TLS mode group.
    pub fn is_tls_mode(&self) -> bool {
        Self::TLS_MODE_GROUP.contains(self)
    }

    /// Any technique that manipulates the TLS ClientHello.
    pub fn is_tls_bypass(&self) -> bool {
        self.is_tls_mode() || *self == StrategyId::TlsFakeTtl
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy risk. Ordered Low < Medium < High.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Opaque strategy parameters, passed through to the execution layer.
pub type StrategyParams = BTreeMap<String, serde_json::Value>;

/// One recommended technique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BypassStrategy {
    pub id: StrategyId,
    /// Priority from the candidate table (higher = try earlier)
    pub base_priority: i32,
    pub risk: RiskLevel,
    #[serde(default)]
    pub parameters: StrategyParams,
}

// ─────────────────────────────────────────────────────────────────────────────
// Plans
// ─────────────────────────────────────────────────────────────────────────────

/// Why a plan looks the way it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanReason {
    /// Confidence below [`MIN_CONFIDENCE_FOR_PLAN`]
    ConfidenceBelowThreshold,
    /// No candidate mapping exists for the diagnosis
    DiagnosisUnmapped,
    /// The diagnosis is deliberately not acted upon
    DiagnosisExcluded,
    /// Candidates existed but none passed risk/capability gating
    AllCandidatesFiltered,
    /// Ranked by static priorities only
    Planned,
    /// Feedback statistics changed at least one effective priority
    PlannedWithFeedback,
}

impl PlanReason {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanReason::ConfidenceBelowThreshold => "confidence_below_threshold",
            PlanReason::DiagnosisUnmapped => "diagnosis_unmapped",
            PlanReason::DiagnosisExcluded => "diagnosis_excluded",
            PlanReason::AllCandidatesFiltered => "all_candidates_filtered",
            PlanReason::Planned => "planned",
            PlanReason::PlannedWithFeedback => "planned_with_feedback",
        }
    }

    /// Human-readable explanation used as the plan's base reasoning.
    pub fn description(&self) -> &'static str {
        match self {
            PlanReason::ConfidenceBelowThreshold => "confidence below threshold",
            PlanReason::DiagnosisUnmapped => "no strategy mapping for diagnosis",
            PlanReason::DiagnosisExcluded => "diagnosis excluded from recommendations",
            PlanReason::AllCandidatesFiltered => "all strategies filtered by risk/capability",
            PlanReason::Planned => "plan built from diagnosis",
            PlanReason::PlannedWithFeedback => "plan built from diagnosis (feedback)",
        }
    }

    /// Whether this reason accompanies an empty plan.
    pub fn is_empty_plan(&self) -> bool {
        !matches!(self, PlanReason::Planned | PlanReason::PlannedWithFeedback)
    }
}

impl fmt::Display for PlanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered recommendation for one diagnosis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BypassPlan {
    pub for_diagnosis: DiagnosisId,
    /// Strategies in recommendation order
    pub strategies: Vec<BypassStrategy>,
    pub plan_confidence: i32,
    pub reason: PlanReason,
    /// Short explanation for UI and logs
    pub reasoning: String,
    /// Assist: suppress UDP/443 to force QUIC -> TCP fallback
    pub drop_udp_443: bool,
    /// Assist: allow bypass without a recognized SNI
    pub allow_no_sni: bool,
    pub planned_at: DateTime<Utc>,
}

impl BypassPlan {
    /// Create an empty plan explained by `reason`.
    pub fn empty(for_diagnosis: DiagnosisId, plan_confidence: i32, reason: PlanReason) -> Self {
        Self {
            for_diagnosis,
            strategies: Vec::new(),
            plan_confidence,
            reason,
            reasoning: reason.description().to_string(),
            drop_udp_443: false,
            allow_no_sni: false,
            planned_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn contains(&self, id: StrategyId) -> bool {
        self.strategies.iter().any(|s| s.id == id)
    }

    /// Strategy ids in recommendation order.
    pub fn strategy_ids(&self) -> Vec<StrategyId> {
        self.strategies.iter().map(|s| s.id).collect()
    }

    /// Render the compact strategy list consumed by the recommendation formatter.
    ///
    /// `plan:TlsFragment + DropRst + DropUdp443 (conf=78)`, or `NONE`.
    pub fn to_strategy_text(&self) -> String {
        let mut tokens: Vec<&str> = self.strategies.iter().map(|s| s.id.as_str()).collect();
        if self.drop_udp_443 {
            tokens.push(ASSIST_DROP_UDP_443);
        }
        if self.allow_no_sni {
            tokens.push(ASSIST_ALLOW_NO_SNI);
        }

        if tokens.is_empty() {
            return STRATEGY_NONE.to_string();
        }

        format!(
            "{}{} ({}{})",
            PLAN_PREFIX,
            tokens.join(" + "),
            CONFIDENCE_MARKER,
            self.plan_confidence
        )
    }
}
