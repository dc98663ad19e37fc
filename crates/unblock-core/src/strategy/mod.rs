//! Strategy selection
//!
//! - [`catalog`]: static diagnosis -> candidate table
//! - [`capability`]: which strategies the execution layer can apply
//! - [`selector`]: ranking, gating and assist flags

pub mod capability;
pub mod catalog;
pub mod selector;

pub use capability::CapabilityRegistry;
pub use catalog::CandidateSet;
pub use selector::{StrategySelector, WarningSink};

/// Evidence keys the selector reads from [`crate::types::DiagnosisResult::evidence`].
pub mod evidence {
    /// `true` when TLS handshakes on TCP/443 time out
    pub const TLS_TIMEOUT: &str = "tls_timeout";
    /// `true` when QUIC handshakes fail (HTTP/3 probes or unanswered UDP handshakes)
    pub const QUIC_FAILURE: &str = "quic_failure";
    /// `true` when HTTP/3 probes only ever failed
    pub const HTTP3_FAILURE_ONLY: &str = "http3_failure_only";
    /// Number of tested hosts
    pub const HOST_TESTED_COUNT: &str = "host_tested_count";
    /// Number of tested hosts without a recognized SNI
    pub const HOST_TESTED_NO_SNI_COUNT: &str = "host_tested_no_sni_count";
    /// Redirect target observed for `HttpRedirect`
    pub const REDIRECT_HOST: &str = "redirect_host";
}
