//! unblock-core - Decision core for unblock
//!
//! This crate turns a classified connectivity diagnosis into a ranked bypass
//! plan and renders it for users:
//!
//! - **types**: diagnosis, strategy and plan contracts
//! - **strategy**: candidate catalog, capability registry and selector
//! - **feedback**: per (diagnosis, strategy) outcome statistics
//! - **recommend**: deduplicated recommendation lines
//! - **store**: thread-safe keyed store shared by the above
//! - **config**: tunables with defaults

pub mod config;
pub mod error;
pub mod feedback;
pub mod recommend;
pub mod store;
pub mod strategy;
pub mod types;

// Re-export commonly used types
pub use config::{ConfigValidationError, FeedbackStoreConfig, FormatterConfig, SelectorConfig};
pub use error::{Error, Result};
pub use feedback::{FeedbackKey, FeedbackSource, FeedbackStats, FeedbackStore, StrategyOutcome};
pub use recommend::RecommendationFormatter;
pub use store::KeyedStore;
pub use strategy::{CapabilityRegistry, StrategySelector};
pub use types::{
    BypassPlan, BypassStrategy, DiagnosisId, DiagnosisResult, PlanReason, RiskLevel, StrategyId,
};
