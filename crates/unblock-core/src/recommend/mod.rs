//! User-facing recommendation text.

mod formatter;

pub use formatter::{
    INTEL_LOG_PREFIX, RecommendationFormatter, compact, extract_strategy_tokens, legacy_token,
};
