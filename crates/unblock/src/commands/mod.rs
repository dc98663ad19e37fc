//! Command implementations for the unblock CLI.
//!
//! Each submodule implements the logic for one command.

pub mod annotate;
pub mod capabilities;
pub mod feedback;
pub mod plan;
pub mod recommend;
pub mod simulate;

use unblock_core::{DiagnosisId, Error, StrategyId};

/// Parse a diagnosis id given on the command line.
pub(crate) fn parse_diagnosis(raw: &str) -> unblock_core::Result<DiagnosisId> {
    DiagnosisId::parse(raw.trim()).ok_or_else(|| Error::unknown_diagnosis(raw.trim()))
}

/// Parse a strategy id given by name or legacy token.
pub(crate) fn parse_strategy(raw: &str) -> unblock_core::Result<StrategyId> {
    StrategyId::parse(raw.trim()).ok_or_else(|| Error::unknown_strategy(raw.trim()))
}
