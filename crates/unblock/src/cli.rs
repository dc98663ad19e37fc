//! CLI argument definitions using clap derive macros.
//!
//! Command structure for planning, annotation and sync simulation.

use clap::{Args, Parser, Subcommand};
use std::net::IpAddr;

/// Connectivity bypass planner
///
/// Turns a connectivity diagnosis into a ranked bypass plan, renders
/// recommendation lines and exercises the reactive target sync.
#[derive(Parser, Debug)]
#[command(name = "unblock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a bypass plan for a diagnosis
    Plan(PlanArgs),

    /// Render a diagnosis annotation as an [INTEL] suffix
    Annotate {
        /// Annotation text, e.g. "(intel:SilentDrop conf=78; retrans high)"
        text: String,
    },

    /// Render a deduplicated recommendation line
    Recommend(RecommendArgs),

    /// Strategy outcome feedback
    Feedback(FeedbackCommand),

    /// Show which strategies the executor implements
    Capabilities {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Drive the target sync service against in-memory state
    SimulateSync(SimulateArgs),

    /// Show version information
    Version,
}

// ─────────────────────────────────────────────────────────────────────────────
// Plan
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Diagnosis id (e.g. ActiveDpiEdge, SilentDrop)
    pub diagnosis: String,

    /// Diagnosis confidence (0-100)
    #[arg(short, long, default_value_t = 80, allow_negative_numbers = true)]
    pub confidence: i32,

    /// Explanation note (repeatable)
    #[arg(short, long)]
    pub note: Vec<String>,

    /// Evidence fact as key=value (repeatable)
    #[arg(short, long, value_parser = parse_key_value)]
    pub evidence: Vec<(String, String)>,

    /// Ignore recorded feedback when ranking
    #[arg(long)]
    pub no_feedback: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Recommend
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct RecommendArgs {
    /// Host the recommendation applies to
    pub host: String,

    /// Strategy text, e.g. "plan:TlsFragment + DropRst (conf=78)"
    pub strategies: String,

    /// Extra context appended after the strategy list
    #[arg(long)]
    pub context: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Feedback
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct FeedbackCommand {
    #[command(subcommand)]
    pub action: FeedbackAction,
}

#[derive(Subcommand, Debug)]
pub enum FeedbackAction {
    /// Record the outcome of applying a strategy
    Record {
        /// Diagnosis id
        diagnosis: String,

        /// Strategy id (name or legacy token)
        strategy: String,

        /// Outcome: success or failure
        outcome: String,
    },

    /// Show recorded statistics
    Show {
        /// Only show entries for this diagnosis
        #[arg(short, long)]
        diagnosis: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply retention and persist the result
    Prune,
}

// ─────────────────────────────────────────────────────────────────────────────
// Simulate sync
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Primary target host
    #[arg(long)]
    pub host: String,

    /// Secondary target host
    #[arg(long)]
    pub secondary: Option<String>,

    /// Observed IP address with blocked UDP/443
    #[arg(long)]
    pub ip: IpAddr,

    /// Number of repeated observations to report
    #[arg(short, long, default_value_t = 3)]
    pub reports: u32,

    /// Fail this many delivery attempts before succeeding
    #[arg(long, default_value_t = 0)]
    pub fail_first: u32,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_plan_args() {
        let cli = Cli::parse_from([
            "unblock",
            "plan",
            "SilentDrop",
            "--confidence",
            "78",
            "--evidence",
            "tls_timeout=true",
            "--note",
            "retrans high",
        ]);
        let Commands::Plan(args) = cli.command else {
            panic!("expected plan");
        };
        assert_eq!(args.diagnosis, "SilentDrop");
        assert_eq!(args.confidence, 78);
        assert_eq!(args.evidence, vec![("tls_timeout".to_string(), "true".to_string())]);
        assert_eq!(args.note, vec!["retrans high".to_string()]);
        assert!(!args.no_feedback);
    }

    #[test]
    fn test_key_value_parser() {
        assert_eq!(
            parse_key_value(" redirect_host = portal.example "),
            Ok(("redirect_host".to_string(), "portal.example".to_string()))
        );
        assert!(parse_key_value("no-separator").is_err());
        assert!(parse_key_value("=value").is_err());
    }

    #[test]
    fn test_simulate_args() {
        let cli = Cli::parse_from([
            "unblock",
            "simulate-sync",
            "--host",
            "example.com",
            "--ip",
            "203.0.113.5",
            "--fail-first",
            "2",
        ]);
        let Commands::SimulateSync(args) = cli.command else {
            panic!("expected simulate-sync");
        };
        assert_eq!(args.reports, 3);
        assert_eq!(args.fail_first, 2);
        assert!(args.ip.is_ipv4());
    }
}
