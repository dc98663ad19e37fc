//! Annotate command: render a diagnosis annotation as an [INTEL] suffix.

use anyhow::Result;
use colored::Colorize;

use unblock_core::RecommendationFormatter;

use crate::config::Config;

/// Execute the annotate command.
pub async fn execute(text: &str, config: &Config) -> Result<()> {
    let formatter = RecommendationFormatter::new(config.formatter.clone());
    match formatter.format_diagnosis_suffix(text) {
        Some(suffix) => println!("{}", suffix),
        None => println!("{}", "No intel annotation found".yellow()),
    }
    Ok(())
}
