//! Recommend command: render one deduplicated recommendation line.

use anyhow::Result;
use colored::Colorize;

use unblock_core::RecommendationFormatter;

use crate::cli::RecommendArgs;
use crate::config::Config;

/// Execute the recommend command.
pub async fn execute(args: RecommendArgs, config: &Config) -> Result<()> {
    let formatter = RecommendationFormatter::new(config.formatter.clone());
    match formatter.build_recommendation_line(&args.host, &args.strategies, args.context.as_deref()) {
        Some(line) => println!("{}", line),
        None => println!("{}", "No recommendable strategies".yellow()),
    }
    Ok(())
}
