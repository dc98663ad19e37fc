//! Simulate-sync command: drive the reactive target sync service against
//! in-memory execution state and report what happened.

use anyhow::Result;
use async_trait::async_trait;
use colored::Colorize;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use unblock_runtime::{
    InMemoryTargetState, ReactiveTargetSync, SelectiveTargetSync, SyncConfig, SyncContext,
    SyncOutcome, SyncStatsSnapshot,
};

use crate::cli::SimulateArgs;
use crate::config::Config;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// In-memory state that reports the first `failures` deliveries as not applied.
struct FlakyTarget {
    state: InMemoryTargetState,
    failures_left: AtomicU32,
    attempts: AtomicU32,
}

impl FlakyTarget {
    fn new(failures: u32) -> Self {
        Self {
            state: InMemoryTargetState::new(),
            failures_left: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl SelectiveTargetSync for FlakyTarget {
    async fn try_sync_selective_targets(
        &self,
        target_key: &str,
        ip: IpAddr,
    ) -> unblock_runtime::Result<SyncOutcome> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        let failed = self
            .failures_left
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Ok(SyncOutcome::default());
        }
        self.state.try_sync_selective_targets(target_key, ip).await
    }
}

/// Outcome of one simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub targets: Vec<String>,
    pub attempts: u32,
    pub stats: SyncStatsSnapshot,
    pub pending_left: usize,
    pub drop_targets: Vec<Ipv4Addr>,
    pub elapsed_ms: u128,
}

/// Execute the simulate-sync command.
pub async fn execute(args: SimulateArgs, config: &Config) -> Result<()> {
    let report = simulate(&args, config.sync.clone()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "Reactive Target Sync".cyan().bold());
    println!("{}", "─".repeat(50));
    println!("  Targets:        {}", report.targets.join(", "));
    println!("  Observed IP:    {}", args.ip);
    println!("  Reports:        {}", args.reports);
    println!("  Attempts:       {}", report.attempts);
    println!("  Elapsed:        {} ms", report.elapsed_ms);
    println!();
    println!("  Observed:       {}", report.stats.observed);
    println!("  Coalesced:      {}", report.stats.coalesced);
    println!("  Delivered:      {}", report.stats.delivered.to_string().green());
    println!("  Failed tries:   {}", report.stats.failed_attempts);
    println!("  Exhausted:      {}", report.stats.exhausted);
    println!("  Expired:        {}", report.stats.expired);
    println!("  Overflow drops: {}", report.stats.overflow_dropped);
    if report.pending_left > 0 {
        println!("  Pending:        {}", report.pending_left.to_string().yellow());
    }
    println!();

    if report.drop_targets.is_empty() {
        println!("  {}", "UDP/443 drop list is empty".yellow());
    } else {
        let ips: Vec<String> = report.drop_targets.iter().map(|ip| ip.to_string()).collect();
        println!("  {} UDP/443 drop list: {}", "✓".green(), ips.join(", "));
    }

    Ok(())
}

async fn simulate(args: &SimulateArgs, config: SyncConfig) -> Result<SimulationReport> {
    let target = Arc::new(FlakyTarget::new(args.fail_first));
    let wait_limit = Duration::from_millis(config.event_ttl_ms) + Duration::from_secs(1);
    let service = ReactiveTargetSync::spawn(config, Arc::clone(&target) as Arc<dyn SelectiveTargetSync>)?;

    let context = SyncContext::selective(args.host.clone(), args.secondary.clone());
    let targets: Vec<String> = context.target_keys().iter().map(|k| k.to_lowercase()).collect();

    let started = Instant::now();
    for _ in 0..args.reports.max(1) {
        service.on_udp_blockage(args.ip, &context);
    }

    let deadline = started + wait_limit;
    while service.pending_len() > 0 && Instant::now() < deadline {
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    let elapsed_ms = started.elapsed().as_millis();

    let pending_left = service.pending_len();
    let stats = service.stats();
    service.shutdown_and_wait().await;

    Ok(SimulationReport {
        targets,
        attempts: target.attempts.load(Ordering::Relaxed),
        stats,
        pending_left,
        drop_targets: target.state.drop_targets(),
        elapsed_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(fail_first: u32) -> SimulateArgs {
        SimulateArgs {
            host: "Example.com".to_string(),
            secondary: Some("cdn.example.com".to_string()),
            ip: "203.0.113.5".parse().unwrap(),
            reports: 3,
            fail_first,
            json: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_delivers_both_targets() {
        let report = simulate(&args(0), SyncConfig::default()).await.unwrap();

        assert_eq!(report.targets, vec!["example.com", "cdn.example.com"]);
        assert_eq!(report.stats.delivered, 2);
        assert_eq!(report.stats.coalesced, 4);
        assert_eq!(report.pending_left, 0);
        assert_eq!(report.drop_targets, vec![Ipv4Addr::new(203, 0, 113, 5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_retries_failed_deliveries() {
        let mut a = args(2);
        a.secondary = None;
        let report = simulate(&a, SyncConfig::default()).await.unwrap();

        assert_eq!(report.attempts, 3);
        assert_eq!(report.stats.failed_attempts, 2);
        assert_eq!(report.stats.delivered, 1);
        assert_eq!(report.pending_left, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_gives_up_after_max_attempts() {
        let mut a = args(u32::MAX);
        a.secondary = None;
        let config = SyncConfig {
            max_attempts: 3,
            ..SyncConfig::default()
        };
        let report = simulate(&a, config).await.unwrap();

        assert_eq!(report.attempts, 3);
        assert_eq!(report.stats.exhausted, 1);
        assert_eq!(report.stats.delivered, 0);
        assert!(report.drop_targets.is_empty());
    }
}
