// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod reconcile;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::SyncConfig;
use crate::config::loader::load_and_validate;
use crate::engine::{Supervisor, TracingSink};
use crate::fs::RealFileSystem;
use crate::types::RuleScope;
use crate::watch::NotifyWatchSource;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the supervisor with the real filesystem and `notify` watches
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let supervisor = Supervisor::new(
        cfg,
        Arc::new(RealFileSystem),
        Arc::new(NotifyWatchSource::new()),
        Arc::new(TracingSink),
    );

    if args.once {
        let summaries = supervisor.reconcile_once().await?;
        let failed: usize = summaries.iter().map(|s| s.failures.len()).sum();
        if failed > 0 {
            bail!("reconcile finished with {} failed entries", failed);
        }
        info!("reconcile complete");
        return Ok(());
    }

    // Ctrl-C → graceful shutdown.
    {
        let handle = supervisor.handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            handle.shutdown();
        });
    }

    supervisor.run().await?;
    Ok(())
}

/// Simple dry-run output: print engine options, roots, targets and rules.
fn print_dry_run(cfg: &SyncConfig) {
    let o = &cfg.options;
    println!("csync dry-run");
    println!("  debounce = {:?}", o.debounce);
    println!("  rename_window = {:?}", o.rename_window);
    println!("  workers = {}", o.workers);
    println!("  queue_capacity = {}", o.queue_capacity);
    match o.reconcile_interval {
        Some(every) => println!("  reconcile_interval = {:?}", every),
        None => println!("  reconcile_interval = off"),
    }
    println!(
        "  retry = {} attempts, {:?}..{:?}",
        o.retry.max_attempts, o.retry.base_delay, o.retry.max_delay
    );
    println!("  checksum = {}", o.checksum);
    println!();

    println!("roots ({}):", cfg.roots.len());
    for root in &cfg.roots {
        println!("  - {} ({})", root.id, root.path.display());
        for target in &root.targets {
            println!("      -> {} ({})", target.id, target.path.display());
        }
        for rule in root.matcher.rules() {
            let scope = match rule.scope() {
                RuleScope::Both => "",
                RuleScope::Files => " [files]",
                RuleScope::Dirs => " [dirs]",
            };
            println!("      exclude: {}{}", rule.pattern(), scope);
        }
    }

    debug!("dry-run complete (nothing synced)");
}
