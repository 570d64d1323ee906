//! # TaskWarden: assignment & reminder daemon
//!
//! Loads config and a roster, then runs the reminder loop and the
//! notification router until Ctrl-C.
//!
//! Usage:
//!   taskwarden                              # Run with ~/.taskwarden/config.toml
//!   taskwarden --roster team.toml           # Seed assignees and rules from a roster
//!   taskwarden --once                       # One reminder pass, print a summary, exit
//!   taskwarden --init-config                # Write a default config and exit

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use taskwarden_core::TaskWardenConfig;
use taskwarden_engine::{
    AssignmentEngine, Roster, delivery_from_config, dispatch_due, spawn_notification_router,
    spawn_reminder_loop,
};

#[derive(Parser)]
#[command(
    name = "taskwarden",
    version,
    about = "📋 TaskWarden: rules-driven task assignment and reminders"
)]
struct Cli {
    /// Config file
    #[arg(short, long, default_value = "~/.taskwarden/config.toml")]
    config: String,

    /// Roster file (overrides `roster_path` in the config)
    #[arg(short, long)]
    roster: Option<String>,

    /// Run a single reminder pass and exit
    #[arg(long)]
    once: bool,

    /// Write the default config to ~/.taskwarden/config.toml and exit
    #[arg(long)]
    init_config: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

fn load_config(path: &Path) -> Result<TaskWardenConfig> {
    if path.exists() {
        Ok(TaskWardenConfig::load_from(path)?)
    } else {
        tracing::debug!("No config at {}, using defaults", path.display());
        Ok(TaskWardenConfig::default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "taskwarden=debug,taskwarden_engine=debug"
    } else {
        "taskwarden=info,taskwarden_engine=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    if cli.init_config {
        let path = TaskWardenConfig::default_path();
        if path.exists() {
            println!("⚠️  Config already exists: {}", path.display());
        } else {
            TaskWardenConfig::default().save()?;
            println!("✅ Default config written to {}", path.display());
        }
        return Ok(());
    }

    let config = load_config(&expand_path(&cli.config))?;

    let mut engine = AssignmentEngine::with_config(&config);
    if let Some(roster) = cli.roster.as_deref().or(config.roster_path.as_deref()) {
        Roster::load_from(&expand_path(roster))?.apply(&mut engine)?;
    }
    let delivery = delivery_from_config(&config.delivery)?;
    let engine = engine.shared();

    if cli.once {
        let report = dispatch_due(&engine, delivery.as_ref(), chrono::Utc::now()).await;
        let summary = engine.lock().await.summary(chrono::Utc::now());
        println!("📋 TaskWarden v{}", env!("CARGO_PKG_VERSION"));
        println!(
            "   ⏰ Reminders:   {} claimed, {} sent, {} failed",
            report.claimed, report.sent, report.failed
        );
        println!(
            "   📌 Assignments: {} total, {} overdue, {} due today, {} due this week",
            summary.total, summary.overdue, summary.due_today, summary.due_soon
        );
        return Ok(());
    }

    println!("📋 TaskWarden v{}", env!("CARGO_PKG_VERSION"));
    println!("   📨 Delivery:  {}", delivery.name());
    println!("   ⏰ Tick:      every {}s", config.reminders.tick_interval_secs);
    {
        let eng = engine.lock().await;
        println!("   👥 Assignees: {}", eng.directory().list().len());
        println!(
            "   📐 Rules:     {} auto-assignment, {} notification",
            eng.rules().auto_rules().len(),
            eng.rules().notification_rules().len()
        );
    }
    println!();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let router =
        spawn_notification_router(engine.clone(), delivery.clone(), shutdown_rx.clone()).await;
    let reminders = spawn_reminder_loop(
        engine.clone(),
        delivery,
        Duration::from_secs(config.reminders.tick_interval_secs.max(1)),
        shutdown_rx,
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("🛑 Shutting down");
    shutdown_tx.send(true).ok();
    let (router, reminders) = tokio::join!(router, reminders);
    router?;
    reminders?;
    Ok(())
}
