//! Operator CLI for the casework engine
//!
//! Inspects configuration and persisted state, and runs reconciliation
//! passes against a state snapshot without a chat platform attached.
//!
//! # Usage
//!
//! ```bash
//! # Validate a config file and print its effective settings
//! casework-cli --config casework.toml check-config
//!
//! # Show the hierarchy and the report routing table
//! casework-cli ranks
//! casework-cli escalation --category supervision
//!
//! # Inspect persisted state
//! CASEWORK_STATE_PATH=./state.json casework-cli intents
//! casework-cli --state ./state.json audit --limit 20
//!
//! # Run every sweep once, or keep running until Ctrl-C
//! casework-cli --state ./state.json sweep
//! casework-cli --state ./state.json run
//! ```

mod offline;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use casework::{
    escalation_category, Casework, CaseworkConfig, MemoryCaseStore, RankCategory, SystemClock,
};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::offline::LogOnly;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML config file; defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State snapshot path (overrides state_path and CASEWORK_STATE_PATH)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate configuration and print the effective settings
    CheckConfig,
    /// List the rank hierarchy, highest first
    Ranks,
    /// Print where reports against each category are routed
    Escalation {
        /// Only this category ("staff" for a non-staff subject)
        #[arg(long)]
        category: Option<String>,
    },
    /// List pending scheduled intents
    Intents,
    /// Print recent audit entries as JSON lines
    Audit {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Run each reconciliation pass once
    Sweep {
        /// Leave channel deletions pending
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Run the reconciliation scheduler until interrupted
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "casework=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::CheckConfig => check_config(&config),
        Command::Ranks => print_ranks(&config),
        Command::Escalation { category } => print_escalation(category.as_deref()),
        Command::Intents => {
            let engine = open_engine(config, true)?;
            for intent in engine.intents().pending().await? {
                println!("{}", serde_json::to_string(&intent)?);
            }
            Ok(())
        }
        Command::Audit { limit } => {
            let engine = open_engine(config, true)?;
            for entry in engine.recent_audit(limit).await? {
                println!("{}", serde_json::to_string(&entry)?);
            }
            Ok(())
        }
        Command::Sweep { dry_run } => sweep(open_engine(config, dry_run)?).await,
        Command::Run => run(open_engine(config, false)?).await,
    }
}

fn load_config(cli: &Cli) -> Result<CaseworkConfig> {
    let mut config = match &cli.config {
        Some(path) => CaseworkConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => CaseworkConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("applying CASEWORK_* environment overrides")?;
    if let Some(state) = &cli.state {
        config.state_path = Some(state.clone());
    }
    Ok(config)
}

fn open_engine(config: CaseworkConfig, dry_run: bool) -> Result<Casework> {
    let store = match &config.state_path {
        Some(path) => MemoryCaseStore::open(path)
            .with_context(|| format!("opening state snapshot {}", path.display()))?,
        None => {
            info!("No state path configured, using an empty in-memory store");
            MemoryCaseStore::new()
        }
    };
    let engine = Casework::new(
        config,
        store.shared(),
        LogOnly::collaborators(dry_run),
        Arc::new(SystemClock),
    )
    .context("building engine")?;
    Ok(engine)
}

fn check_config(config: &CaseworkConfig) -> Result<()> {
    let directory = config.validate().context("config is invalid")?;
    let summary = json!({
        "ranks": directory.len(),
        "top_rank": directory.top_rank().key,
        "state_path": config.state_path,
        "top_authority_id": config.alerts.top_authority_id,
        "tickets": config.tickets,
        "sweeps": config.sweeps,
        "collaborator_timeout_ms": config.collaborators.timeout_ms,
        "draft_ttl_secs": config.drafts.ttl_secs,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if config.alerts.top_authority_id.is_none() {
        tracing::warn!("alerts.top_authority_id is unset; reports against the top category alert nobody");
    }
    Ok(())
}

fn print_ranks(config: &CaseworkConfig) -> Result<()> {
    let directory = config.validate().context("config is invalid")?;
    for rank in directory.all_ranks_ordered_high_to_low() {
        println!(
            "{:>2}  {:<28} {:<24} {}",
            rank.level, rank.key, rank.name, rank.category
        );
    }
    Ok(())
}

fn print_escalation(category: Option<&str>) -> Result<()> {
    let rows: Vec<Option<RankCategory>> = match category {
        Some("staff") | Some("none") => vec![None],
        Some(name) => vec![Some(
            name.parse::<RankCategory>()
                .with_context(|| format!("unknown category {:?}", name))?,
        )],
        None => RankCategory::all()
            .iter()
            .copied()
            .map(Some)
            .chain(std::iter::once(None))
            .collect(),
    };
    for reported in rows {
        let route = escalation_category(reported);
        let label = reported.map_or("(not staff)".to_string(), |c| c.to_string());
        println!(
            "{:<18} -> {:<18}{}",
            label,
            route.viewing_category.to_string(),
            if route.alert_top_authority {
                "  + top authority alert"
            } else {
                ""
            }
        );
    }
    Ok(())
}

async fn sweep(engine: Casework) -> Result<()> {
    let scheduler = engine.scheduler();
    let suspensions = scheduler
        .on_suspension_sweep_tick()
        .await
        .context("suspension sweep")?;
    let tickets = scheduler
        .on_ticket_inactivity_sweep_tick()
        .await
        .context("ticket inactivity sweep")?;
    let intents = scheduler
        .on_intent_dispatch_tick()
        .await
        .context("intent dispatch")?;
    let report = json!({
        "suspensions": suspensions,
        "tickets": tickets,
        "intents": intents,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run(engine: Casework) -> Result<()> {
    let cancel = CancellationToken::new();
    let handle = engine.scheduler().spawn(cancel.clone());
    info!("Scheduler running, Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("Shutting down");
    cancel.cancel();
    handle.await.context("scheduler task panicked")?;
    Ok(())
}
