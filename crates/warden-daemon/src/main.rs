//! `warden` command-line entry point.
//!
//! Every subcommand is a thin call into [`ApprovalEngine`]. `serve` keeps the
//! store tidy by running `clean` on a fixed interval until Ctrl-C.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;

use warden_core::format::{
    format_approval_request, format_execution_report, format_status_line,
};
use warden_core::paths::default_data_dir;
use warden_core::{load_config, ApprovalEngine, ApprovalStatus, BatchTarget, ProposeOptions};

#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Human-gated execution of proposed shell commands")]
struct Cli {
    /// Data directory (defaults to $WARDEN_DIR or ~/.config/warden)
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// Shell used to run commands, e.g. "/bin/bash -c" (overrides config.json)
    #[arg(long, global = true, value_name = "PREFIX")]
    shell: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Propose commands for approval
    Propose(ProposeArgs),
    /// List approvals (pending only by default)
    List {
        /// Include finished approvals
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show one approval
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Approve a pending approval
    Approve {
        id: String,
        /// Who is approving
        #[arg(long, value_name = "NAME")]
        by: Option<String>,
        /// Execute right after approving
        #[arg(long)]
        run: bool,
    },
    /// Deny a pending approval
    Deny {
        id: String,
        #[arg(long, value_name = "NAME")]
        by: Option<String>,
    },
    /// Execute an approved approval
    Run { id: String },
    /// Approve and execute several approvals
    Batch {
        /// Every pending approval
        #[arg(long, conflicts_with = "ids")]
        all: bool,
        #[arg(required_unless_present = "all")]
        ids: Vec<String>,
        #[arg(long, value_name = "NAME")]
        by: Option<String>,
    },
    /// Delete finished approvals older than N days
    Clean {
        #[arg(long, value_name = "N")]
        days: Option<u32>,
    },
    /// Counts per status and recent activity
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Show recent audit log entries
    Log {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Run periodic cleanup until interrupted
    Serve,
}

#[derive(Parser, Debug)]
struct ProposeArgs {
    /// One-line description of the action
    #[arg(long)]
    summary: String,

    /// Shell command to run; repeat for several, run in order
    #[arg(long = "command", value_name = "CMD", required = true)]
    commands: Vec<String>,

    /// Longer explanation shown to the approver
    #[arg(long)]
    details: Option<String>,

    /// Approval window in minutes
    #[arg(long, value_name = "MINUTES")]
    ttl_minutes: Option<u32>,

    /// Extra environment for the commands
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    #[arg(long)]
    channel: Option<String>,

    #[arg(long)]
    chat_id: Option<String>,

    /// Who is proposing
    #[arg(long, value_name = "NAME")]
    by: Option<String>,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    let default_filter = if cli.verbose {
        "debug"
    } else if matches!(cli.command, Commands::Serve) {
        "info"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn open_engine(data_dir: Option<PathBuf>, shell: Option<String>) -> Result<ApprovalEngine> {
    let dir = match data_dir {
        Some(dir) => dir,
        None => default_data_dir().map_err(|e| anyhow!(e))?,
    };
    let mut config = load_config(&dir)
        .with_context(|| format!("failed to open data directory {}", dir.display()))?;
    if let Some(prefix) = shell {
        config = config.with_shell_prefix(prefix);
    }
    Ok(ApprovalEngine::new(config))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let engine = open_engine(cli.data_dir, cli.shell)?;
    let now = Utc::now();

    match cli.command {
        Commands::Propose(args) => {
            let mut options = ProposeOptions {
                details: args.details,
                ttl: args
                    .ttl_minutes
                    .map(|m| chrono::Duration::minutes(i64::from(m))),
                channel: args.channel,
                chat_id: args.chat_id,
                proposed_by: args.by,
                ..ProposeOptions::default()
            };
            options.env.extend(args.env);

            let record = engine.propose(&args.summary, args.commands, options)?;
            println!("{}", format_approval_request(&record, now));
        }
        Commands::List { all, json } => {
            let records = engine.list(all)?;
            if json {
                return print_json(&records);
            }
            if records.is_empty() {
                println!("No {}approvals.", if all { "" } else { "pending " });
            }
            for record in &records {
                println!("{}", format_status_line(record, now));
            }
        }
        Commands::Show { id, json } => {
            let record = engine.load(&id)?;
            if json {
                return print_json(&record);
            }
            if record.status == ApprovalStatus::Pending {
                println!("{}", format_approval_request(&record, now));
            } else {
                println!("{}", format_execution_report(&record));
            }
        }
        Commands::Approve { id, by, run } => {
            if run {
                let record = engine.approve_and_execute(&id, by.as_deref())?;
                println!("{}", format_execution_report(&record));
            } else {
                let record = engine.approve(&id, by.as_deref())?;
                println!("Approved {}: {}", record.id, record.summary);
                println!("Run it with: warden run {}", record.id);
            }
        }
        Commands::Deny { id, by } => {
            let record = engine.deny(&id, by.as_deref())?;
            println!("Denied {}: {}", record.id, record.summary);
        }
        Commands::Run { id } => {
            let record = engine.execute(&id)?;
            println!("{}", format_execution_report(&record));
        }
        Commands::Batch { all, ids, by } => {
            let target = if all {
                BatchTarget::All
            } else {
                BatchTarget::Ids(ids)
            };
            let outcome = engine.batch(target, by.as_deref())?;

            for record in &outcome.approved {
                println!("{}\n", format_execution_report(record));
            }
            for failure in &outcome.errors {
                eprintln!("{}: {}", failure.id, failure.error);
            }
            if outcome.approved.is_empty() && outcome.errors.is_empty() {
                println!("Nothing to approve.");
            }
            if !outcome.errors.is_empty() {
                return Err(anyhow!(
                    "{} of {} approvals could not be processed",
                    outcome.errors.len(),
                    outcome.errors.len() + outcome.approved.len()
                ));
            }
        }
        Commands::Clean { days } => {
            let removed = engine.clean(days)?;
            println!("Removed {removed} approvals.");
        }
        Commands::Stats { json } => {
            let stats = engine.stats()?;
            if json {
                return print_json(&stats);
            }
            println!("Total: {}", stats.total);
            for status in ApprovalStatus::ALL {
                println!("  {:<9}{}", status.as_str(), stats.count(status));
            }
            if !stats.recent.is_empty() {
                println!("\nRecent activity:");
                for entry in &stats.recent {
                    println!(
                        "  {} {:<8} {}",
                        entry.timestamp.format("%Y-%m-%d %H:%M"),
                        entry.event.as_str(),
                        entry.id
                    );
                }
            }
        }
        Commands::Log { limit } => {
            for entry in engine.read_audit_log(limit)? {
                let actor = entry
                    .actor
                    .as_deref()
                    .map(|a| format!(" by {a}"))
                    .unwrap_or_default();
                println!(
                    "{} {:<8} {}{}  {}",
                    entry.timestamp.to_rfc3339(),
                    entry.event.as_str(),
                    entry.id,
                    actor,
                    entry.summary
                );
            }
        }
        Commands::Serve => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            runtime.block_on(serve(engine));
        }
    }

    Ok(())
}

// ============================================================================
// Background cleanup
// ============================================================================

async fn serve(engine: ApprovalEngine) {
    let period = engine.config().clean_interval();
    log::info!(
        "Cleaning {} every {}s (older than {} days)",
        engine.config().data_dir.display(),
        period.as_secs(),
        engine.config().clean_older_than_days
    );

    let mut ticker = tokio::time::interval(period);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // First tick fires immediately, so a clean runs at startup
            _ = ticker.tick() => clean_once(&engine).await,
            _ = &mut shutdown => {
                log::info!("Shutdown signal received");
                break;
            }
        }
    }
}

async fn clean_once(engine: &ApprovalEngine) {
    let engine = engine.clone();
    match tokio::task::spawn_blocking(move || engine.clean(None)).await {
        Ok(Ok(0)) => log::debug!("Nothing to clean"),
        Ok(Ok(removed)) => log::info!("Removed {} old approvals", removed),
        Ok(Err(e)) => log::warn!("Cleanup failed: {}", e),
        Err(e) => log::warn!("Cleanup task panicked: {}", e),
    }
}

// ============================================================================
// TESTS
// ============================================================================
