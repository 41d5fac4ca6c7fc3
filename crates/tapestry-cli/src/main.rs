mod app;
mod server;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use rmcp::{ServiceExt, transport::stdio};

use tapestry_core::{
    ActionKind, EngineStatus, Intention, ManualCommand, Region, ThreadDraft, TimeOfDay,
    millis_to_iso8601,
};
use tapestry_store::DataDir;

use crate::app::Tapestry;

#[derive(Parser)]
#[command(name = "tap", about = "Tapestry ledger analytics CLI and MCP server")]
struct Cli {
    /// Data directory (default: $TAPESTRY_DATA_DIR or ~/.tapestry)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server on stdio transport
    Serve,

    /// Append a thread to the ledger
    Weave {
        #[arg(long, value_parser = parse_intention)]
        intention: Intention,
        #[arg(long, value_parser = parse_time)]
        time: TimeOfDay,
        #[arg(long, value_parser = parse_region)]
        region: Region,
        #[arg(long)]
        title: Option<String>,
        /// Unix milliseconds (default: now)
        #[arg(long)]
        timestamp: Option<u64>,
        #[arg(long)]
        id: Option<String>,
    },

    /// List threads in ledger order
    List,

    /// Run the anomaly detector and print its report as JSON
    Assess {
        /// Replay: assess only the first N threads
        #[arg(long)]
        at: Option<usize>,
    },

    /// Rank threads by similarity to a stored thread
    Query {
        id: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Assess the ledger and let Valkyrie respond
    Evaluate,

    /// Log a manual action, bypassing policy
    Override {
        #[arg(value_parser = parse_action)]
        action: ActionKind,
        #[arg(long, value_parser = parse_region)]
        target: Option<Region>,
    },

    /// Show the Valkyrie execution log
    Log {
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show or set the Valkyrie engine status
    Status { set: Option<StatusArg> },

    /// Verify the ledger hash chain
    Verify,

    /// Write the ledger to a scroll file
    Export { path: PathBuf },

    /// Replace the ledger with a scroll file
    Import { path: PathBuf },

    /// Delete every thread and the execution log
    Clear {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Active,
    Inactive,
}

impl From<StatusArg> for EngineStatus {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Active => EngineStatus::Active,
            StatusArg::Inactive => EngineStatus::Inactive,
        }
    }
}

fn parse_intention(s: &str) -> std::result::Result<Intention, String> {
    Intention::parse_strict(s)
        .filter(|v| v.is_known())
        .ok_or_else(|| format!("expected one of: {}", names(Intention::KNOWN)))
}

fn parse_time(s: &str) -> std::result::Result<TimeOfDay, String> {
    TimeOfDay::parse_strict(s)
        .filter(|v| v.is_known())
        .ok_or_else(|| format!("expected one of: {}", names(TimeOfDay::KNOWN)))
}

fn parse_region(s: &str) -> std::result::Result<Region, String> {
    Region::parse_strict(s)
        .filter(|v| v.is_known())
        .ok_or_else(|| format!("expected one of: {}", names(Region::KNOWN)))
}

fn parse_action(s: &str) -> std::result::Result<ActionKind, String> {
    ActionKind::parse(s).ok_or_else(|| format!("unknown action: {s}"))
}

fn names<T: std::fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn open_app(cli: &Cli) -> Result<Tapestry> {
    let data = DataDir::resolve(cli.data_dir.as_deref());
    Tapestry::open(&data).context("failed to open tapestry")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Serve = cli.command {
        return cmd_serve(&cli).await;
    }

    let mut app = open_app(&cli)?;
    let result = run(&cli.command, &mut app);

    for failure in app.flush().await {
        eprintln!("warning: ledger not persisted: {failure}");
    }
    result
}

fn run(command: &Commands, app: &mut Tapestry) -> Result<()> {
    match command {
        Commands::Serve => bail!("serve runs its own event loop"),
        Commands::Weave {
            intention,
            time,
            region,
            title,
            timestamp,
            id,
        } => {
            let draft = ThreadDraft {
                intention: *intention,
                time_of_day: *time,
                region: *region,
                title: title.clone(),
                id: id.clone(),
                timestamp: *timestamp,
            };
            cmd_weave(app, draft)
        }
        Commands::List => cmd_list(app),
        Commands::Assess { at } => cmd_assess(app, *at),
        Commands::Query { id, limit } => cmd_query(app, id, *limit),
        Commands::Evaluate => cmd_evaluate(app),
        Commands::Override { action, target } => cmd_override(
            app,
            ManualCommand {
                action: *action,
                target: *target,
            },
        ),
        Commands::Log { limit } => cmd_log(app, *limit),
        Commands::Status { set } => cmd_status(app, set.map(EngineStatus::from)),
        Commands::Verify => cmd_verify(app),
        Commands::Export { path } => cmd_export(app, path),
        Commands::Import { path } => cmd_import(app, path),
        Commands::Clear { yes } => cmd_clear(app, *yes),
    }
}

async fn cmd_serve(cli: &Cli) -> Result<()> {
    let app = open_app(cli)?;
    tracing::info!(threads = app.snapshot().len(), "starting MCP server");

    let server = server::TapServer::new(app);
    let service = match server.clone().serve(stdio()).await {
        Ok(service) => service,
        Err(e) => {
            // Client went away before the handshake finished.
            tracing::warn!("MCP session not started: {e}");
            server.flush().await;
            return Ok(());
        }
    };

    tokio::select! {
        res = service.waiting() => {
            res.context("MCP server stopped with an error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted; shutting down");
        }
    }

    server.flush().await;
    Ok(())
}

fn cmd_weave(app: &mut Tapestry, draft: ThreadDraft) -> Result<()> {
    let thread = app.weave(draft).context("failed to weave thread")?;
    println!(
        "woven {} ({}/{}/{}) at {}",
        thread.id,
        thread.intention,
        thread.time_of_day,
        thread.region,
        millis_to_iso8601(thread.timestamp)
    );
    Ok(())
}

fn cmd_list(app: &Tapestry) -> Result<()> {
    let snapshot = app.snapshot();
    if snapshot.is_empty() {
        println!("(ledger is empty)");
        return Ok(());
    }
    for thread in snapshot.iter() {
        println!(
            "{}  {}  {:<8} {:<6} {:<6} {}",
            thread.id,
            millis_to_iso8601(thread.timestamp),
            thread.intention,
            thread.time_of_day,
            thread.region,
            thread.title_str()
        );
    }
    println!("threads: {}", snapshot.len());
    Ok(())
}

fn cmd_assess(app: &Tapestry, at: Option<usize>) -> Result<()> {
    let report = match at {
        Some(count) => app.assess_at(count)?,
        None => app.assess(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_query(app: &Tapestry, id: &str, limit: usize) -> Result<()> {
    let Some(matches) = app.query(id, limit) else {
        bail!("no thread with id {id}");
    };
    if matches.is_empty() {
        println!("(no other threads)");
    }
    for m in &matches {
        println!(
            "{:>3}  {}  {}/{}/{}  {}  [{}]",
            m.score,
            m.thread.id,
            m.thread.intention,
            m.thread.time_of_day,
            m.thread.region,
            m.thread.title_str(),
            m.common_terms.join(", ")
        );
    }
    Ok(())
}

fn cmd_evaluate(app: &mut Tapestry) -> Result<()> {
    let entry = app.evaluate()?;
    println!("{}", serde_json::to_string_pretty(&entry)?);
    Ok(())
}

fn cmd_override(app: &mut Tapestry, command: ManualCommand) -> Result<()> {
    let entry = app.manual_override(command)?;
    println!("{}", serde_json::to_string_pretty(&entry)?);
    Ok(())
}

fn cmd_log(app: &Tapestry, limit: Option<usize>) -> Result<()> {
    let log = app.execution_log();
    let start = limit.map_or(0, |n| log.len().saturating_sub(n));
    if log.is_empty() {
        println!("(no entries)");
    }
    for entry in &log[start..] {
        println!(
            "#{:<4} {}  {:<20} {:<18} {:<10} {}",
            entry.seq,
            millis_to_iso8601(entry.timestamp),
            entry.trigger.as_label(),
            entry.action.as_str(),
            entry.outcome.as_str(),
            entry.target.map(|r| r.as_str()).unwrap_or("-")
        );
    }
    Ok(())
}

fn cmd_status(app: &mut Tapestry, set: Option<EngineStatus>) -> Result<()> {
    if let Some(status) = set {
        app.set_status(status)?;
    }
    println!("valkyrie: {}", app.status().as_str());
    Ok(())
}

fn cmd_verify(app: &Tapestry) -> Result<()> {
    let report = app.verify();
    match report.first_corrupted {
        None => {
            println!("verified {} threads", report.checked);
            Ok(())
        }
        Some(index) => bail!("hash chain broken at index {index}"),
    }
}

fn cmd_export(app: &Tapestry, path: &Path) -> Result<()> {
    let json = app.export().context("failed to serialize ledger")?;
    std::fs::write(path, &json).with_context(|| format!("failed to write {}", path.display()))?;
    println!("exported {} threads to {}", app.snapshot().len(), path.display());
    Ok(())
}

fn cmd_import(app: &mut Tapestry, path: &Path) -> Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let count = app.import(&json)?;
    println!("imported {count} threads from {}", path.display());
    Ok(())
}

fn cmd_clear(app: &mut Tapestry, yes: bool) -> Result<()> {
    if !yes {
        bail!("refusing to clear without --yes");
    }
    let removed = app.snapshot().len();
    app.clear()?;
    println!("cleared {removed} threads");
    Ok(())
}
