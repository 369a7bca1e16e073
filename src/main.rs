use alexandria::config::{self, DumpConfig};
use alexandria::orchestrator::{Importer, RunLock};
use alexandria::store::CatalogStore;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "alexandria")]
#[command(about = "Import Open Library bulk dumps into a multilingual book catalog")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the six dump files and run the import phases
    Import(ImportArgs),
    /// Show the progress of the current or most recent import run
    Status(StatusArgs),
}

#[derive(Args)]
struct ImportArgs {
    /// Path to the catalog SQLite database
    #[arg(short, long, default_value = "catalog.db")]
    database: PathBuf,

    /// Base URL the dump files are fetched from
    #[arg(long, default_value = config::DEFAULT_DUMP_BASE_URL)]
    base_url: String,

    /// Directory for downloaded dumps and the persisted run state
    #[arg(long)]
    tmp_dir: Option<PathBuf>,

    /// Resume a previously interrupted run, skipping completed phases
    #[arg(long)]
    resume: bool,

    /// Skip the Wikidata enrichment phase
    #[arg(long)]
    skip_wikidata: bool,

    /// Skip the edition reconciliation phase
    #[arg(long)]
    skip_editions: bool,

    /// Skip the ratings aggregation phase
    #[arg(long)]
    skip_ratings: bool,

    /// Skip the reading-log aggregation phase
    #[arg(long)]
    skip_reading_log: bool,

    /// Records per decoded batch
    #[arg(long, default_value_t = config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Commit after this many processed records
    #[arg(long, default_value_t = config::DEFAULT_COMMIT_INTERVAL)]
    commit_interval: u64,
}

#[derive(Args)]
struct StatusArgs {
    /// Directory holding the persisted run state
    #[arg(long)]
    tmp_dir: Option<PathBuf>,
}

fn dump_config(base_url: String, tmp_dir: Option<PathBuf>) -> DumpConfig {
    let mut cfg = DumpConfig {
        base_url,
        ..DumpConfig::default()
    };
    if let Some(dir) = tmp_dir {
        cfg.tmp_dir = dir;
    }
    cfg
}

fn run_import(args: ImportArgs) -> Result<()> {
    let mut cfg = dump_config(args.base_url, args.tmp_dir);
    cfg.wikidata_enabled = !args.skip_wikidata;
    cfg.editions_enabled = !args.skip_editions;
    cfg.ratings_enabled = !args.skip_ratings;
    cfg.reading_log_enabled = !args.skip_reading_log;
    cfg.batch_size = args.batch_size;
    cfg.commit_interval = args.commit_interval;

    let mut store = CatalogStore::open(&args.database).with_context(|| {
        format!("failed to open catalog database: {}", args.database.display())
    })?;
    let importer = Importer::new(cfg, RunLock::new());

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .thread_name("alexandria-import-worker")
        .enable_io()
        .enable_time()
        .build()?;

    let start = Instant::now();
    let summary = rt.block_on(importer.run(&mut store, args.resume))?;

    match summary {
        Some(summary) => {
            println!();
            println!("=== Import Summary ===");
            println!("Job:         {}", summary.job_id);
            println!("Total time:  {:.2}s", start.elapsed().as_secs_f64());
            println!("{}", summary.text);
            Ok(())
        }
        None => {
            println!("An import run is already active.");
            Ok(())
        }
    }
}

fn run_status(args: StatusArgs) -> Result<()> {
    let cfg = dump_config(config::DEFAULT_DUMP_BASE_URL.to_string(), args.tmp_dir);
    let importer = Importer::new(cfg, RunLock::new());
    match importer.latest_status()? {
        Some(status) => println!("{status}"),
        None => println!("No recent import run."),
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Import(args) => run_import(args),
        Commands::Status(args) => run_status(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
