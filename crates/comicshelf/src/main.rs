//! comicshelf command line: run the job worker or drive it by hand.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use comicshelf::config::{load_config, Config};
use comicshelf::db::library_repo::{self, Library};
use comicshelf::jobs::{JobOrchestrator, JobType, OrchestratorSettings};
use comicshelf::logging::init_logging;
use comicshelf::{Database, DescriptionSeed, MaintenanceSweeper};

/// Comic archive ingestion pipeline.
#[derive(Parser)]
#[command(name = "comicshelf", version, about)]
struct Cli {
    /// Configuration file. Defaults to ~/.comicshelf/config.json when present.
    #[arg(long, short, global = true, env = "COMICSHELF_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register configured libraries and run the job worker until Ctrl-C.
    Serve {
        /// Queue a scan of every configured library on startup.
        #[arg(long)]
        scan_on_start: bool,
    },

    /// Scan a library (by name or path) and run the jobs it chains.
    Scan {
        library: String,

        /// Re-import every archive, changed or not.
        #[arg(long)]
        force: bool,

        /// Only queue the scan; a running `serve` picks it up.
        #[arg(long)]
        queue_only: bool,
    },

    /// Delete unreferenced characters, teams, locations and people, empty
    /// containers, and empty volumes and series.
    Cleanup {
        /// Restrict volume and series pruning to this library.
        #[arg(long)]
        library: Option<String>,
    },

    /// Fill in reading list descriptions from a JSON seed file.
    DescribeLists {
        /// Seed file. Defaults to `reading_list_descriptions` from the config.
        #[arg(long)]
        seed: Option<PathBuf>,
    },

    /// Show one job as JSON.
    Status { job_id: i64 },

    /// List recent jobs, newest first.
    Jobs {
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging("info", cli.json_logs)?;

    let config = resolve_config(cli.config.as_deref())?;
    let (db, libraries) = config.open_catalog().with_context(|| {
        format!(
            "opening catalog at {}",
            config.resolved_database_path().display()
        )
    })?;

    match cli.command {
        Commands::Serve { scan_on_start } => serve(db, &config, &libraries, scan_on_start),
        Commands::Scan {
            library,
            force,
            queue_only,
        } => scan(db, &config, &library, force, queue_only),
        Commands::Cleanup { library } => cleanup(db, &config, library.as_deref()),
        Commands::DescribeLists { seed } => describe_lists(db, &config, seed),
        Commands::Status { job_id } => status(db, &config, job_id),
        Commands::Jobs { limit } => jobs(db, &config, limit),
    }
}

fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return load_config(path).with_context(|| format!("loading {}", path.display()));
    }

    let default = dirs::home_dir().map(|h| h.join(".comicshelf").join("config.json"));
    match default {
        Some(path) if path.is_file() => {
            load_config(&path).with_context(|| format!("loading {}", path.display()))
        }
        _ => {
            info!("No configuration file found, using defaults");
            Ok(Config::default())
        }
    }
}

fn find_library(db: &Database, key: &str) -> Result<Library> {
    match library_repo::find_by_name_or_path(db, key)? {
        Some(library) => Ok(library),
        None => bail!("no library named or located at '{}'", key),
    }
}

fn serve(db: Database, config: &Config, libraries: &[Library], scan_on_start: bool) -> Result<()> {
    let orchestrator = JobOrchestrator::new(db, OrchestratorSettings::from_config(config));
    orchestrator.start()?;

    if scan_on_start {
        for library in libraries {
            orchestrator.enqueue(Some(library.id), JobType::Scan, false)?;
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("installing Ctrl-C handler")?;

    info!("Press Ctrl-C to stop");
    while running.load(Ordering::SeqCst) && orchestrator.is_running() {
        std::thread::sleep(Duration::from_millis(200));
    }
    if running.load(Ordering::SeqCst) {
        warn!("Job worker exited unexpectedly");
    }

    orchestrator.stop();
    orchestrator.join();
    Ok(())
}

fn scan(db: Database, config: &Config, key: &str, force: bool, queue_only: bool) -> Result<()> {
    let library = find_library(&db, key)?;
    let orchestrator = JobOrchestrator::new(db, OrchestratorSettings::from_config(config));

    let outcome = orchestrator.enqueue(Some(library.id), JobType::Scan, force)?;
    if !outcome.was_queued() {
        println!("Scan already queued as job {}", outcome.job_id());
    }
    if queue_only {
        println!("Queued scan job {}", outcome.job_id());
        return Ok(());
    }

    for (job_id, _) in orchestrator.drain()? {
        if let Some(job) = orchestrator.job_status(job_id)? {
            println!("{}", serde_json::to_string(&job)?);
        }
    }
    Ok(())
}

fn cleanup(db: Database, config: &Config, key: Option<&str>) -> Result<()> {
    let library_id = match key {
        Some(key) => Some(find_library(&db, key)?.id),
        None => None,
    };
    let stats = MaintenanceSweeper::new(db).cleanup_orphans(library_id)?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn describe_lists(db: Database, config: &Config, seed: Option<PathBuf>) -> Result<()> {
    let Some(path) = seed.or_else(|| config.reading_list_descriptions.as_ref().map(PathBuf::from))
    else {
        bail!("no seed file given and `reading_list_descriptions` is not configured");
    };
    let seed = DescriptionSeed::load(&path)
        .with_context(|| format!("loading descriptions from {}", path.display()))?;
    let stats = MaintenanceSweeper::new(db).refresh_reading_list_descriptions(&seed)?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn status(db: Database, config: &Config, job_id: i64) -> Result<()> {
    let orchestrator = JobOrchestrator::new(db, OrchestratorSettings::from_config(config));
    match orchestrator.job_status(job_id)? {
        Some(job) => println!("{}", serde_json::to_string_pretty(&job)?),
        None => bail!("job {} not found", job_id),
    }
    Ok(())
}

fn jobs(db: Database, config: &Config, limit: u64) -> Result<()> {
    let orchestrator = JobOrchestrator::new(db, OrchestratorSettings::from_config(config));
    for job in orchestrator.recent_jobs(limit)? {
        println!(
            "{:>6}  {:<9}  {:<9}  {:>7}  {}",
            job.id,
            job.job_type.as_str(),
            job.status.as_str(),
            job.library_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
            job.completed_at.or(job.started_at).unwrap_or(job.created_at),
        );
    }
    Ok(())
}
