use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use catalog::Catalog;
use clap::{Parser, Subcommand};
use common::Config;
use maintenance::{compact_all, compact_volume, JobRegistry};
use storage::VolumeStore;
use tracing_subscriber::EnvFilter;

fn init_tracing(cfg: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.log_level.clone()));
    match cfg.log_format {
        common::config::LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .json()
                .flatten_event(true)
                .init();
        }
        common::config::LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .compact()
                .init();
        }
    }
}

#[derive(Parser)]
#[command(name = "objectstore-ctl")]
#[command(about = "Object storage engine maintenance utility", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or compact volumes
    Volumes {
        #[command(subcommand)]
        command: VolumesCommands,
    },
    /// Catalog database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Subcommand)]
enum VolumesCommands {
    /// List every volume with its size and fragmentation ratio
    List,
    /// Compact a single volume
    Compact {
        /// Volume id to compact
        id: u32,
    },
    /// Compact every volume whose fragmentation ratio exceeds a threshold
    CompactAll {
        /// Fragmentation percentage threshold (size_deleted / size_total * 100)
        #[arg(long, default_value_t = 0.0)]
        threshold: f64,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Reclaim catalog database space with SQLite VACUUM
    Vacuum,
}

fn open_stores(cfg: &Config) -> Result<(VolumeStore, Catalog)> {
    let volumes = VolumeStore::open(&cfg.data_dir, cfg.data_file_size)
        .with_context(|| format!("opening volume store at {}", cfg.data_dir.display()))?;
    let catalog = Catalog::open(&cfg.db_path)
        .with_context(|| format!("opening catalog at {}", cfg.db_path.display()))?;
    Ok((volumes, catalog))
}

fn run_volumes_command(cfg: &Config, command: VolumesCommands) -> Result<()> {
    let (volumes, catalog) = open_stores(cfg)?;

    match command {
        VolumesCommands::List => {
            let stats = catalog.list_volume_stats()?;
            if stats.is_empty() {
                println!("(no volumes)");
            } else {
                println!("Volume\tSize Total\tSize Deleted\tFragmentation %");
                for v in stats {
                    println!(
                        "{:>6}\t{:>10}\t{:>12}\t{:>15.1}",
                        v.id,
                        v.size_total,
                        v.size_deleted,
                        v.fragmentation_pct()
                    );
                }
            }
        }
        VolumesCommands::Compact { id } => {
            let summary = compact_volume(&volumes, &catalog, id)?;
            println!(
                "Compacted volume {}: kept {} frames, new size {} bytes",
                summary.volume_id, summary.frames_kept, summary.new_size_total
            );
        }
        VolumesCommands::CompactAll { threshold } => {
            let registry = Arc::new(JobRegistry::new());
            let cancel = AtomicBool::new(false);
            let summaries = compact_all(&volumes, &catalog, &registry, threshold, &cancel)?;
            if summaries.is_empty() {
                println!("(no volumes over {threshold}% fragmentation)");
            } else {
                for summary in &summaries {
                    println!(
                        "Compacted volume {}: kept {} frames, new size {} bytes",
                        summary.volume_id, summary.frames_kept, summary.new_size_total
                    );
                }
                println!("{} volume(s) compacted", summaries.len());
            }
        }
    }

    Ok(())
}

fn run_db_command(cfg: &Config, command: DbCommands) -> Result<()> {
    match command {
        DbCommands::Vacuum => {
            let catalog = Catalog::open(&cfg.db_path)
                .with_context(|| format!("opening catalog at {}", cfg.db_path.display()))?;
            catalog.vacuum()?;
            println!("Vacuumed {}", cfg.db_path.display());
        }
    }
    Ok(())
}

fn try_main() -> Result<()> {
    let cfg = Config::from_env();
    init_tracing(&cfg);
    let cli = Cli::parse();

    match cli.command {
        Commands::Volumes { command } => run_volumes_command(&cfg, command),
        Commands::Db { command } => run_db_command(&cfg, command),
    }
}

fn main() -> ExitCode {
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
