//! RexOS games indexer
//!
//! Crawls the configured games folders and rebuilds the search index used by
//! the launcher. Optionally writes plain-text gamelists and runs a quick
//! search against the fresh index.
//!
//! Exits non-zero if the rebuild could not start or every system failed.

use anyhow::{Context, Result, bail};
use clap::Parser;
use rexos_catalog::{IndexEngine, IndexStatus, Indexer, write_gamelists};
use rexos_config::{CatalogConfig, SystemRegistry};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "rexos-indexer")]
#[command(about = "Rebuild the RexOS games index", long_about = None)]
#[command(version)]
struct Cli {
    /// Systems to index (ids or aliases); all systems when omitted
    systems: Vec<String>,

    /// Catalog configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also write per-system gamelists
    #[arg(long)]
    gamelists: bool,

    /// Search the rebuilt index for games containing these words
    #[arg(long)]
    search: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();
    let started = Instant::now();

    let config = match &cli.config {
        Some(path) => CatalogConfig::load(path),
        None => CatalogConfig::load_default(),
    }
    .context("Failed to load catalog configuration")?;

    let indexer = Indexer::from_config(&config);
    let systems = indexer.select_systems(&cli.systems)?;

    let registry = indexer.registry();
    let mut summary = indexer
        .rebuild(&systems, |status| {
            info!(
                "[{}/{}] {}",
                status.current_step,
                status.total_steps,
                describe(status, registry)
            );
        })
        .await
        .context("Index rebuild failed")?;

    for failure in &summary.failures {
        error!("{}: {}", failure.system_id, failure.error);
    }
    if summary.all_failed() {
        bail!("Every system failed to index");
    }

    info!(
        "Indexed {} games in {:?}",
        summary.files_indexed,
        started.elapsed()
    );

    if cli.gamelists {
        let entries = std::mem::take(&mut summary.entries);
        let output_dir = config.gamelists.output_dir.clone();
        let dedupe = config.gamelists.dedupe;

        let written = tokio::task::spawn_blocking(move || {
            write_gamelists(&output_dir, &entries, dedupe)
        })
        .await??;
        info!("Wrote {} gamelist entries", written);
    }

    if let Some(query) = &cli.search {
        let engine = indexer.open()?;
        let mut results = engine.search_words(None, query)?;
        results.sort();

        for result in &results {
            println!("{}\t{}\t{}", result.system_id, result.name, result.path);
        }
        info!("{} results for {:?}", results.len(), query);
    }

    Ok(())
}

fn setup_logging() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_ansi(false))
        .init();
}

/// Progress line for a status update
fn describe(status: &IndexStatus, registry: &SystemRegistry) -> String {
    if status.current_step == 1 {
        "Finding games folders...".to_string()
    } else if status.is_writing() {
        format!("Writing database ({} games)", status.files_indexed)
    } else {
        let name = registry
            .lookup(&status.system_id)
            .map(|system| system.name.as_str())
            .unwrap_or(status.system_id.as_str());
        format!("Indexing {}...", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(current_step: usize, system_id: &str, files_indexed: usize) -> IndexStatus {
        IndexStatus {
            total_steps: 4,
            current_step,
            system_id: system_id.to_string(),
            files_indexed,
        }
    }

    #[test]
    fn test_describe_steps() {
        let registry = SystemRegistry::builtin();

        assert_eq!(describe(&status(1, "", 0), &registry), "Finding games folders...");
        assert_eq!(
            describe(&status(2, "GBA", 0), &registry),
            "Indexing Gameboy Advance..."
        );
        assert_eq!(describe(&status(3, "Custom", 0), &registry), "Indexing Custom...");
        assert_eq!(
            describe(&status(4, "", 42), &registry),
            "Writing database (42 games)"
        );
    }

    #[test]
    fn test_cli_positional_systems() {
        let cli = Cli::parse_from(["rexos-indexer", "--gamelists", "NES", "snes"]);
        assert_eq!(cli.systems, vec!["NES", "snes"]);
        assert!(cli.gamelists);
        assert!(cli.config.is_none());
    }
}
