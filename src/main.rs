use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};

use cadenza::archive::ProjectArchive;
use cadenza::config::EngineConfig;
use cadenza::drift::compute_drift;
use cadenza::error::HistoryError;
use cadenza::history::HistoryService;
use cadenza::model::VariationId;
use cadenza::replay::reconstruct_head;
use cadenza::store::{VariationRepository as _, WorkingStore as _};
use cadenza::{graph, telemetry};

/// Version control for musical note data
///
/// Cadenza tracks a project's note and controller edits as immutable
/// variations in a commit DAG. It reconstructs any historical state,
/// reports drift between the working session and HEAD, and supports
/// checkout (time travel) and three-way merge.
///
/// State lives in a JSON archive file; checkout and merge rewrite it in
/// place on success.
#[derive(Parser)]
#[command(name = "cadenza")]
#[command(version, about)]
#[command(after_help = "See 'cadenza <command> --help' for details on a specific command.")]
struct Cli {
    /// Path to the project archive file.
    #[arg(long, env = "CADENZA_ARCHIVE", default_value = "cadenza.json")]
    archive: PathBuf,

    /// Path to the engine configuration file.
    #[arg(long, env = "CADENZA_CONFIG", default_value = "cadenza.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the commit graph as an ASCII log, newest first
    Log,

    /// Print the commit graph as JSON, topologically ordered
    Graph,

    /// Compare the working session against HEAD and print a drift report
    Drift,

    /// Transform the working session to match a variation and move HEAD
    ///
    /// Blocked while the working session has uncommitted drift; use
    /// --force to discard it.
    Checkout {
        /// The target variation id.
        target: VariationId,
        /// Proceed even when the working session is dirty.
        #[arg(long)]
        force: bool,
    },

    /// Three-way merge two variations and commit the result
    ///
    /// Conflicts block the merge; --force resolves them by keeping the
    /// left side.
    Merge {
        /// First parent ("ours").
        left: VariationId,
        /// Second parent ("theirs").
        right: VariationId,
        /// Resolve conflicts left-wins instead of blocking.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let _guard = telemetry::init();
    let cli = Cli::parse();

    let config = EngineConfig::load(&cli.config)?;
    let archive = ProjectArchive::load(&cli.archive)
        .with_context(|| format!("loading archive {}", cli.archive.display()))?;
    let project = archive.project()?;
    let (mut repo, mut working) = archive.into_stores()?;
    let service = HistoryService::new(config);

    match cli.command {
        Commands::Log => {
            let graph = graph::build(&repo, &project)?;
            print!("{}", graph::render_ascii(&graph));
        }
        Commands::Graph => {
            let graph = graph::build(&repo, &project)?;
            println!("{}", graph::render_json(&graph)?);
        }
        Commands::Drift => {
            let tolerance = service.config().matching.note_tolerance_beats;
            let Some(head) = repo.get_head(&project)? else {
                bail!("project '{project}' has no HEAD yet; nothing to compare");
            };
            let Some(head_snapshot) = reconstruct_head(&repo, &project, tolerance)? else {
                bail!("HEAD {} cannot be reconstructed", head.variation_id);
            };
            let working_snapshot = working.capture_snapshot()?;
            let report = compute_drift(
                &project,
                &head.variation_id,
                &head_snapshot,
                &working_snapshot,
                service.config(),
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Checkout { target, force } => {
            match service.checkout(&mut repo, &mut working, &project, &target, force) {
                Ok(summary) => {
                    ProjectArchive::from_stores(&project, &repo, &working)?.store(&cli.archive)?;
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
                Err(err) => return Err(blocking_error(err)),
            }
        }
        Commands::Merge { left, right, force } => {
            match service.merge(&mut repo, &mut working, &project, &left, &right, force) {
                Ok(summary) => {
                    ProjectArchive::from_stores(&project, &repo, &working)?.store(&cli.archive)?;
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
                Err(err) => return Err(blocking_error(err)),
            }
        }
    }

    Ok(())
}

/// Print the structured payload of a blocking error (when it has one)
/// before surfacing the human-readable message.
fn blocking_error(err: HistoryError) -> anyhow::Error {
    if let Some(payload) = err.to_payload()
        && let Ok(json) = serde_json::to_string_pretty(&payload)
    {
        println!("{json}");
    }
    anyhow::Error::new(err)
}
