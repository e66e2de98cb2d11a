//! GeoCore Harvester - command line entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use geocore_common::logging::{init_logging, LogConfig};
use geocore_harvester::{Harvester, HarvesterConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "geocore-harvester")]
#[command(author, version, about = "Harvest a STAC API into GeoCore records")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store root and collection records and the page list of the collection
    Discover,

    /// Fan out the stored page list as one job per page
    Dispatch,

    /// Process every queued job
    Work,

    /// Apply pending completion signals and report finished batches
    Aggregate,

    /// Run every stage in this process until the batch is drained
    Run,

    /// Show the progress of a batch and its unfinished jobs
    Status {
        /// Batch id printed by `dispatch` or `run`
        #[arg(long)]
        batch_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env().context("Invalid logging configuration")?;
    if cli.verbose {
        log_config.level = tracing::Level::DEBUG;
    }
    let _guard = init_logging(&log_config)?;

    let config = HarvesterConfig::load().context("Failed to load configuration")?;
    info!(
        collection = %config.collection,
        api_root = %config.api_root,
        "Configuration loaded"
    );

    let needs_database = !matches!(cli.command, Command::Discover | Command::Run);
    if needs_database && config.database_url.is_none() {
        anyhow::bail!("DATABASE_URL must be set to run stages in separate processes");
    }

    let harvester = Harvester::connect(&config)
        .await
        .context("Failed to initialize harvester")?;

    match cli.command {
        Command::Discover => {
            let run = harvester.discover().await?;
            info!(
                pages = run.outcome.pages.len(),
                complete = run.outcome.is_complete(),
                "Discovery complete"
            );
        },
        Command::Dispatch => {
            let report = harvester.dispatch().await?;
            info!(
                batch_id = %report.batch_id,
                total = report.total_jobs,
                enqueued = report.enqueued,
                failed = report.failed.len(),
                "Dispatch complete"
            );
        },
        Command::Work => {
            let summary = harvester.work().await?;
            info!(
                acked = summary.acked,
                released = summary.released,
                dead_lettered = summary.dead_lettered,
                "Work complete"
            );
        },
        Command::Aggregate => {
            let finished = harvester.aggregate().await?;
            info!(finished_batches = finished, "Aggregation complete");
        },
        Command::Run => {
            let summary = harvester.run().await?;
            info!(
                batch_id = %summary.dispatch.batch_id,
                pages = summary.pages,
                finished = summary.progress.finished,
                total = summary.progress.total,
                completed = summary.progress.is_complete(),
                "Harvest complete"
            );
            if let Some(e) = summary.discovery_error {
                anyhow::bail!("discovery stopped early: {}", e);
            }
        },
        Command::Status { batch_id } => {
            let progress = harvester.status(&batch_id).await?;
            info!(
                batch_id = %progress.batch_id,
                finished = progress.finished,
                total = progress.total,
                gathered = progress.gathered,
                "Batch status"
            );
            for job in &progress.stuck_jobs {
                info!(job_id = %job, "Job completion not counted");
            }
        },
    }

    Ok(())
}
