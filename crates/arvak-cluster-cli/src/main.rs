//! Arvak Cluster Command-Line Interface
//!
//! Lists configured HPC clusters and drives their batch schedulers.
//!
//! ```text
//! arvak-cluster clusters
//! arvak-cluster submit owens job.sh --queue batch --name hello
//! arvak-cluster info owens 1234.owens-batch
//! arvak-cluster delete owens 1234.owens-batch
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{adapters, clusters, control, info, submit};

/// Arvak Cluster - uniform access to HPC batch schedulers
#[derive(Parser)]
#[command(name = "arvak-cluster")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Cluster configuration directory or file
    #[arg(short, long, global = true, env = "ARVAK_CLUSTERS")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured clusters and what the current user may access
    Clusters,

    /// List the ACL and job adapters built into this binary
    Adapters,

    /// Show jobs on a cluster
    Info {
        /// Cluster id
        cluster: String,

        /// Job id (all jobs if omitted)
        job_id: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Submit a batch script
    Submit {
        /// Cluster id
        cluster: String,

        /// Path to the job script
        script: PathBuf,

        /// Queue to submit to
        #[arg(short, long)]
        queue: Option<String>,

        /// Job name
        #[arg(short, long)]
        name: Option<String>,

        /// Accounting id / project
        #[arg(short, long)]
        account: Option<String>,

        /// Wall time limit (HH:MM:SS)
        #[arg(short, long)]
        time: Option<String>,
    },

    /// Hold a queued job
    Hold {
        /// Cluster id
        cluster: String,

        /// Job id
        job_id: String,
    },

    /// Release a held job
    Release {
        /// Cluster id
        cluster: String,

        /// Job id
        job_id: String,
    },

    /// Delete a job
    Delete {
        /// Cluster id
        cluster: String,

        /// Job id
        job_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Clusters => clusters::execute(config),

        Commands::Adapters => {
            adapters::execute();
            Ok(())
        }

        Commands::Info {
            cluster,
            job_id,
            json,
        } => info::execute(config, &cluster, job_id.as_deref(), json).await,

        Commands::Submit {
            cluster,
            script,
            queue,
            name,
            account,
            time,
        } => {
            submit::execute(
                config,
                &cluster,
                &script,
                queue.as_deref(),
                name.as_deref(),
                account.as_deref(),
                time.as_deref(),
            )
            .await
        }

        Commands::Hold { cluster, job_id } => {
            control::execute(config, &cluster, &job_id, control::Action::Hold).await
        }
        Commands::Release { cluster, job_id } => {
            control::execute(config, &cluster, &job_id, control::Action::Release).await
        }
        Commands::Delete { cluster, job_id } => {
            control::execute(config, &cluster, &job_id, control::Action::Delete).await
        }
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
