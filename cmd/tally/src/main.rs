//! Tally CLI - cohort sampling and job policy inspection.
//!
//! Commands:
//! - `tally sample` - Show a device's period and cohort decision
//! - `tally merge` - Merge a default policy with a server override
//! - `tally apply` - Apply a policy to a job and print the result
//! - `tally plan` - Decide whether a computed job must be rescheduled
//! - `tally explain` - Generate a policy report

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Deterministic cohort sampling and job policy engine")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the cohort decision for a device
    Sample {
        /// Path to the sampling config (yaml or json)
        #[arg(short, long, default_value = "sampling.yaml")]
        config: String,

        /// Device selection id
        #[arg(short, long, allow_negative_numbers = true)]
        selection_id: i64,

        /// Evaluation instant (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<String>,
    },

    /// Merge a default job policy with a server override
    Merge {
        /// Path to the default policy
        #[arg(short, long)]
        default: String,

        /// Path to the server policy
        #[arg(short, long)]
        server: Option<String>,

        /// Output format (yaml or json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Apply a job policy to a fresh job and print the job
    Apply {
        /// Path to the policy
        #[arg(short, long)]
        policy: String,

        /// Job id
        #[arg(short, long)]
        job_id: i32,

        /// Service running the job
        #[arg(short, long, default_value = "job-service")]
        service: String,
    },

    /// Decide whether a computed job must be (re)scheduled
    Plan {
        /// Path to the computed job
        #[arg(short, long)]
        computed: String,

        /// Path to the currently pending job
        #[arg(short, long)]
        existing: Option<String>,

        /// Reschedule even if unchanged
        #[arg(long)]
        force: bool,
    },

    /// Generate a report explaining a policy
    Explain {
        /// Path to the policy
        #[arg(short, long)]
        policy: String,

        /// Output path for the report, stdout if omitted
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Sample {
            config,
            selection_id,
            at,
        } => commands::sample::run(&config, selection_id, at.as_deref()).await,
        Commands::Merge {
            default,
            server,
            format,
        } => commands::merge::run(&default, server.as_deref(), &format),
        Commands::Apply {
            policy,
            job_id,
            service,
        } => commands::apply::run(&policy, job_id, &service),
        Commands::Plan {
            computed,
            existing,
            force,
        } => commands::plan::run(&computed, existing.as_deref(), force),
        Commands::Explain { policy, output } => commands::explain::run(&policy, output.as_deref()),
    }
}
