//! zip-jobs - run the document packaging jobs from the command line
//!
//! Prints the job report as JSON on stdout. Logging follows `LOG_*`.

use clap::{Parser, Subcommand};
use mcr_common::logging::{init_logging, LogConfig, LogLevel};
use mcr_server::config::Config;
use mcr_server::jobs::{self, JobContext, MigrateQuery, RegenerateEvent};
use std::process;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "zip-jobs")]
#[command(author, version, about = "Run MC-Review document zip jobs", long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Backfill zip packages for submitted revisions
    Migrate {
        /// Report what would be packaged without downloading or writing
        #[arg(long)]
        dry_run: bool,

        /// Revisions per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Only revisions for this state
        #[arg(long)]
        state_code: Option<String>,

        /// Stop after this many milliseconds
        #[arg(long)]
        max_runtime_ms: Option<u64>,
    },

    /// Regenerate missing zip packages
    Regenerate {
        #[arg(long)]
        contract_revision_id: Option<String>,

        #[arg(long)]
        rate_revision_id: Option<String>,

        /// Maximum revisions per kind when scanning
        #[arg(long)]
        limit: Option<u32>,

        #[arg(long)]
        dry_run: bool,
    },

    /// Store bucket and key for records that only have a URL
    LegacyKeys {
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(level)
        .log_file_prefix("zip-jobs")
        .filter_directives("sqlx=warn,aws_smithy_runtime=warn")
        .build();
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        },
    };

    match run(cli.command).await {
        Ok(report) => println!("{}", report),
        Err(e) => {
            error!(error = %e, "Job failed");
            eprintln!("Error: {:#}", e);
            process::exit(1);
        },
    }
}

async fn run(command: Command) -> anyhow::Result<String> {
    let config = Config::load()?;
    let (ctx, _pool) = JobContext::connect(&config).await?;

    let report = match command {
        Command::Migrate {
            dry_run,
            batch_size,
            state_code,
            max_runtime_ms,
        } => {
            let query = MigrateQuery {
                dry_run: Some(dry_run),
                batch_size,
                state_code,
                max_runtime_ms,
            };
            serde_json::to_string_pretty(&jobs::migrate_document_zips(&ctx, query).await?)?
        },
        Command::Regenerate {
            contract_revision_id,
            rate_revision_id,
            limit,
            dry_run,
        } => {
            let event = RegenerateEvent {
                contract_revision_id,
                rate_revision_id,
                limit,
                dry_run: Some(dry_run),
            };
            let result = jobs::regenerate_zips(&ctx, event).await?;
            let rendered = serde_json::to_string_pretty(&result)?;
            if !result.success {
                anyhow::bail!("regeneration finished with failures:\n{}", rendered);
            }
            rendered
        },
        Command::LegacyKeys { dry_run } => serde_json::to_string_pretty(
            &jobs::migrate_legacy_keys(ctx.repository.as_ref(), dry_run).await?,
        )?,
    };

    Ok(report)
}
