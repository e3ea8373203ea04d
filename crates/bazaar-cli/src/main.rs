//! Bazaar CLI - operator tooling for the offline sync core
//!
//! Inspects sync state, drives one-off reconcile and flush passes, and lets an
//! operator retry or drop stuck outbox items.

mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli::{CacheCommands, Cli, Commands, ListingsCommands, OutboxCommands};
use crate::commands::cache::run_cache_purge;
use crate::commands::common::{load_context, open_service, resolve_config_path, resolve_db_path};
use crate::commands::flush::run_flush;
use crate::commands::listings::{run_listings_list, run_listings_show, ListingQuery};
use crate::commands::outbox::{run_outbox_drop, run_outbox_list, run_outbox_retry};
use crate::commands::reconcile::run_reconcile;
use crate::commands::status::run_status;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy()
                .add_directive(
                    "bazaar=info"
                        .parse()
                        .unwrap_or_else(|_| LevelFilter::INFO.into()),
                ),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;
    let config_path = resolve_config_path(cli.config);
    let context = load_context(config_path.as_deref())?;
    let service = open_service(&db_path, &context)?;

    match cli.command {
        Commands::Status { json } => run_status(&service, json).await?,
        Commands::Reconcile { force } => run_reconcile(&service, force).await?,
        Commands::Flush { limit } => {
            run_flush(&service, limit, context.config().flush_batch_limit).await?;
        }
        Commands::Outbox { command } => match command {
            OutboxCommands::List { limit, json } => run_outbox_list(&service, limit, json).await?,
            OutboxCommands::Retry { id } => run_outbox_retry(&service, &id).await?,
            OutboxCommands::Drop { id } => run_outbox_drop(&service, &id).await?,
        },
        Commands::Listings { command } => match command {
            ListingsCommands::List {
                status,
                prefix,
                search,
                sort,
                limit,
                json,
            } => {
                let query = ListingQuery {
                    status,
                    prefix,
                    search,
                    sort,
                    limit,
                };
                run_listings_list(&service, query, json).await?;
            }
            ListingsCommands::Show { id } => run_listings_show(&service, &id).await?,
        },
        Commands::Cache { command } => match command {
            CacheCommands::Purge { max_age_secs } => {
                run_cache_purge(&service, max_age_secs).await?;
            }
        },
    }

    Ok(())
}
