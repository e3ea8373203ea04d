use std::path::PathBuf;

use bazaar_core::models::{ListingSort, ListingStatus};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "bazaar")]
#[command(about = "Inspect and drive the Bazaar offline sync core")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the sync config JSON file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show sync metadata and outbox counts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pull the remote listing snapshot into the local cache
    Reconcile {
        /// Ignore the throttle window
        #[arg(long)]
        force: bool,
    },
    /// Dispatch due outbox items
    Flush {
        /// Maximum items to dispatch (defaults to config)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Inspect or intervene in the mutation outbox
    Outbox {
        #[command(subcommand)]
        command: OutboxCommands,
    },
    /// Query cached listings
    Listings {
        #[command(subcommand)]
        command: ListingsCommands,
    },
    /// Maintain the TTL cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
pub enum OutboxCommands {
    /// List queued mutations, oldest first
    List {
        /// Number of items to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Make an item eligible for the next flush
    Retry {
        /// Outbox item ID
        id: String,
    },
    /// Discard an item permanently
    Drop {
        /// Outbox item ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ListingsCommands {
    /// List cached listings
    List {
        /// Only listings with this status
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        /// Only listings whose ID starts with this prefix
        #[arg(long)]
        prefix: Option<String>,
        /// Case-insensitive title search
        #[arg(long)]
        search: Option<String>,
        /// Sort order
        #[arg(long, value_enum, default_value_t = SortArg::Updated)]
        sort: SortArg,
        /// Number of listings to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one listing as JSON
    Show {
        /// Listing ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Delete cache entries older than the given age
    Purge {
        /// Maximum entry age in seconds
        #[arg(long, default_value = "86400")]
        max_age_secs: u64,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatusArg {
    Active,
    Archived,
}

impl From<StatusArg> for ListingStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Active => Self::Active,
            StatusArg::Archived => Self::Archived,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SortArg {
    Updated,
    Created,
    Price,
    Title,
}

impl From<SortArg> for ListingSort {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Updated => Self::UpdatedDesc,
            SortArg::Created => Self::CreatedDesc,
            SortArg::Price => Self::PriceAsc,
            SortArg::Title => Self::TitleAsc,
        }
    }
}
