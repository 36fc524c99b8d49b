//! CLI entry point for the Transitfeeds.com query tool.
//!
//! Provides subcommands for listing locations and their feeds, and for
//! listing the archived versions of individual feeds, as tab-separated
//! values on stdout.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::io;
use tracing::debug;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use transitfeeds::output::{
    BARE_COLUMNS, DateWindow, Listing, VERSION_COLUMNS, header_row, latest_rows, version_rows,
    write_tsv,
};
use transitfeeds::{FeedVersionsQuery, FeedsQuery, TransitFeeds};

#[derive(Parser)]
#[command(name = "transitfeeds")]
#[command(about = "Query the Transitfeeds.com feed registry", long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch feeds attached to locations on Transitfeeds.com
    Location {
        /// One or more location ids
        #[arg(value_name = "ID", required_unless_present = "list")]
        ids: Vec<String>,

        /// API key; read from TRANSITFEEDS_API_KEY when omitted
        #[arg(long)]
        key: Option<String>,

        /// Add a header row to the output
        #[arg(short = 'H', long)]
        header: bool,

        /// List all locations instead of the feeds of particular ones
        #[arg(long)]
        list: bool,
    },
    /// Fetch the versions of a feed on Transitfeeds.com
    #[command(after_help = "By default the following columns are included: \
        feed-id-version, date published, feed start date, feed end date, feed URL")]
    Feed {
        /// One or more feed ids
        #[arg(value_name = "ID", required = true)]
        ids: Vec<String>,

        /// API key; read from TRANSITFEEDS_API_KEY when omitted
        #[arg(long)]
        key: Option<String>,

        /// Add a header row to the output
        #[arg(short = 'H', long)]
        header: bool,

        /// Return only the feed url, omitting feed metadata
        #[arg(long)]
        bare: bool,

        /// Drop versions whose service ends before this date (yyyy-mm-dd)
        #[arg(long, value_name = "DATE")]
        start: Option<NaiveDate>,

        /// Drop versions whose service starts after this date (yyyy-mm-dd)
        #[arg(long, value_name = "DATE")]
        finish: Option<NaiveDate>,

        /// Return only the URL of the newest version of each feed
        #[arg(long)]
        latest: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("warn".parse().unwrap()));

    tracing_subscriber::registry().with(stderr_layer).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Location {
            ids,
            key,
            header,
            list,
        } => {
            let mut api = TransitFeeds::new(resolve_key(key)?)?;
            let rows = location_listing(&mut api, &ids, header, list).await?;
            write_tsv(io::stdout(), &rows)?;
        }
        Commands::Feed {
            ids,
            key,
            header,
            bare,
            start,
            finish,
            latest,
        } => {
            let mut api = TransitFeeds::new(resolve_key(key)?)?;
            let window = DateWindow { start, finish };
            let rows = feed_listing(&mut api, &ids, header, bare, latest, window).await?;
            write_tsv(io::stdout(), &rows)?;
        }
    }

    Ok(())
}

/// API key from the flag, or from the environment when the flag is absent.
fn resolve_key(flag: Option<String>) -> Result<String> {
    match flag {
        Some(key) => Ok(key),
        None => std::env::var("TRANSITFEEDS_API_KEY")
            .context("no API key: pass --key or set TRANSITFEEDS_API_KEY"),
    }
}

/// Rows for the `location` subcommand: either every location the service
/// knows, or the feeds attached to the requested location ids.
async fn location_listing(
    api: &mut TransitFeeds,
    ids: &[String],
    header: bool,
    list: bool,
) -> Result<Vec<Vec<String>>> {
    let listing = if list {
        let locations = api.locations().await?;
        debug!(total = locations.len(), "Locations fetched");
        Listing::Locations(locations)
    } else {
        let mut feeds = Vec::new();
        for id in ids {
            let batch = api
                .feeds(&FeedsQuery {
                    location: Some(id.clone()),
                    ..FeedsQuery::default()
                })
                .await?;
            debug!(location = %id, total = batch.len(), "Feeds fetched");
            feeds.extend(batch);
        }
        Listing::Feeds(feeds)
    };

    let mut rows = Vec::new();
    if header {
        rows.push(header_row(listing.columns()));
    }
    rows.extend(listing.rows());
    Ok(rows)
}

/// Rows for the `feed` subcommand: latest-version URLs, or the archived
/// versions of each feed filtered to the service-period window.
async fn feed_listing(
    api: &mut TransitFeeds,
    ids: &[String],
    header: bool,
    bare: bool,
    latest: bool,
    window: DateWindow,
) -> Result<Vec<Vec<String>>> {
    if latest {
        let mut urls = Vec::new();
        for id in ids {
            urls.push(api.latest(id).await?);
        }
        return Ok(latest_rows(&urls));
    }

    let mut rows = Vec::new();
    if header {
        let columns: &[&str] = if bare { &BARE_COLUMNS } else { &VERSION_COLUMNS };
        rows.push(header_row(columns));
    }
    for id in ids {
        let versions = api.feed_versions(id, &FeedVersionsQuery::default()).await?;
        debug!(feed = %id, total = versions.len(), "Feed versions fetched");
        rows.extend(version_rows(&versions, &window, bare)?);
    }
    Ok(rows)
}
