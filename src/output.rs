//! Row projections and TSV rendering for the command line listings.

use anyhow::Result;
use chrono::NaiveDate;
use csv::WriterBuilder;
use std::collections::HashMap;
use std::io::{self, Write};
use tracing::debug;

use crate::models::{Feed, FeedVersion, Location};

pub const LOCATION_COLUMNS: [&str; 5] = ["location-id", "title", "name", "longitude", "latitude"];
pub const FEED_COLUMNS: [&str; 2] = ["feed-id", "title"];
pub const VERSION_COLUMNS: [&str; 5] = ["feed-id", "published", "start-date", "end-date", "url"];
pub const BARE_COLUMNS: [&str; 1] = ["url"];

/// Service-period bounds parsed from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub finish: Option<NaiveDate>,
}

impl DateWindow {
    fn is_bounded(&self) -> bool {
        self.start.is_some() || self.finish.is_some()
    }

    /// Whether a service period falls inside the window. A version missing
    /// the date a bound would compare against is kept.
    fn admits(&self, dates: &HashMap<String, NaiveDate>) -> bool {
        if let (Some(finish), Some(started)) = (self.finish, dates.get("start")) {
            if *started > finish {
                return false;
            }
        }
        if let (Some(start), Some(finished)) = (self.start, dates.get("finish")) {
            if *finished < start {
                return false;
            }
        }
        true
    }
}

pub fn header_row(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|column| column.to_string()).collect()
}

/// What a place-oriented listing resolved to: the locations themselves, or
/// the feeds attached to the requested locations.
pub enum Listing {
    Locations(Vec<Location>),
    Feeds(Vec<Feed>),
}

impl Listing {
    /// Column names for the header row of this listing.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Listing::Locations(_) => &LOCATION_COLUMNS,
            Listing::Feeds(_) => &FEED_COLUMNS,
        }
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        match self {
            Listing::Locations(locations) => location_rows(locations),
            Listing::Feeds(feeds) => feed_rows(feeds),
        }
    }
}

/// One row per location: id, title, name, longitude, latitude.
fn location_rows(locations: &[Location]) -> Vec<Vec<String>> {
    locations
        .iter()
        .map(|location| {
            let (lng, lat) = location.coords();
            vec![
                location.id().unwrap_or_default(),
                location.title().unwrap_or_default().to_string(),
                location.name().unwrap_or_default().to_string(),
                number_str(lng),
                number_str(lat),
            ]
        })
        .collect()
}

/// One row per feed: id and title.
fn feed_rows(feeds: &[Feed]) -> Vec<Vec<String>> {
    feeds
        .iter()
        .map(|feed| {
            vec![
                feed.id().unwrap_or_default(),
                feed.title().unwrap_or_default().to_string(),
            ]
        })
        .collect()
}

/// One row per version inside the window. Bare rows carry only the
/// download URL; full rows add id, publication date and service period.
pub fn version_rows(
    versions: &[FeedVersion],
    window: &DateWindow,
    bare: bool,
) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    for version in versions {
        if window.is_bounded() && !window.admits(version.dates()?) {
            continue;
        }

        let row = if bare {
            vec![version.url().unwrap_or_default().to_string()]
        } else {
            let dates = version.dates()?;
            vec![
                version.id().unwrap_or_default(),
                version
                    .timestamp()
                    .map(|ts| ts.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                dates.get("start").map(date_str).unwrap_or_default(),
                dates.get("finish").map(date_str).unwrap_or_default(),
                version.url().unwrap_or_default().to_string(),
            ]
        };
        rows.push(row);
    }
    Ok(rows)
}

/// One-column rows for resolved latest-version URLs. Feeds that resolved
/// to nothing are dropped.
pub fn latest_rows(urls: &[Option<String>]) -> Vec<Vec<String>> {
    urls.iter()
        .flatten()
        .filter(|url| !url.is_empty())
        .map(|url| vec![url.clone()])
        .collect()
}

/// Writes rows as tab-separated values. A downstream pipe closing early
/// ends the listing quietly.
pub fn write_tsv<W: Write>(out: W, rows: &[Vec<String>]) -> Result<()> {
    debug!(rows = rows.len(), "Writing TSV");
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_writer(out);

    for row in rows {
        if let Err(err) = writer.write_record(row) {
            if is_broken_pipe(&err) {
                return Ok(());
            }
            return Err(err.into());
        }
    }

    if let Err(err) = writer.flush() {
        if err.kind() != io::ErrorKind::BrokenPipe {
            return Err(err.into());
        }
    }
    Ok(())
}

fn is_broken_pipe(err: &csv::Error) -> bool {
    matches!(err.kind(), csv::ErrorKind::Io(io_err) if io_err.kind() == io::ErrorKind::BrokenPipe)
}

fn date_str(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn number_str(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
