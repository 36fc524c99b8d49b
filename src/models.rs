//! Typed views over the abbreviated wire format of Transitfeeds.com.
//!
//! Every entity owns the raw JSON mapping it was built from and decodes
//! friendly fields from the short wire keys on first access, caching the
//! result for the lifetime of the instance.

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{Error, Result};

/// The raw key/value mapping an entity is constructed from.
pub type WireMap = serde_json::Map<String, Value>;

/// Decodes a compact `YYYYMMDD` date string into a calendar date.
///
/// The service sometimes drops the leading zero of the day, producing a
/// seven-digit string; both widths parse.
///
/// # Errors
///
/// Returns [`Error::DateFormat`] when the string does not parse.
pub fn ymd_to_date(ymd: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(ymd, "%Y%m%d").map_err(|_| Error::DateFormat(ymd.to_string()))
}

/// Decodes an epoch-seconds string (possibly fractional) into a local
/// timestamp. Returns `None` when the string is not numeric.
pub fn epoch_to_datetime(ts: &str) -> Option<DateTime<Local>> {
    from_epoch_secs(ts.trim().parse().ok()?)
}

fn from_epoch_secs(secs: f64) -> Option<DateTime<Local>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.div_euclid(1.0) as i64;
    let nanos = (secs.rem_euclid(1.0) * 1e9).round() as u32;
    Local.timestamp_opt(whole, nanos.min(999_999_999)).single()
}

/// The `ts` wire value arrives as either a bare number or a numeric string.
fn timestamp_value(value: &Value) -> Option<DateTime<Local>> {
    match value {
        Value::Number(n) => from_epoch_secs(n.as_f64()?),
        Value::String(s) => epoch_to_datetime(s),
        _ => None,
    }
}

/// Ids are strings for feeds and bare numbers for locations; both render
/// as an opaque string.
fn id_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn int_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Translates abbreviated `u` sub-keys; unknown keys pass through unchanged.
fn remap_url_key(key: &str) -> &str {
    match key {
        "i" => "info",
        "d" => "download",
        other => other,
    }
}

/// Translates abbreviated `d` sub-keys; unknown keys pass through unchanged.
fn remap_date_key(key: &str) -> &str {
    match key {
        "s" => "start",
        "f" => "finish",
        other => other,
    }
}

/// Represents a single GTFS-covered place.
#[derive(Debug)]
pub struct Location {
    raw: WireMap,
}

impl Location {
    pub fn new(raw: WireMap) -> Self {
        Self { raw }
    }

    /// The raw wire mapping this location was built from.
    pub fn raw(&self) -> &WireMap {
        &self.raw
    }

    pub fn id(&self) -> Option<String> {
        self.raw.get("id").and_then(id_value)
    }

    /// Id of the enclosing location, when this place sits inside another.
    pub fn parent_id(&self) -> Option<i64> {
        self.raw.get("pid").and_then(int_value)
    }

    pub fn title(&self) -> Option<&str> {
        self.raw.get("t").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.raw.get("n").and_then(Value::as_str)
    }

    /// Longitude and latitude, in that order. A missing wire key leaves its
    /// slot `None`; the pair shape never changes.
    pub fn coords(&self) -> (Option<f64>, Option<f64>) {
        (
            self.raw.get("lng").and_then(float_value),
            self.raw.get("lat").and_then(float_value),
        )
    }
}

/// Metadata about a single GTFS feed.
#[derive(Debug)]
pub struct Feed {
    raw: WireMap,
    location: OnceCell<Option<Location>>,
    url: OnceCell<HashMap<String, String>>,
    latest: OnceCell<Option<DateTime<Local>>>,
}

impl Feed {
    pub fn new(raw: WireMap) -> Self {
        Self {
            raw,
            location: OnceCell::new(),
            url: OnceCell::new(),
            latest: OnceCell::new(),
        }
    }

    /// The raw wire mapping this feed was built from.
    pub fn raw(&self) -> &WireMap {
        &self.raw
    }

    pub fn id(&self) -> Option<String> {
        self.raw.get("id").and_then(id_value)
    }

    /// Feed type, `gtfs` or `gtfsrealtime`. Types the service introduces
    /// later pass through as-is.
    pub fn feed_type(&self) -> Option<&str> {
        self.raw.get("ty").and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.raw.get("t").and_then(Value::as_str)
    }

    /// The place this feed is attached to, decoded from the nested `l`
    /// mapping on first access. `None` when the key is missing or not a
    /// mapping.
    pub fn location(&self) -> Option<&Location> {
        self.location
            .get_or_init(|| {
                self.raw
                    .get("l")
                    .and_then(Value::as_object)
                    .map(|map| Location::new(map.clone()))
            })
            .as_ref()
    }

    /// Related URLs keyed by purpose (`info`, `download`, ...), decoded on
    /// first access. A missing or non-mapping `u` leaves the map empty.
    pub fn url(&self) -> &HashMap<String, String> {
        self.url
            .get_or_init(|| match self.raw.get("u").and_then(Value::as_object) {
                Some(map) => map
                    .iter()
                    .filter_map(|(key, value)| {
                        let value = value.as_str()?;
                        Some((remap_url_key(key).to_string(), value.to_string()))
                    })
                    .collect(),
                None => HashMap::new(),
            })
    }

    /// Publication time of the newest version, from the nested `latest.ts`
    /// epoch value. `None` when the path is absent or not numeric.
    pub fn latest(&self) -> Option<DateTime<Local>> {
        *self.latest.get_or_init(|| {
            self.raw
                .get("latest")
                .and_then(|latest| latest.get("ts"))
                .and_then(timestamp_value)
        })
    }
}

/// One validation problem reported for a feed version.
#[derive(Debug)]
pub struct FeedVersionIssue {
    raw: WireMap,
}

impl FeedVersionIssue {
    pub fn new(raw: WireMap) -> Self {
        Self { raw }
    }

    /// The raw wire mapping this issue was built from.
    pub fn raw(&self) -> &WireMap {
        &self.raw
    }

    pub fn filename(&self) -> Option<&str> {
        self.raw.get("f").and_then(Value::as_str)
    }

    pub fn line(&self) -> Option<i64> {
        self.raw.get("l").and_then(int_value)
    }

    pub fn column(&self) -> Option<i64> {
        self.raw.get("c").and_then(int_value)
    }

    pub fn message(&self) -> Option<&str> {
        self.raw.get("m").and_then(Value::as_str)
    }
}

/// Represents a past version of a GTFS dataset.
#[derive(Debug)]
pub struct FeedVersion {
    raw: WireMap,
    feed: OnceCell<Option<Feed>>,
    timestamp: OnceCell<Option<DateTime<Local>>>,
    dates: OnceCell<HashMap<String, NaiveDate>>,
    err: OnceCell<Vec<FeedVersionIssue>>,
    warn: OnceCell<Vec<FeedVersionIssue>>,
}

impl FeedVersion {
    pub fn new(raw: WireMap) -> Self {
        Self {
            raw,
            feed: OnceCell::new(),
            timestamp: OnceCell::new(),
            dates: OnceCell::new(),
            err: OnceCell::new(),
            warn: OnceCell::new(),
        }
    }

    /// The raw wire mapping this version was built from.
    pub fn raw(&self) -> &WireMap {
        &self.raw
    }

    pub fn id(&self) -> Option<String> {
        self.raw.get("id").and_then(id_value)
    }

    /// The feed this version belongs to, decoded from the nested `f`
    /// mapping on first access.
    pub fn feed(&self) -> Option<&Feed> {
        self.feed
            .get_or_init(|| {
                self.raw
                    .get("f")
                    .and_then(Value::as_object)
                    .map(|map| Feed::new(map.clone()))
            })
            .as_ref()
    }

    /// Publication time of this version, from the `ts` epoch value.
    pub fn timestamp(&self) -> Option<DateTime<Local>> {
        *self
            .timestamp
            .get_or_init(|| self.raw.get("ts").and_then(timestamp_value))
    }

    /// Size of the dataset in bytes; 0 when the service omits it.
    pub fn size(&self) -> i64 {
        self.raw.get("size").and_then(int_value).unwrap_or(0)
    }

    /// Download URL of this version.
    pub fn url(&self) -> Option<&str> {
        self.raw.get("url").and_then(Value::as_str)
    }

    /// Service period of this version, keyed `start`/`finish`, decoded on
    /// first access. A missing or non-mapping `d` leaves the map empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DateFormat`] when a value does not parse as a
    /// compact date. Failures are not cached: the next call decodes again
    /// and fails again.
    pub fn dates(&self) -> Result<&HashMap<String, NaiveDate>> {
        self.dates
            .get_or_try_init(|| match self.raw.get("d").and_then(Value::as_object) {
                Some(map) => map
                    .iter()
                    .map(|(key, value)| {
                        let date = match value.as_str() {
                            Some(s) => ymd_to_date(s)?,
                            None => return Err(Error::DateFormat(value.to_string())),
                        };
                        Ok((remap_date_key(key).to_string(), date))
                    })
                    .collect(),
                None => Ok(HashMap::new()),
            })
    }

    /// Validation errors reported for this version, in service order. A
    /// missing or non-array `err` yields an empty slice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedIssue`] when a list entry is not a JSON
    /// object.
    pub fn err(&self) -> Result<&[FeedVersionIssue]> {
        Ok(self.err.get_or_try_init(|| issue_list(self.raw.get("err")))?)
    }

    /// Validation warnings reported for this version, in service order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedIssue`] when a list entry is not a JSON
    /// object.
    pub fn warn(&self) -> Result<&[FeedVersionIssue]> {
        Ok(self
            .warn
            .get_or_try_init(|| issue_list(self.raw.get("warn")))?)
    }
}

fn issue_list(value: Option<&Value>) -> Result<Vec<FeedVersionIssue>> {
    match value.and_then(Value::as_array) {
        Some(items) => items
            .iter()
            .map(|item| match item.as_object() {
                Some(map) => Ok(FeedVersionIssue::new(map.clone())),
                None => Err(Error::MalformedIssue(item.clone())),
            })
            .collect(),
        None => Ok(Vec::new()),
    }
}
