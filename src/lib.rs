//! Client library for the Transitfeeds.com API.
//!
//! [`TransitFeeds`] wraps the v1 GET endpoints and returns lazily decoded
//! entities from [`models`]; [`output`] renders them as TSV listings.

pub mod api;
pub mod error;
pub mod fetch;
pub mod models;
pub mod output;

pub use api::{FeedType, FeedVersionsQuery, FeedsQuery, PageInfo, TransitFeeds, describe_status};
pub use error::{Error, Result};
pub use models::{Feed, FeedVersion, FeedVersionIssue, Location, epoch_to_datetime, ymd_to_date};
