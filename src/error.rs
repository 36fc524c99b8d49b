//! Error types for the Transitfeeds.com client and entity model.

use thiserror::Error;

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur while querying Transitfeeds.com or decoding its
/// wire payloads.
#[derive(Debug, Error)]
pub enum Error {
    /// The response envelope carried a status other than `OK`.
    #[error("{operation} returned status {code}: {description}")]
    ServiceStatus {
        /// Endpoint name, e.g. `getFeeds`.
        operation: &'static str,
        /// Raw status code from the envelope.
        code: String,
        /// Human-readable description from the fixed status table.
        description: &'static str,
    },

    /// A compact date string did not match the `YYYYMMDD` layout.
    #[error("'{0}' is not a valid compact date; YYYYMMDD is expected")]
    DateFormat(String),

    /// An entry in an issue list (`err`/`warn`) was not a JSON object.
    #[error("issue entry is not a JSON object: {0}")]
    MalformedIssue(serde_json::Value),

    /// The envelope status was OK but the results were not shaped as
    /// documented.
    #[error("{operation}: unexpected response shape: {reason}")]
    UnexpectedResponse {
        /// Endpoint name the response belonged to.
        operation: &'static str,
        /// What was missing or mistyped.
        reason: String,
    },

    /// Transport-level failure, passed through from reqwest unchanged.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The response body could not be decoded as JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
