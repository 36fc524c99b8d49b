//! Client for the Transitfeeds.com v1 API.
//!
//! Every operation is a single GET against the service; enveloped
//! operations validate the response status and record pagination metadata
//! on the client before handing back decoded entities.

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fetch::{BasicClient, HttpClient, Response};
use crate::models::{Feed, FeedVersion, Location, WireMap};

const BASE_URL: &str = "https://api.transitfeeds.com/v1";

/// Human descriptions for the status codes the service documents. Codes
/// introduced after this list still render, with a generic description.
pub fn describe_status(code: &str) -> &'static str {
    match code {
        "OK" => "Request was valid.",
        "EMPTYKEY" => "Request was missing API key.",
        "MISSINGINPUT" => "A required request parameter was missing.",
        "INVALIDINPUT" => "A request parameter was invalid.",
        _ => "Unrecognized status code.",
    }
}

/// Response envelope every JSON operation shares.
#[derive(Deserialize)]
struct Envelope {
    status: Option<String>,
    results: Option<Value>,
}

/// Pagination metadata from the most recent enveloped response. Fields the
/// service omitted are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub total: Option<i64>,
    pub limit: Option<i64>,
    pub page: Option<i64>,
    pub pages: Option<i64>,
}

impl PageInfo {
    fn from_results(results: &Value) -> Self {
        let field = |key| results.get(key).and_then(Value::as_i64);
        Self {
            total: field("total"),
            limit: field("limit"),
            page: field("page"),
            pages: field("numPages"),
        }
    }
}

/// Feed categories the service recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedType {
    Gtfs,
    GtfsRealtime,
}

impl FeedType {
    fn as_param(self) -> &'static str {
        match self {
            FeedType::Gtfs => "gtfs",
            FeedType::GtfsRealtime => "gtfsrealtime",
        }
    }
}

/// Optional filters for [`TransitFeeds::feeds`].
#[derive(Debug, Clone, Default)]
pub struct FeedsQuery {
    /// Only return feeds belonging to this location id.
    pub location: Option<String>,
    /// Whether feeds of sub-locations count as belonging to `location`.
    /// Off by default, so only directly assigned feeds are returned.
    pub descendants: bool,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub feed_type: Option<FeedType>,
}

/// Optional filters for [`TransitFeeds::feed_versions`].
#[derive(Debug, Clone)]
pub struct FeedVersionsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Whether validation errors come back with each version.
    pub errors: bool,
    /// Whether validation warnings come back with each version.
    pub warnings: bool,
}

impl Default for FeedVersionsQuery {
    fn default() -> Self {
        Self {
            page: None,
            limit: None,
            errors: true,
            warnings: true,
        }
    }
}

/// Client for the Transitfeeds.com v1 API.
///
/// Enveloped operations take `&mut self` because each success overwrites
/// the pagination snapshot returned by [`TransitFeeds::page_info`].
pub struct TransitFeeds<C = BasicClient> {
    key: String,
    base_url: String,
    headers: HeaderMap,
    client: C,
    page_info: PageInfo,
}

impl TransitFeeds<BasicClient> {
    /// Builds a client around the default transport.
    pub fn new(key: String) -> Result<Self> {
        Ok(Self::with_client(key, BasicClient::new()?))
    }
}

impl<C: HttpClient> TransitFeeds<C> {
    /// Builds a client around a caller-supplied transport.
    pub fn with_client(key: String, client: C) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        Self {
            key,
            base_url: BASE_URL.to_string(),
            headers,
            client,
            page_info: PageInfo::default(),
        }
    }

    /// Adds a header sent with every request.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Pagination metadata recorded by the last successful enveloped call.
    pub fn page_info(&self) -> PageInfo {
        self.page_info
    }

    /// Lists the places the service groups feeds under.
    pub async fn locations(&mut self) -> Result<Vec<Location>> {
        let results = self.request_results("getLocations", Vec::new()).await?;
        let maps = entity_list(&results, "locations", "getLocations")?;
        Ok(maps.into_iter().map(Location::new).collect())
    }

    /// Lists feeds, optionally narrowed by location, type and page.
    pub async fn feeds(&mut self, query: &FeedsQuery) -> Result<Vec<Feed>> {
        let mut params = Vec::new();
        if let Some(location) = &query.location {
            params.push(("location", location.clone()));
        }
        params.push(("descendants", flag(query.descendants).to_string()));
        if let Some(page) = query.page {
            params.push(("page", page.to_string()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(feed_type) = query.feed_type {
            params.push(("type", feed_type.as_param().to_string()));
        }

        let results = self.request_results("getFeeds", params).await?;
        let maps = entity_list(&results, "feeds", "getFeeds")?;
        Ok(maps.into_iter().map(Feed::new).collect())
    }

    /// Resolves the download URL of the newest version of a feed by reading
    /// the `Location` header of the redirect response, without following it.
    /// `None` when the service answers without a redirect.
    pub async fn latest(&self, feed: &str) -> Result<Option<String>> {
        let params = vec![("feed", feed.to_string())];
        let response = self.request("getLatestFeedVersion", params).await?;
        Ok(response.header("Location").map(str::to_string))
    }

    /// Lists the known versions of a feed, newest first.
    pub async fn feed_versions(
        &mut self,
        feed: &str,
        query: &FeedVersionsQuery,
    ) -> Result<Vec<FeedVersion>> {
        let mut params = vec![("feed", feed.to_string())];
        if let Some(page) = query.page {
            params.push(("page", page.to_string()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        params.push(("err", flag(query.errors).to_string()));
        params.push(("warn", flag(query.warnings).to_string()));

        let results = self.request_results("getFeedVersions", params).await?;
        let maps = entity_list(&results, "versions", "getFeedVersions")?;
        Ok(maps.into_iter().map(FeedVersion::new).collect())
    }

    async fn request(
        &self,
        operation: &'static str,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<Response> {
        params.push(("key", self.key.clone()));
        let url = format!("{}/{}", self.base_url, operation);
        debug!(operation, url = %url, "Sending API request");
        self.client.get(&url, &params, &self.headers).await
    }

    /// Runs an enveloped operation: validates the response status, then
    /// records pagination metadata and returns the `results` payload.
    async fn request_results(
        &mut self,
        operation: &'static str,
        params: Vec<(&'static str, String)>,
    ) -> Result<Value> {
        let response = self.request(operation, params).await?;
        let envelope: Envelope = serde_json::from_slice(&response.body)?;

        let status = envelope.status.ok_or_else(|| Error::UnexpectedResponse {
            operation,
            reason: "response carries no status field".to_string(),
        })?;
        if status != "OK" {
            let description = describe_status(&status);
            return Err(Error::ServiceStatus {
                operation,
                code: status,
                description,
            });
        }

        let results = envelope.results.ok_or_else(|| Error::UnexpectedResponse {
            operation,
            reason: "response carries no results payload".to_string(),
        })?;
        self.page_info = PageInfo::from_results(&results);
        Ok(results)
    }
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// Pulls the entity array out of a `results` payload as owned wire maps.
fn entity_list(results: &Value, key: &str, operation: &'static str) -> Result<Vec<WireMap>> {
    let items = results
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| Error::UnexpectedResponse {
            operation,
            reason: format!("results carry no {key} array"),
        })?;

    items
        .iter()
        .map(|item| {
            item.as_object().cloned().ok_or_else(|| Error::UnexpectedResponse {
                operation,
                reason: format!("{key} entry is not an object"),
            })
        })
        .collect()
}
