//! End-to-end tests for the API client against a scripted transport.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Local, NaiveDate, TimeZone};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};

use transitfeeds::fetch::{HttpClient, Response};
use transitfeeds::{Error, FeedType, FeedVersionsQuery, FeedsQuery, PageInfo, TransitFeeds};

#[derive(Clone)]
struct RecordedRequest {
    url: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
}

struct Script {
    responses: Mutex<Vec<Response>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Transport double that replays canned responses in order and records
/// every request it serves.
#[derive(Clone)]
struct FakeClient(Arc<Script>);

impl FakeClient {
    fn returning(responses: Vec<Response>) -> Self {
        Self(Arc::new(Script {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }))
    }

    fn requests(&self) -> Vec<RecordedRequest> {
        self.0.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for FakeClient {
    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &HeaderMap,
    ) -> transitfeeds::Result<Response> {
        self.0.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            query: query
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
            headers: headers.clone(),
        });
        Ok(self.0.responses.lock().unwrap().remove(0))
    }
}

fn json_response(body: Value) -> Response {
    Response {
        status: StatusCode::OK,
        headers: HeaderMap::new(),
        body: body.to_string().into_bytes(),
    }
}

fn redirect_response(location: &str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("location", HeaderValue::from_str(location).unwrap());
    Response {
        status: StatusCode::FOUND,
        headers,
        body: Vec::new(),
    }
}

fn envelope(results: Value) -> Response {
    json_response(json!({"status": "OK", "ts": 1506461854, "results": results}))
}

fn api_with(responses: Vec<Response>) -> (TransitFeeds<FakeClient>, FakeClient) {
    let fake = FakeClient::returning(responses);
    let api = TransitFeeds::with_client("testkey".to_string(), fake.clone());
    (api, fake)
}

fn pairs(query: &[(String, String)]) -> Vec<(&str, &str)> {
    query
        .iter()
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect()
}

#[tokio::test]
async fn test_locations_roundtrip() {
    let (mut api, fake) = api_with(vec![envelope(json!({
        "locations": [
            {"id": 604, "pid": 168, "t": "Aachen, Germany", "n": "Aachen",
             "lat": 50.776351, "lng": 6.083862},
            {"id": 99, "pid": 54, "t": "Boston, MA, USA", "n": "Boston",
             "lat": 42.358431, "lng": -71.059773}
        ]
    }))]);

    let locations = api.locations().await.unwrap();
    assert_eq!(locations.len(), 2);
    assert_eq!(locations[0].id().as_deref(), Some("604"));
    assert_eq!(locations[0].coords(), (Some(6.083862), Some(50.776351)));
    assert_eq!(locations[1].name(), Some("Boston"));

    // getLocations carries no pagination metadata; every field stays unset.
    assert_eq!(api.page_info(), PageInfo::default());

    let requests = fake.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://api.transitfeeds.com/v1/getLocations");
    assert_eq!(pairs(&requests[0].query), vec![("key", "testkey")]);
    assert_eq!(
        requests[0].headers.get("accept").and_then(|v| v.to_str().ok()),
        Some("application/json")
    );
}

#[tokio::test]
async fn test_feeds_query_serialization() {
    let (mut api, fake) = api_with(vec![
        envelope(json!({"feeds": [], "total": 0, "limit": 10, "page": 1, "numPages": 0})),
        envelope(json!({"feeds": []})),
    ]);

    let query = FeedsQuery {
        location: Some("604".to_string()),
        descendants: true,
        page: Some(2),
        limit: Some(10),
        feed_type: Some(FeedType::Gtfs),
    };
    api.feeds(&query).await.unwrap();
    api.feeds(&FeedsQuery::default()).await.unwrap();

    let requests = fake.requests();
    assert_eq!(requests[0].url, "https://api.transitfeeds.com/v1/getFeeds");
    assert_eq!(
        pairs(&requests[0].query),
        vec![
            ("location", "604"),
            ("descendants", "1"),
            ("page", "2"),
            ("limit", "10"),
            ("type", "gtfs"),
            ("key", "testkey"),
        ]
    );
    // Unset flags fall back to direct assignment only.
    assert_eq!(
        pairs(&requests[1].query),
        vec![("descendants", "0"), ("key", "testkey")]
    );

    // The second response carried no pagination keys, so the snapshot from
    // the first call is fully overwritten with unset fields.
    assert_eq!(api.page_info(), PageInfo::default());
}

#[tokio::test]
async fn test_feeds_decode_nested_entities() {
    let (mut api, _fake) = api_with(vec![envelope(json!({
        "feeds": [{
            "id": "mbta/64",
            "ty": "gtfs",
            "t": "MBTA GTFS",
            "l": {"id": 99, "t": "Boston, MA, USA", "n": "Boston"},
            "u": {"i": "http://example.com/info", "d": "http://example.com/gtfs.zip"},
            "latest": {"ts": 1502290500}
        }]
    }))]);

    let feeds = api.feeds(&FeedsQuery::default()).await.unwrap();
    assert_eq!(feeds.len(), 1);

    let feed = &feeds[0];
    assert_eq!(feed.id().as_deref(), Some("mbta/64"));
    assert_eq!(feed.feed_type(), Some("gtfs"));
    assert_eq!(feed.title(), Some("MBTA GTFS"));
    assert_eq!(feed.location().and_then(|l| l.name()), Some("Boston"));
    assert_eq!(
        feed.url().get("download").map(String::as_str),
        Some("http://example.com/gtfs.zip")
    );
    assert_eq!(
        feed.latest(),
        Some(Local.timestamp_opt(1502290500, 0).unwrap())
    );
}

#[tokio::test]
async fn test_feed_versions_fixture() {
    let fixture = include_str!("fixtures/getFeedVersions.json");
    let (mut api, fake) = api_with(vec![Response {
        status: StatusCode::OK,
        headers: HeaderMap::new(),
        body: fixture.as_bytes().to_vec(),
    }]);

    let versions = api
        .feed_versions("mbta/64", &FeedVersionsQuery::default())
        .await
        .unwrap();
    assert_eq!(versions.len(), 3);

    let newest = &versions[0];
    assert_eq!(newest.id().as_deref(), Some("mbta/64-20170809"));
    assert_eq!(newest.size(), 7680176);
    let err = newest.err().unwrap();
    assert_eq!(err.len(), 2);
    assert_eq!(err[0].filename(), Some("stop_times.txt"));
    assert_eq!(err[0].line(), Some(118));
    assert_eq!(err[0].column(), Some(4));
    assert_eq!(err[0].message(), Some("Invalid stop_id in stop_times.txt"));
    assert!(newest.warn().unwrap().is_empty());

    let second = &versions[1];
    let feed = second.feed().expect("nested feed should decode");
    assert_eq!(feed.id().as_deref(), Some("mbta/64"));
    assert_eq!(feed.title(), Some("MBTA GTFS"));
    assert_eq!(
        second.timestamp(),
        Some(Local.timestamp_opt(1498666441, 0).unwrap())
    );
    assert_eq!(
        second.dates().unwrap().get("start"),
        Some(&NaiveDate::from_ymd_opt(2017, 6, 28).unwrap())
    );
    assert_eq!(second.warn().unwrap().len(), 1);

    // Seven-digit compact date decodes like the padded form.
    let oldest = &versions[2];
    assert_eq!(
        oldest.dates().unwrap().get("start"),
        Some(&NaiveDate::from_ymd_opt(2016, 10, 1).unwrap())
    );
    assert!(oldest.feed().is_none());

    assert_eq!(
        api.page_info(),
        PageInfo {
            total: Some(3),
            limit: Some(50),
            page: Some(1),
            pages: Some(1),
        }
    );

    let requests = fake.requests();
    assert_eq!(
        requests[0].url,
        "https://api.transitfeeds.com/v1/getFeedVersions"
    );
    assert_eq!(
        pairs(&requests[0].query),
        vec![
            ("feed", "mbta/64"),
            ("err", "1"),
            ("warn", "1"),
            ("key", "testkey"),
        ]
    );
}

#[tokio::test]
async fn test_feed_versions_issue_flags_off() {
    let (mut api, fake) = api_with(vec![envelope(json!({"versions": []}))]);
    let query = FeedVersionsQuery {
        page: Some(3),
        limit: Some(25),
        errors: false,
        warnings: false,
    };
    api.feed_versions("mbta/64", &query).await.unwrap();

    assert_eq!(
        pairs(&fake.requests()[0].query),
        vec![
            ("feed", "mbta/64"),
            ("page", "3"),
            ("limit", "25"),
            ("err", "0"),
            ("warn", "0"),
            ("key", "testkey"),
        ]
    );
}

#[tokio::test]
async fn test_latest_reads_redirect_location() {
    let (api, fake) = api_with(vec![redirect_response(
        "https://transitfeeds.com/p/mbta/64/latest/download",
    )]);

    let url = api.latest("mbta/64").await.unwrap();
    assert_eq!(
        url.as_deref(),
        Some("https://transitfeeds.com/p/mbta/64/latest/download")
    );

    let requests = fake.requests();
    assert_eq!(
        requests[0].url,
        "https://api.transitfeeds.com/v1/getLatestFeedVersion"
    );
    assert_eq!(
        pairs(&requests[0].query),
        vec![("feed", "mbta/64"), ("key", "testkey")]
    );
}

#[tokio::test]
async fn test_latest_without_redirect_is_none() {
    let (api, _fake) = api_with(vec![json_response(json!({"status": "OK"}))]);
    assert_eq!(api.latest("unknown/1").await.unwrap(), None);
}

#[tokio::test]
async fn test_service_status_error_keeps_page_info() {
    let (mut api, _fake) = api_with(vec![
        envelope(json!({"feeds": [], "total": 7, "limit": 10, "page": 1, "numPages": 1})),
        json_response(json!({"status": "INVALIDINPUT", "ts": 1506461854})),
    ]);

    api.feeds(&FeedsQuery::default()).await.unwrap();
    let before = api.page_info();
    assert_eq!(before.total, Some(7));

    let err = api.feeds(&FeedsQuery::default()).await.unwrap_err();
    match err {
        Error::ServiceStatus {
            operation,
            code,
            description,
        } => {
            assert_eq!(operation, "getFeeds");
            assert_eq!(code, "INVALIDINPUT");
            assert_eq!(description, "A request parameter was invalid.");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // Metadata still reflects the last successful call.
    assert_eq!(api.page_info(), before);
}

#[tokio::test]
async fn test_unknown_status_still_reports() {
    let (mut api, _fake) = api_with(vec![json_response(json!({"status": "RATELIMIT"}))]);

    let err = api.locations().await.unwrap_err();
    match err {
        Error::ServiceStatus { code, description, .. } => {
            assert_eq!(code, "RATELIMIT");
            assert_eq!(description, "Unrecognized status code.");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_envelopes() {
    let (mut api, _fake) = api_with(vec![
        json_response(json!({"results": {}})),
        json_response(json!({"status": "OK"})),
        envelope(json!({"nothing": []})),
    ]);

    let no_status = api.locations().await;
    assert!(matches!(no_status, Err(Error::UnexpectedResponse { .. })));

    let no_results = api.locations().await;
    assert!(matches!(no_results, Err(Error::UnexpectedResponse { .. })));

    let no_array = api.locations().await;
    assert!(matches!(no_array, Err(Error::UnexpectedResponse { .. })));
}

#[tokio::test]
async fn test_custom_headers_sent() {
    let (mut api, fake) = api_with(vec![envelope(json!({"locations": []}))]);
    api.set_header(
        HeaderName::from_static("user-agent"),
        HeaderValue::from_static("transitfeeds-tests"),
    );

    api.locations().await.unwrap();

    let headers = &fake.requests()[0].headers;
    assert_eq!(
        headers.get("accept").and_then(|v| v.to_str().ok()),
        Some("application/json")
    );
    assert_eq!(
        headers.get("user-agent").and_then(|v| v.to_str().ok()),
        Some("transitfeeds-tests")
    );
}
