use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::redirect;
use std::time::Duration;

use super::client::{HttpClient, Response};
use crate::error::Result;

pub struct BasicClient(reqwest::Client);

impl BasicClient {
    /// Builds the default transport. Redirects are surfaced to the caller
    /// rather than followed, keeping `Location` headers observable.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self(client))
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &HeaderMap,
    ) -> Result<Response> {
        let resp = self
            .0
            .get(url)
            .query(query)
            .headers(headers.clone())
            .send()
            .await?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?.to_vec();
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
