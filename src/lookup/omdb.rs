//! OMDb (Open Movie Database) title lookup.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::lookup::{LookupError, TitleSource};

const BASE_URL: &str = "http://www.omdbapi.com/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct OmdbResponse {
    #[serde(rename = "Response")]
    response: String,
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "Error")]
    error: Option<String>,
}

pub struct OmdbClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OmdbClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("OMDb client setup failed ({}), using defaults without a timeout", e);
                reqwest::Client::new()
            });
        Self {
            http,
            api_key,
            base_url,
        }
    }
}

#[async_trait]
impl TitleSource for OmdbClient {
    async fn fetch_title(&self, id: &str) -> Result<Option<String>, LookupError> {
        let resp = self
            .http
            .get(&self.base_url)
            .query(&[("i", id), ("r", "json"), ("apikey", self.api_key.as_str())])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(LookupError::Status(resp.status().as_u16()));
        }

        let body: OmdbResponse = resp
            .json()
            .await
            .map_err(|e| LookupError::Malformed(e.to_string()))?;
        parse_response(body)
    }
}

fn parse_response(body: OmdbResponse) -> Result<Option<String>, LookupError> {
    match body.response.as_str() {
        "True" => Ok(body.title.filter(|t| !t.trim().is_empty())),
        "False" => {
            tracing::debug!(
                "OMDb: {}",
                body.error.as_deref().unwrap_or("not found")
            );
            Ok(None)
        }
        other => Err(LookupError::Malformed(format!(
            "unexpected Response field `{other}`"
        ))),
    }
}
