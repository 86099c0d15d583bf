//! Google Programmable Search (Custom Search JSON API) client.

use std::time::Duration;

use leadforge_shared::{LeadForgeError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";

const USER_AGENT: &str = concat!("LeadForge/", env!("CARGO_PKG_VERSION"));

const SERVICE: &str = "Google Custom Search";

/// One search hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchHit>,
}

/// Custom Search client bound to one engine (`cx`).
#[derive(Debug, Clone)]
pub struct WebSearchClient {
    http: Client,
    api_key: String,
    engine_id: String,
    endpoint: String,
}

impl WebSearchClient {
    pub fn new(api_key: impl Into<String>, engine_id: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LeadForgeError::upstream(SERVICE, None, format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            engine_id: engine_id.into(),
            endpoint: DEFAULT_SEARCH_URL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Run one query, returning at most `num` hits (API max 10).
    pub async fn search(&self, query: &str, num: u8) -> Result<Vec<SearchHit>> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| LeadForgeError::config(format!("invalid search endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("cx", &self.engine_id)
            .append_pair("q", query)
            .append_pair("num", &num.clamp(1, 10).to_string());

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| LeadForgeError::upstream(SERVICE, None, e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LeadForgeError::from_status(SERVICE, status.as_u16(), body));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| LeadForgeError::parse(format!("{SERVICE} response: {}", e.without_url())))?;
        Ok(parsed.items)
    }
}
