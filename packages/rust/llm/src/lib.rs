//! OpenAI-compatible chat-completions client.
//!
//! One client type serves both OpenAI (analysis, synthesis, message
//! generation) and Perplexity (search-backed social lookups), since both
//! expose `POST {base}/chat/completions` with bearer auth.

mod json;

use std::time::Duration;

use leadforge_shared::{LeadForgeError, Result};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use json::{extract_json_payload, parse_json_reply};

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";
pub const PERPLEXITY_API_URL: &str = "https://api.perplexity.ai";

/// User-Agent string for model requests.
const USER_AGENT: &str = concat!("LeadForge/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Per-call knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Ask for `response_format: json_object`.
    pub json_mode: bool,
}

impl ChatOptions {
    pub fn json() -> Self {
        Self {
            json_mode: true,
            temperature: Some(0.3),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Chat-completions client bound to one provider and model.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    service: &'static str,
}

impl ChatClient {
    /// OpenAI client for `model`.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        Self::build("OpenAI", OPENAI_API_URL, api_key.into(), model.into(), timeout_secs)
    }

    /// Perplexity client for `model` (e.g. `sonar`).
    pub fn perplexity(api_key: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        Self::build("Perplexity", PERPLEXITY_API_URL, api_key.into(), model.into(), timeout_secs)
    }

    fn build(service: &'static str, base_url: &str, api_key: String, model: String, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LeadForgeError::upstream(service, None, format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.to_string(),
            model,
            service,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Provider name used in errors and logs.
    pub fn service(&self) -> &'static str {
        self.service
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| LeadForgeError::config(format!("{} API key contains invalid characters", self.service)))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Send a chat request and return the first choice's text.
    pub async fn complete(&self, messages: &[ChatMessage], options: ChatOptions) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: options.json_mode.then_some(ResponseFormat { kind: "json_object" }),
        };

        debug!(service = self.service, model = %self.model, json = options.json_mode, "chat request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| LeadForgeError::upstream(self.service, None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LeadForgeError::from_status(self.service, status.as_u16(), body));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LeadForgeError::parse(format!("{} response: {e}", self.service)))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LeadForgeError::parse(format!("{} returned no content", self.service)))
    }

    /// JSON-mode call whose reply is deserialized into `T`.
    pub async fn complete_json<T: DeserializeOwned>(&self, messages: &[ChatMessage]) -> Result<T> {
        let reply = self.complete(messages, ChatOptions::json()).await?;
        parse_json_reply(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadforge_shared::ErrorKind;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reply(content: &str) -> serde_json::Value {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
    }

    #[tokio::test]
    async fn json_mode_request_and_parse() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("```json\n{\"property_type\": \"office_park\"}\n```")))
            .mount(&server)
            .await;

        let client = ChatClient::openai("sk-test", "gpt-4o-mini", 5)
            .unwrap()
            .with_base_url(server.uri());

        #[derive(Deserialize)]
        struct Out {
            property_type: String,
        }
        let out: Out = client
            .complete_json(&[ChatMessage::user("analyze")])
            .await
            .unwrap();
        assert_eq!(out.property_type, "office_park");
    }

    #[tokio::test]
    async fn unauthorized_is_flagged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let client = ChatClient::perplexity("bad", "sonar", 5)
            .unwrap()
            .with_base_url(server.uri());
        let err = client
            .complete(&[ChatMessage::user("hi")], ChatOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert!(err.to_string().starts_with("Perplexity request failed (HTTP 401)"));
    }

    #[tokio::test]
    async fn rate_limit_and_empty_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"model": "limited"})))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"model": "empty"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let limited = ChatClient::openai("k", "limited", 5).unwrap().with_base_url(server.uri());
        let err = limited
            .complete(&[ChatMessage::user("hi")], ChatOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);

        let empty = ChatClient::openai("k", "empty", 5).unwrap().with_base_url(server.uri());
        let err = empty
            .complete(&[ChatMessage::user("hi")], ChatOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailure);
    }
}
