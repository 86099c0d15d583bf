//! Contact enrichment through Apollo's people-match endpoint.

use std::time::Duration;

use chrono::Utc;
use leadforge_shared::{EnrichmentStatus, Lead, LeadForgeError, Result};
use leadforge_storage::Storage;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

pub const APOLLO_API_URL: &str = "https://api.apollo.io";

const USER_AGENT: &str = concat!("LeadForge/", env!("CARGO_PKG_VERSION"));

const SERVICE: &str = "Apollo";

#[derive(Debug, Serialize)]
struct MatchRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    organization_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct MatchResponse {
    #[serde(default)]
    person: Option<ApolloPerson>,
}

/// A matched person record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApolloPerson {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub phone_numbers: Vec<ApolloPhone>,
    #[serde(default)]
    pub organization: Option<ApolloOrganization>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApolloPhone {
    #[serde(default)]
    pub sanitized_number: Option<String>,
    #[serde(default)]
    pub raw_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApolloOrganization {
    #[serde(default)]
    pub estimated_num_employees: Option<i64>,
    #[serde(default)]
    pub industry: Option<String>,
}

impl ApolloPerson {
    fn phone(&self) -> Option<&str> {
        self.phone_numbers
            .iter()
            .find_map(|p| p.sanitized_number.as_deref().or(p.raw_number.as_deref()))
            .filter(|p| !p.trim().is_empty())
    }
}

/// Apollo API client.
#[derive(Debug, Clone)]
pub struct ApolloClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl ApolloClient {
    pub fn new(api_key: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LeadForgeError::upstream(SERVICE, None, format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: APOLLO_API_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Match a lead to a person record. `NotFound` when Apollo has no match.
    pub async fn match_person(&self, lead: &Lead) -> Result<ApolloPerson> {
        let request = MatchRequest {
            name: non_blank(&lead.name),
            organization_name: non_blank(&lead.company),
            domain: lead.website.as_deref().and_then(website_domain),
            email: lead.email.as_deref().and_then(non_blank),
        };

        let response = self
            .http
            .post(format!("{}/api/v1/people/match", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .header("Cache-Control", "no-cache")
            .json(&request)
            .send()
            .await
            .map_err(|e| LeadForgeError::upstream(SERVICE, None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LeadForgeError::from_status(SERVICE, status.as_u16(), body));
        }

        let parsed: MatchResponse = response
            .json()
            .await
            .map_err(|e| LeadForgeError::parse(format!("{SERVICE} response: {e}")))?;

        parsed
            .person
            .filter(|p| !p.id.is_empty())
            .ok_or_else(|| LeadForgeError::NotFound(format!("no {SERVICE} match for {}", lead.display_company())))
    }
}

fn non_blank(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|v| !v.is_empty())
}

/// Host of a website URL without a leading `www.`.
fn website_domain(website: &str) -> Option<String> {
    let trimmed = website.trim();
    if trimmed.is_empty() {
        return None;
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let url = Url::parse(&with_scheme).ok()?;
    let host = url.host_str()?;
    Some(host.trim_start_matches("www.").to_string())
}

/// Copy matched fields onto the lead. Existing values are only replaced by
/// non-empty matches.
pub fn apply_match(lead: &mut Lead, person: &ApolloPerson) {
    fn fill(slot: &mut Option<String>, value: Option<&str>) {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            *slot = Some(v.to_string());
        }
    }

    fill(&mut lead.email, person.email.as_deref());
    fill(&mut lead.phone, person.phone());
    fill(&mut lead.linkedin_url, person.linkedin_url.as_deref());
    if let Some(title) = person.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        lead.title = title.to_string();
    }
    if let Some(org) = &person.organization {
        if let Some(n) = org.estimated_num_employees.filter(|n| *n > 0) {
            lead.employee_count = Some(n);
        }
        fill(&mut lead.industry, org.industry.as_deref());
    }
    lead.apollo_id = Some(person.id.clone());
    if lead.enrichment_status == EnrichmentStatus::Discovered {
        lead.enrichment_status = EnrichmentStatus::Enriched;
    }
    lead.enriched_at = Some(Utc::now());
}

/// Enrich one stored lead's contact data and persist it.
#[instrument(skip_all, fields(lead_id = %lead_id))]
pub async fn enrich_lead(storage: &Storage, apollo: &ApolloClient, lead_id: &str) -> Result<Lead> {
    let mut lead = storage.require_lead(lead_id).await?;
    let person = apollo.match_person(&lead).await?;
    debug!(apollo_id = %person.id, "apollo match");

    apply_match(&mut lead, &person);
    storage.update_lead(&lead).await?;
    info!(email = lead.email.is_some(), phone = lead.phone.is_some(), "lead enriched");
    Ok(lead)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::tests::temp_storage;
    use leadforge_shared::ErrorKind;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ApolloClient {
        ApolloClient::new("ak-test", 5).unwrap().with_base_url(server.uri())
    }

    fn lead() -> Lead {
        let mut lead = Lead::new("Dana Reyes", "Lakeway Country Club");
        lead.website = Some("https://www.lakewaycc.example/about".into());
        lead
    }

    #[test]
    fn domain_from_website() {
        assert_eq!(website_domain("https://www.acme.example/x").as_deref(), Some("acme.example"));
        assert_eq!(website_domain("acme.example").as_deref(), Some("acme.example"));
        assert_eq!(website_domain("  "), None);
    }

    #[tokio::test]
    async fn enriches_and_persists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/people/match"))
            .and(header("x-api-key", "ak-test"))
            .and(body_partial_json(json!({
                "name": "Dana Reyes",
                "organization_name": "Lakeway Country Club",
                "domain": "lakewaycc.example"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "person": {
                    "id": "ap_123",
                    "title": "Director of Grounds",
                    "email": "dana@lakewaycc.example",
                    "linkedin_url": "https://www.linkedin.com/in/danareyes",
                    "phone_numbers": [{"sanitized_number": "+15125550100"}],
                    "organization": {"estimated_num_employees": 240}
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let storage = temp_storage().await;
        let lead = lead();
        storage.insert_lead(&lead).await.unwrap();

        let enriched = enrich_lead(&storage, &client(&server), &lead.id).await.unwrap();
        assert_eq!(enriched.apollo_id.as_deref(), Some("ap_123"));
        assert_eq!(enriched.enrichment_status, EnrichmentStatus::Enriched);

        let stored = storage.require_lead(&lead.id).await.unwrap();
        assert_eq!(stored.email.as_deref(), Some("dana@lakewaycc.example"));
        assert_eq!(stored.phone.as_deref(), Some("+15125550100"));
        assert_eq!(stored.title, "Director of Grounds");
        assert_eq!(stored.employee_count, Some(240));
        assert!(stored.enriched_at.is_some());
    }

    #[tokio::test]
    async fn no_match_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/people/match"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"person": null})))
            .mount(&server)
            .await;

        let err = client(&server).match_person(&lead()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn rejected_key_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/people/match"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let err = client(&server).match_person(&lead()).await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[test]
    fn match_keeps_existing_values_when_empty() {
        let mut lead = lead();
        lead.email = Some("keep@acme.example".into());
        lead.enrichment_status = EnrichmentStatus::Complete;
        let person = ApolloPerson {
            id: "ap_9".into(),
            email: Some(" ".into()),
            ..Default::default()
        };
        apply_match(&mut lead, &person);
        assert_eq!(lead.email.as_deref(), Some("keep@acme.example"));
        assert_eq!(lead.enrichment_status, EnrichmentStatus::Complete);
    }
}
