//! Google Maps / Places client: geocoding, text search, and place details.
//!
//! Talks to the legacy JSON web services, which report most failures as a
//! `status` field inside an HTTP 200 body. Those statuses are mapped onto
//! [`LeadForgeError`] variants and logged with a remediation hint.

mod competitors;
mod sanitize;

use std::time::Duration;

use leadforge_shared::{LeadForgeError, Result};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

pub use competitors::{
    CompetitorQuery, MAX_COMPETITORS, MAX_REVIEWS_PER_COMPETITOR, SEARCH_RADIUS_METERS,
    search_competitors,
};
pub use sanitize::sanitize_text;

/// Production endpoint root for the Maps web services.
pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api/";

/// User-Agent string for directory requests.
const USER_AGENT: &str = concat!("LeadForge/", env!("CARGO_PKG_VERSION"));

const SERVICE: &str = "Google Places";

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct DetailsEnvelope {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    result: Option<PlaceDetails>,
}

/// One geocoder match.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeResult {
    pub formatted_address: String,
    pub geometry: Geometry,
    #[serde(default)]
    pub address_components: Vec<AddressComponent>,
    #[serde(default)]
    pub place_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressComponent {
    pub long_name: String,
    pub short_name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

impl GeocodeResult {
    /// Long name of the first component tagged with `kind`.
    pub fn component(&self, kind: &str) -> Option<&str> {
        self.find_component(kind).map(|c| c.long_name.as_str())
    }

    /// Short name (e.g. `TX`) of the first component tagged with `kind`.
    pub fn component_short(&self, kind: &str) -> Option<&str> {
        self.find_component(kind).map(|c| c.short_name.as_str())
    }

    fn find_component(&self, kind: &str) -> Option<&AddressComponent> {
        self.address_components
            .iter()
            .find(|c| c.types.iter().any(|t| t == kind))
    }
}

/// A text-search hit.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlaceSummary {
    pub place_id: String,
    pub name: String,
    pub formatted_address: Option<String>,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u32>,
    pub business_status: Option<String>,
    pub types: Vec<String>,
}

/// Place details, limited to the fields we request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlaceDetails {
    pub place_id: Option<String>,
    pub name: Option<String>,
    pub formatted_address: Option<String>,
    pub formatted_phone_number: Option<String>,
    pub website: Option<String>,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u32>,
    pub business_status: Option<String>,
    pub types: Vec<String>,
    pub opening_hours: Option<OpeningHours>,
    pub editorial_summary: Option<EditorialSummary>,
    pub reviews: Vec<PlaceReview>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpeningHours {
    pub weekday_text: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EditorialSummary {
    pub overview: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlaceReview {
    pub author_name: String,
    pub rating: Option<f64>,
    pub text: String,
    pub relative_time_description: Option<String>,
    /// Unix seconds.
    pub time: Option<i64>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Request shape for a text search.
#[derive(Debug, Clone, Default)]
pub struct TextSearch<'a> {
    pub query: &'a str,
    /// Bias results toward this point.
    pub location: Option<LatLng>,
    pub radius_meters: Option<u32>,
}

/// Google Maps web-services client.
#[derive(Debug, Clone)]
pub struct PlacesClient {
    http: Client,
    api_key: String,
    base_url: Url,
}

impl PlacesClient {
    /// Create a client against the production endpoints.
    pub fn new(api_key: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LeadForgeError::upstream(SERVICE, None, format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: parse_base(DEFAULT_BASE_URL)?,
        })
    }

    /// Point the client at a different root (used by tests).
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = parse_base(base_url)?;
        Ok(self)
    }

    /// Geocode a free-form address. `Ok(None)` when nothing matched.
    pub async fn geocode(&self, address: &str) -> Result<Option<GeocodeResult>> {
        let envelope: Envelope<GeocodeResult> = self
            .get_json("geocode/json", &[("address", address.to_string())])
            .await?;
        check_status(&envelope.status, envelope.error_message.as_deref())?;
        Ok(envelope.results.into_iter().next())
    }

    /// Places text search.
    pub async fn text_search(&self, search: &TextSearch<'_>) -> Result<Vec<PlaceSummary>> {
        let mut query = vec![("query", search.query.to_string())];
        if let Some(loc) = search.location {
            query.push(("location", format!("{},{}", loc.lat, loc.lng)));
            if let Some(radius) = search.radius_meters {
                query.push(("radius", radius.to_string()));
            }
        }

        let envelope: Envelope<PlaceSummary> = self.get_json("place/textsearch/json", &query).await?;
        check_status(&envelope.status, envelope.error_message.as_deref())?;
        debug!(query = %search.query, hits = envelope.results.len(), "text search complete");
        Ok(envelope.results)
    }

    /// Place details for `place_id`, restricted to `fields`.
    pub async fn place_details(
        &self,
        place_id: &str,
        fields: &[&str],
        reviews_sort: Option<&str>,
    ) -> Result<PlaceDetails> {
        let mut query = vec![
            ("place_id", place_id.to_string()),
            ("fields", fields.join(",")),
        ];
        if let Some(sort) = reviews_sort {
            query.push(("reviews_sort", sort.to_string()));
        }

        let envelope: DetailsEnvelope = self.get_json("place/details/json", &query).await?;
        check_status(&envelope.status, envelope.error_message.as_deref())?;
        envelope
            .result
            .ok_or_else(|| LeadForgeError::NotFound(format!("place {place_id}")))
    }

    /// Satellite image URL centred on a point. The API key is not embedded;
    /// callers that render the image append their own `key` parameter.
    pub fn satellite_image_url(&self, location: LatLng) -> String {
        let mut url = self.base_url.clone();
        url.set_path(&format!("{}staticmap", self.base_url.path()));
        url.query_pairs_mut()
            .append_pair("center", &format!("{},{}", location.lat, location.lng))
            .append_pair("zoom", "18")
            .append_pair("size", "640x400")
            .append_pair("maptype", "satellite");
        url.to_string()
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, String)]) -> Result<T> {
        let mut url = self
            .base_url
            .join(endpoint)
            .map_err(|e| LeadForgeError::validation(format!("invalid endpoint {endpoint}: {e}")))?;
        url.query_pairs_mut()
            .extend_pairs(query)
            .append_pair("key", &self.api_key);

        // without_url keeps the key out of error messages and logs
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

        response
            .json::<T>()
            .await
            .map_err(|e| LeadForgeError::parse(format!("{SERVICE} {endpoint}: {}", e.without_url())))
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| LeadForgeError::config(format!("invalid places base URL {raw}: {e}")))
}

/// Map a legacy `status` field onto an error, logging a remediation hint.
fn check_status(status: &str, error_message: Option<&str>) -> Result<()> {
    let detail = error_message.unwrap_or(status).to_string();
    match status {
        "OK" | "ZERO_RESULTS" => Ok(()),
        "OVER_QUERY_LIMIT" | "OVER_DAILY_LIMIT" => {
            warn!(
                status,
                hint = "quota exhausted; check billing and quotas in the Google Cloud console",
                "places directory refused request"
            );
            Err(LeadForgeError::RateLimited {
                service: SERVICE.to_string(),
                message: detail,
            })
        }
        "REQUEST_DENIED" => {
            warn!(
                status,
                hint = "enable the Geocoding and Places APIs for this key and check its restrictions",
                "places directory refused request"
            );
            Err(LeadForgeError::upstream(SERVICE, None, format!("REQUEST_DENIED: {detail}")))
        }
        "NOT_FOUND" => Err(LeadForgeError::NotFound(detail)),
        other => Err(LeadForgeError::upstream(SERVICE, None, format!("{other}: {detail}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadforge_shared::ErrorKind;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) async fn client_for(server: &MockServer) -> PlacesClient {
        PlacesClient::new("test-key", 5)
            .unwrap()
            .with_base_url(&format!("{}/maps/api/", server.uri()))
            .unwrap()
    }

    #[tokio::test]
    async fn geocode_parses_components() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/api/geocode/json"))
            .and(query_param("address", "500 W 2nd St, Austin, TX"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "OK",
                "results": [{
                    "formatted_address": "500 W 2nd St, Austin, TX 78701, USA",
                    "geometry": {"location": {"lat": 30.2653, "lng": -97.7489}},
                    "address_components": [
                        {"long_name": "Austin", "short_name": "Austin", "types": ["locality", "political"]},
                        {"long_name": "Travis County", "short_name": "Travis County", "types": ["administrative_area_level_2"]},
                        {"long_name": "Texas", "short_name": "TX", "types": ["administrative_area_level_1"]}
                    ]
                }]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let result = client
            .geocode("500 W 2nd St, Austin, TX")
            .await
            .unwrap()
            .expect("a match");
        assert_eq!(result.component("locality"), Some("Austin"));
        assert_eq!(result.component_short("administrative_area_level_1"), Some("TX"));
        assert_eq!(result.component("administrative_area_level_2"), Some("Travis County"));
        assert!((result.geometry.location.lat - 30.2653).abs() < 1e-9);
    }

    #[tokio::test]
    async fn zero_results_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/api/geocode/json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ZERO_RESULTS", "results": []})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(client.geocode("nowhere").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn legacy_statuses_map_to_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/api/geocode/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "OVER_QUERY_LIMIT",
                "error_message": "You have exceeded your daily request quota"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/maps/api/place/textsearch/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "REQUEST_DENIED",
                "error_message": "This API project is not authorized to use this API."
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.geocode("x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);

        let err = client
            .text_search(&TextSearch {
                query: "landscaping in Austin, TX",
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
        assert!(err.to_string().contains("REQUEST_DENIED"));
    }

    #[tokio::test]
    async fn http_failure_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("backend down"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.place_details("abc", &["name"], None).await.unwrap_err();
        assert!(matches!(
            err,
            LeadForgeError::Upstream {
                status: Some(503),
                ..
            }
        ));
    }

    #[test]
    fn satellite_url_has_no_key() {
        let client = PlacesClient::new("secret", 5).unwrap();
        let url = client.satellite_image_url(LatLng {
            lat: 30.5,
            lng: -97.25,
        });
        assert!(url.starts_with("https://maps.googleapis.com/maps/api/staticmap?"));
        assert!(url.contains("maptype=satellite"));
        assert!(!url.contains("secret"));
    }
}
