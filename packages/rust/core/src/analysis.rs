//! Provider wiring and the production [`StageExecutor`].
//!
//! - Geo Enrichment: geocode, derive locality, satellite image URL, and a
//!   best-effort lookup of the lead's own places listing.
//! - Property Analysis: one JSON-mode model call over the geo context.
//! - Service Mapping: competitor search, then one JSON-mode model call.
//!   Local providers always come from the competitor search.

use async_trait::async_trait;
use leadforge_llm::ChatClient;
use leadforge_llm::ChatMessage;
use leadforge_places::{CompetitorQuery, LatLng, PlacesClient, TextSearch, search_competitors};
use leadforge_research::WebSearchClient;
use leadforge_shared::{
    AppConfig, BusinessIntelligence, CompetitorRecord, GeoEnrichment, Lead, LeadForgeError, PropertyAnalysis,
    Provider, ProvidersConfig, Result, ServiceMapping, Stage,
};
use tracing::{debug, info, instrument, warn};

use crate::cancel::CancelFlag;
use crate::contacts::ApolloClient;
use crate::orchestrator::{StageExecutor, StageOutput};

/// Radius for matching the lead's own listing around its geocoded point.
const OWN_LISTING_RADIUS_METERS: u32 = 500;

const OWN_LISTING_FIELDS: &[&str] = &[
    "place_id",
    "name",
    "rating",
    "user_ratings_total",
    "website",
    "formatted_phone_number",
    "types",
    "business_status",
];

// ---------------------------------------------------------------------------
// Provider clients
// ---------------------------------------------------------------------------

/// Clients for every configured provider. A provider whose key is missing
/// is `None`; operations that need it fail with a config error naming the
/// env var to set.
#[derive(Debug, Clone, Default)]
pub struct ProviderClients {
    pub places: Option<PlacesClient>,
    pub openai: Option<ChatClient>,
    pub perplexity: Option<ChatClient>,
    pub search: Option<WebSearchClient>,
    pub apollo: Option<ApolloClient>,
    providers: ProvidersConfig,
}

impl ProviderClients {
    /// Build clients from config, reading keys from the environment.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let providers = &config.providers;
        let timeout = providers.request_timeout_secs;

        let google_key = providers.api_key(Provider::GoogleMaps);
        let places = google_key
            .as_deref()
            .map(|key| PlacesClient::new(key, timeout))
            .transpose()?;
        let search = match (google_key.as_deref(), providers.search_engine_id()) {
            (Some(key), Some(cx)) => Some(WebSearchClient::new(key, cx, timeout)?),
            _ => None,
        };
        let openai = providers
            .api_key(Provider::OpenAi)
            .map(|key| ChatClient::openai(key, &providers.openai_model, timeout))
            .transpose()?;
        let perplexity = providers
            .api_key(Provider::Perplexity)
            .map(|key| ChatClient::perplexity(key, &providers.perplexity_model, timeout))
            .transpose()?;
        let apollo = providers
            .api_key(Provider::Apollo)
            .map(|key| ApolloClient::new(key, timeout))
            .transpose()?;

        debug!(
            places = places.is_some(),
            search = search.is_some(),
            openai = openai.is_some(),
            perplexity = perplexity.is_some(),
            apollo = apollo.is_some(),
            "provider clients built"
        );

        Ok(Self {
            places,
            openai,
            perplexity,
            search,
            apollo,
            providers: providers.clone(),
        })
    }

    /// No clients at all; env var names come from `providers`.
    pub fn unconfigured(providers: ProvidersConfig) -> Self {
        Self {
            providers,
            ..Default::default()
        }
    }

    fn missing(&self, provider: Provider) -> LeadForgeError {
        LeadForgeError::config(format!(
            "{} API key not found. Set the {} environment variable.",
            provider.label(),
            self.providers.env_var(provider)
        ))
    }

    pub fn require_places(&self) -> Result<&PlacesClient> {
        self.places.as_ref().ok_or_else(|| self.missing(Provider::GoogleMaps))
    }

    pub fn require_openai(&self) -> Result<&ChatClient> {
        self.openai.as_ref().ok_or_else(|| self.missing(Provider::OpenAi))
    }

    pub fn require_perplexity(&self) -> Result<&ChatClient> {
        self.perplexity.as_ref().ok_or_else(|| self.missing(Provider::Perplexity))
    }

    pub fn require_apollo(&self) -> Result<&ApolloClient> {
        self.apollo.as_ref().ok_or_else(|| self.missing(Provider::Apollo))
    }
}

// ---------------------------------------------------------------------------
// Stage runner
// ---------------------------------------------------------------------------

/// Production executor backed by the configured providers.
pub struct StageRunner<'a> {
    clients: &'a ProviderClients,
    service_category: &'a str,
}

impl<'a> StageRunner<'a> {
    pub fn new(clients: &'a ProviderClients, service_category: &'a str) -> Self {
        Self {
            clients,
            service_category,
        }
    }

    #[instrument(skip_all, fields(lead_id = %lead.id))]
    async fn geo_enrichment(&self, lead: &Lead, cancel: &CancelFlag) -> Result<GeoEnrichment> {
        let places = self.clients.require_places()?;
        let address = lead.address_line();

        cancel.check()?;
        let hit = places
            .geocode(&address)
            .await?
            .ok_or_else(|| LeadForgeError::NotFound(format!("no geocoding match for '{address}'")))?;

        let location = hit.geometry.location;
        let city = hit
            .component("locality")
            .or_else(|| hit.component("postal_town"))
            .map(str::to_string)
            .or_else(|| lead.city.clone());
        let state = hit
            .component_short("administrative_area_level_1")
            .map(str::to_string)
            .or_else(|| lead.state.clone());
        let region = hit.component("administrative_area_level_2").map(str::to_string);

        let business_intelligence = own_listing(places, lead, location, cancel).await?;

        info!(lat = location.lat, lng = location.lng, "geocoded");
        Ok(GeoEnrichment {
            lat: location.lat,
            lng: location.lng,
            formatted_address: Some(hit.formatted_address.clone()).filter(|a| !a.is_empty()),
            city,
            state,
            region,
            image_url: Some(places.satellite_image_url(location)),
            business_intelligence,
        })
    }

    #[instrument(skip_all, fields(lead_id = %lead.id))]
    async fn property_analysis(&self, lead: &Lead, cancel: &CancelFlag) -> Result<PropertyAnalysis> {
        let openai = self.clients.require_openai()?;
        let geo = lead.geo_enrichment.as_ref().ok_or_else(|| LeadForgeError::StageBlocked {
            stage: Stage::PropertyAnalysis,
            reason: "Geo Enrichment has not completed".into(),
        })?;

        let messages = [
            ChatMessage::system(
                "You are a commercial property analyst. Reply with a single JSON object and nothing else.",
            ),
            ChatMessage::user(property_prompt(lead, geo)),
        ];

        cancel.check()?;
        let analysis: PropertyAnalysis = openai.complete_json(&messages).await?;
        if analysis.property_type.trim().is_empty() {
            return Err(LeadForgeError::parse("property analysis reply has no property_type"));
        }
        info!(property_type = %analysis.property_type, "property analyzed");
        Ok(analysis)
    }

    #[instrument(skip_all, fields(lead_id = %lead.id))]
    async fn service_mapping(&self, lead: &Lead, cancel: &CancelFlag) -> Result<ServiceMapping> {
        let openai = self.clients.require_openai()?;
        let property = lead.property_analysis.as_ref().ok_or_else(|| LeadForgeError::StageBlocked {
            stage: Stage::ServiceMapping,
            reason: "Property Analysis has not completed".into(),
        })?;

        cancel.check()?;
        let competitors = self.competitors_for(lead).await;

        let messages = [
            ChatMessage::system(
                "You are a sales strategist for a commercial services company. \
                 Reply with a single JSON object and nothing else.",
            ),
            ChatMessage::user(service_prompt(lead, property, &competitors, self.service_category)),
        ];

        cancel.check()?;
        let mut mapping: ServiceMapping = openai.complete_json(&messages).await?;
        mapping.competition_assessment.local_providers = competitors;
        if mapping.context.property_type.is_none() {
            mapping.context.property_type = Some(property.property_type.clone());
        }
        info!(
            services = mapping.recommended_services.len(),
            competitors = mapping.competition_assessment.local_providers.len(),
            "service mapping complete"
        );
        Ok(mapping)
    }

    /// Competitors near the lead. Empty when places is unconfigured or the
    /// lead has no geocoded locality.
    pub async fn competitors_for(&self, lead: &Lead) -> Vec<CompetitorRecord> {
        let Some(places) = self.clients.places.as_ref() else {
            warn!("places client not configured, skipping competitor search");
            return Vec::new();
        };
        let geo = lead.geo_enrichment.as_ref();
        let city = geo.and_then(|g| g.city.as_deref()).or(lead.city.as_deref()).unwrap_or("");
        let state = geo.and_then(|g| g.state.as_deref()).or(lead.state.as_deref()).unwrap_or("");
        if city.trim().is_empty() {
            warn!("lead has no city, skipping competitor search");
            return Vec::new();
        }

        let query = CompetitorQuery {
            service_category: self.service_category,
            city,
            state,
            location: geo.map(|g| LatLng { lat: g.lat, lng: g.lng }),
            exclude_place_id: geo
                .and_then(|g| g.business_intelligence.as_ref())
                .and_then(|b| b.place_id.as_deref()),
        };
        search_competitors(places, &query).await
    }
}

#[async_trait]
impl StageExecutor for StageRunner<'_> {
    async fn execute(&self, stage: Stage, lead: &Lead, cancel: &CancelFlag) -> Result<StageOutput> {
        match stage {
            Stage::GeoEnrichment => self.geo_enrichment(lead, cancel).await.map(StageOutput::Geo),
            Stage::PropertyAnalysis => self.property_analysis(lead, cancel).await.map(StageOutput::Property),
            Stage::ServiceMapping => self.service_mapping(lead, cancel).await.map(StageOutput::Service),
        }
    }
}

/// The lead's own listing near its geocoded point.
///
/// Best-effort: provider errors are logged and yield `None`. Cancellation
/// still propagates.
async fn own_listing(
    places: &PlacesClient,
    lead: &Lead,
    location: LatLng,
    cancel: &CancelFlag,
) -> Result<Option<BusinessIntelligence>> {
    let query = lead.display_company().to_string();
    let search = TextSearch {
        query: &query,
        location: Some(location),
        radius_meters: Some(OWN_LISTING_RADIUS_METERS),
    };

    cancel.check()?;
    let hit = match places.text_search(&search).await {
        Ok(hits) => hits.into_iter().find(|h| !h.place_id.is_empty()),
        Err(e) => {
            warn!(error = %e, "business listing search failed");
            return Ok(None);
        }
    };
    let Some(hit) = hit else {
        return Ok(None);
    };

    let mut intel = BusinessIntelligence {
        place_id: Some(hit.place_id.clone()),
        name: Some(hit.name.clone()),
        rating: hit.rating,
        review_count: hit.user_ratings_total,
        types: hit.types.clone(),
        business_status: hit.business_status.clone(),
        ..Default::default()
    };

    cancel.check()?;
    match places.place_details(&hit.place_id, OWN_LISTING_FIELDS, None).await {
        Ok(details) => {
            intel.website = details.website;
            intel.phone = details.formatted_phone_number;
            intel.rating = details.rating.or(intel.rating);
            intel.review_count = details.user_ratings_total.or(intel.review_count);
            if !details.types.is_empty() {
                intel.types = details.types;
            }
        }
        Err(e) => warn!(place_id = %hit.place_id, error = %e, "business listing details failed"),
    }
    Ok(Some(intel))
}

fn property_prompt(lead: &Lead, geo: &GeoEnrichment) -> String {
    let address = geo
        .formatted_address
        .clone()
        .unwrap_or_else(|| lead.address_line());
    let listing = geo
        .business_intelligence
        .as_ref()
        .map(|b| {
            format!(
                "Places listing: {} (types: {}; rating: {})",
                b.name.as_deref().unwrap_or("unknown"),
                if b.types.is_empty() { "none".to_string() } else { b.types.join(", ") },
                b.rating.map(|r| format!("{r:.1}")).unwrap_or_else(|| "n/a".into()),
            )
        })
        .unwrap_or_else(|| "Places listing: none found".to_string());

    format!(
        "Analyze the property for this business.\n\
         Company: {company}\n\
         Industry: {industry}\n\
         Address: {address}\n\
         Coordinates: {lat:.5}, {lng:.5}\n\
         Region: {region}\n\
         {listing}\n\
         Satellite image: {image}\n\n\
         Return JSON with keys:\n\
         \"property_type\" (snake_case, e.g. golf_course, office_park, apartment_complex, hotel_resort),\n\
         \"quality\" (premium, standard, or basic, with a short qualifier),\n\
         \"condition\" (short description of the grounds and exterior),\n\
         \"lot_size_acres\" (number, best estimate),\n\
         \"notes\" (one paragraph on features relevant to grounds maintenance).",
        company = lead.display_company(),
        industry = lead.industry.as_deref().unwrap_or("unknown"),
        lat = geo.lat,
        lng = geo.lng,
        region = geo.region.as_deref().unwrap_or("unknown"),
        image = geo.image_url.as_deref().unwrap_or("n/a"),
    )
}

fn service_prompt(
    lead: &Lead,
    property: &PropertyAnalysis,
    competitors: &[CompetitorRecord],
    service_category: &str,
) -> String {
    let competitor_lines = if competitors.is_empty() {
        "none found".to_string()
    } else {
        competitors
            .iter()
            .map(|c| {
                format!(
                    "- {} (rating {}, {} reviews)",
                    c.name,
                    c.rating.map(|r| format!("{r:.1}")).unwrap_or_else(|| "n/a".into()),
                    c.review_count.unwrap_or(0)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "We sell {service_category} services. Map our services to this prospect.\n\
         Company: {company}\n\
         Contact: {name}, {title}\n\
         Property type: {property_type}\n\
         Quality: {quality}\n\
         Condition: {condition}\n\
         Lot size (acres): {acres}\n\
         Notes: {notes}\n\
         Nearby competitors:\n{competitor_lines}\n\n\
         Return JSON with keys:\n\
         \"executive_summary\" (string),\n\
         \"context\" {{\"opportunity_level\": \"High\"|\"Medium\"|\"Low\", \"service_fit\": string, \"property_type\": string}},\n\
         \"recommended_services\" [{{\"name\", \"rationale\", \"priority\"}}],\n\
         \"competition_assessment\" {{\"market_saturation\": string}},\n\
         \"irrigation_intelligence\" (object, optional),\n\
         \"actionable_insights\" {{\"talking_points\": [string], \"next_steps\": [string], \"objections\": [string]}},\n\
         \"cost_time_analysis\" {{\"estimated_annual_value\": string like \"$45,000 - $60,000 per year\", \"implementation_timeline\": string}}.",
        company = lead.display_company(),
        name = lead.name,
        title = if lead.title.is_empty() { "unknown title" } else { lead.title.as_str() },
        property_type = property.property_type,
        quality = property.quality,
        condition = property.condition,
        acres = property
            .lot_size_acres
            .map(|a| format!("{a:.1}"))
            .unwrap_or_else(|| "unknown".into()),
        notes = property.notes.as_deref().unwrap_or("none"),
    )
}
