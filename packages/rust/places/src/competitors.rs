//! Nearby competitor lookup for the Service Mapping stage.

use futures::future::join_all;
use leadforge_shared::{CompetitorRecord, CompetitorReview};
use tracing::{info, instrument, warn};

use crate::{LatLng, PlaceDetails, PlaceSummary, PlacesClient, TextSearch, sanitize_text};

/// Maximum competitors returned per search.
pub const MAX_COMPETITORS: usize = 5;

/// Reviews kept per competitor.
pub const MAX_REVIEWS_PER_COMPETITOR: usize = 2;

/// Location bias radius (~40 km).
pub const SEARCH_RADIUS_METERS: u32 = 40_000;

const DETAIL_FIELDS: &[&str] = &[
    "place_id",
    "name",
    "formatted_address",
    "rating",
    "user_ratings_total",
    "formatted_phone_number",
    "website",
    "opening_hours",
    "business_status",
    "reviews",
];

/// What and where to search.
#[derive(Debug, Clone)]
pub struct CompetitorQuery<'a> {
    pub service_category: &'a str,
    pub city: &'a str,
    pub state: &'a str,
    pub location: Option<LatLng>,
    /// The lead's own listing, excluded from results.
    pub exclude_place_id: Option<&'a str>,
}

impl CompetitorQuery<'_> {
    fn text(&self) -> String {
        format!("{} in {}, {}", self.service_category, self.city, self.state)
    }
}

/// Find up to [`MAX_COMPETITORS`] nearby providers with details.
///
/// Never fails: directory errors are logged and produce an empty list, and
/// a failed detail lookup drops only that competitor.
#[instrument(skip_all, fields(city = %query.city, state = %query.state))]
pub async fn search_competitors(client: &PlacesClient, query: &CompetitorQuery<'_>) -> Vec<CompetitorRecord> {
    let text = query.text();
    let search = TextSearch {
        query: &text,
        location: query.location,
        radius_meters: query.location.map(|_| SEARCH_RADIUS_METERS),
    };

    let hits = match client.text_search(&search).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!(error = %e, query = %text, "competitor search failed");
            return Vec::new();
        }
    };

    let candidates: Vec<PlaceSummary> = hits
        .into_iter()
        .filter(|hit| !hit.place_id.is_empty())
        .filter(|hit| query.exclude_place_id != Some(hit.place_id.as_str()))
        .take(MAX_COMPETITORS)
        .collect();

    let lookups = candidates.iter().map(|hit| async move {
        let details = client
            .place_details(&hit.place_id, DETAIL_FIELDS, Some("most_relevant"))
            .await;
        (hit, details)
    });

    let mut records = Vec::with_capacity(candidates.len());
    for (hit, details) in join_all(lookups).await {
        match details {
            Ok(details) => records.push(to_record(hit, details)),
            Err(e) => warn!(place_id = %hit.place_id, error = %e, "competitor details failed"),
        }
    }

    info!(found = records.len(), "competitor search complete");
    records
}

fn to_record(hit: &PlaceSummary, details: PlaceDetails) -> CompetitorRecord {
    let clean = |s: Option<String>| s.map(|v| sanitize_text(&v)).filter(|v| !v.is_empty());

    CompetitorRecord {
        name: sanitize_text(details.name.as_deref().unwrap_or(&hit.name)),
        address: clean(details.formatted_address.or_else(|| hit.formatted_address.clone())),
        place_id: hit.place_id.clone(),
        rating: details.rating.or(hit.rating),
        review_count: details.user_ratings_total.or(hit.user_ratings_total),
        phone: clean(details.formatted_phone_number),
        website: details.website,
        opening_hours: details
            .opening_hours
            .map(|h| h.weekday_text.iter().map(|t| sanitize_text(t)).collect())
            .unwrap_or_default(),
        business_status: details.business_status.or_else(|| hit.business_status.clone()),
        reviews: details
            .reviews
            .into_iter()
            .take(MAX_REVIEWS_PER_COMPETITOR)
            .map(|r| CompetitorReview {
                author: sanitize_text(&r.author_name),
                rating: r.rating,
                text: sanitize_text(&r.text),
                relative_time: clean(r.relative_time_description),
                time: r.time,
            })
            .collect(),
    }
}
