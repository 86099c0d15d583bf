//! Research Aggregator: web mentions, extended place details, review themes.
//!
//! Every sub-fetch is independent and best-effort. A missing credential or
//! a failed call leaves that section empty and adds a note; the bundle is
//! always returned.

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use leadforge_places::{PlaceDetails, PlaceReview, PlacesClient, TextSearch, sanitize_text};
use leadforge_shared::CompetitorReview;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::search::{SearchHit, WebSearchClient};

/// Reviews kept from the extended place lookup.
pub const MAX_PLACE_REVIEWS: usize = 15;

/// Reviews newer than this count as recent.
pub const RECENT_REVIEW_DAYS: i64 = 90;

const HITS_PER_CATEGORY: u8 = 5;

const PLACE_FIELDS: &[&str] = &[
    "place_id",
    "name",
    "formatted_address",
    "formatted_phone_number",
    "website",
    "rating",
    "user_ratings_total",
    "editorial_summary",
    "reviews",
];

const OUTDOOR_KEYWORDS: &[&str] = &[
    "patio", "outdoor", "outside", "terrace", "courtyard", "deck", "garden", "pool", "rooftop",
];

const APPEARANCE_KEYWORDS: &[&str] = &[
    "landscap", "lawn", "grounds", "curb appeal", "flowers", "trees", "beautiful", "well kept",
    "well-kept", "manicured", "overgrown", "weeds", "maintained", "grass",
];

/// Web-search category and the query suffix that targets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionCategory {
    News,
    Events,
    Awards,
    Social,
}

impl MentionCategory {
    pub const ALL: [MentionCategory; 4] = [Self::News, Self::Events, Self::Awards, Self::Social];

    fn query_suffix(&self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Events => "events",
            Self::Awards => "award OR recognition",
            Self::Social => "facebook OR instagram OR linkedin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebMention {
    pub category: MentionCategory,
    pub title: String,
    pub link: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaceSnapshot {
    pub place_id: Option<String>,
    pub name: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub editorial_summary: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub reviews: Vec<CompetitorReview>,
}

/// Reviews bucketed by what they talk about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewThemes {
    pub outdoor: Vec<CompetitorReview>,
    pub appearance: Vec<CompetitorReview>,
    pub recent_positive: Vec<CompetitorReview>,
    pub recent_negative: Vec<CompetitorReview>,
}

/// Everything the aggregator could find about one business.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchBundle {
    pub company: String,
    pub web_mentions: Vec<WebMention>,
    pub place: Option<PlaceSnapshot>,
    pub review_themes: ReviewThemes,
    /// Sections that were skipped or failed, in plain words.
    pub notes: Vec<String>,
}

/// Who to research.
#[derive(Debug, Clone, Default)]
pub struct ResearchTarget<'a> {
    pub company: &'a str,
    pub city: Option<&'a str>,
    pub state: Option<&'a str>,
    /// Known directory listing; looked up by name when absent.
    pub place_id: Option<&'a str>,
}

impl ResearchTarget<'_> {
    fn locality(&self) -> String {
        [self.city, self.state]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Research fan-out over whichever providers are configured.
#[derive(Debug, Clone, Default)]
pub struct ResearchAggregator {
    places: Option<PlacesClient>,
    search: Option<WebSearchClient>,
}

impl ResearchAggregator {
    pub fn new(places: Option<PlacesClient>, search: Option<WebSearchClient>) -> Self {
        Self { places, search }
    }

    /// Gather research for `target`. Never fails.
    #[instrument(skip_all, fields(company = %target.company))]
    pub async fn gather(&self, target: &ResearchTarget<'_>, now: DateTime<Utc>) -> ResearchBundle {
        let mut bundle = ResearchBundle {
            company: target.company.to_string(),
            ..Default::default()
        };

        let (mentions, place) = tokio::join!(self.web_mentions(target), self.place_snapshot(target));

        match mentions {
            Ok(found) => bundle.web_mentions = found,
            Err(note) => bundle.notes.push(note),
        }
        match place {
            Ok(Some(snapshot)) => {
                bundle.review_themes = classify_reviews(&snapshot.reviews, now);
                bundle.place = Some(snapshot);
            }
            Ok(None) => bundle.notes.push("no directory listing matched".into()),
            Err(note) => bundle.notes.push(note),
        }

        info!(
            mentions = bundle.web_mentions.len(),
            has_place = bundle.place.is_some(),
            notes = bundle.notes.len(),
            "research gathered"
        );
        bundle
    }

    async fn web_mentions(&self, target: &ResearchTarget<'_>) -> Result<Vec<WebMention>, String> {
        let Some(search) = &self.search else {
            // Custom Search shares the Maps key, so no places client means no key.
            let missing = if self.places.is_none() {
                "Google Maps key not configured"
            } else {
                "no search engine id configured"
            };
            info!(missing, "custom search not configured, skipping");
            return Err(format!("web search skipped: {missing}"));
        };

        let locality = target.locality();
        let queries = MentionCategory::ALL.map(|category| {
            let query = format!("\"{}\" {} {}", target.company, locality, category.query_suffix());
            async move { (category, search.search(query.trim(), HITS_PER_CATEGORY).await) }
        });

        let mut mentions = Vec::new();
        let mut failures = 0usize;
        for (category, result) in join_all(queries).await {
            match result {
                Ok(hits) => mentions.extend(hits.into_iter().map(|hit| to_mention(category, hit))),
                Err(e) => {
                    failures += 1;
                    warn!(?category, error = %e, "web search failed");
                }
            }
        }

        if failures == MentionCategory::ALL.len() {
            return Err("web search failed for every category".into());
        }
        Ok(mentions)
    }

    async fn place_snapshot(&self, target: &ResearchTarget<'_>) -> Result<Option<PlaceSnapshot>, String> {
        let Some(places) = &self.places else {
            return Err("place details skipped: Google Maps key not configured".into());
        };

        let place_id = match target.place_id {
            Some(id) => id.to_string(),
            None => {
                let query = format!("{} {}", target.company, target.locality());
                let search = TextSearch {
                    query: query.trim(),
                    ..Default::default()
                };
                match places.text_search(&search).await {
                    Ok(hits) => match hits.into_iter().next() {
                        Some(hit) => hit.place_id,
                        None => return Ok(None),
                    },
                    Err(e) => {
                        warn!(error = %e, "place lookup failed");
                        return Err(format!("place lookup failed: {e}"));
                    }
                }
            }
        };

        match places.place_details(&place_id, PLACE_FIELDS, Some("newest")).await {
            Ok(details) => Ok(Some(to_snapshot(place_id, details))),
            Err(e) => {
                warn!(%place_id, error = %e, "place details failed");
                Err(format!("place details failed: {e}"))
            }
        }
    }
}

fn to_mention(category: MentionCategory, hit: SearchHit) -> WebMention {
    WebMention {
        category,
        title: sanitize_text(&hit.title),
        link: hit.link,
        snippet: sanitize_text(&hit.snippet),
    }
}

fn to_snapshot(place_id: String, details: PlaceDetails) -> PlaceSnapshot {
    PlaceSnapshot {
        place_id: Some(place_id),
        name: details.name,
        website: details.website,
        phone: details.formatted_phone_number,
        editorial_summary: details
            .editorial_summary
            .and_then(|s| s.overview)
            .map(|s| sanitize_text(&s)),
        rating: details.rating,
        review_count: details.user_ratings_total,
        reviews: details
            .reviews
            .into_iter()
            .take(MAX_PLACE_REVIEWS)
            .map(to_review)
            .collect(),
    }
}

fn to_review(review: PlaceReview) -> CompetitorReview {
    CompetitorReview {
        author: sanitize_text(&review.author_name),
        rating: review.rating,
        text: sanitize_text(&review.text),
        relative_time: review.relative_time_description,
        time: review.time,
    }
}

/// Bucket reviews into themes. A review may land in several buckets.
pub fn classify_reviews(reviews: &[CompetitorReview], now: DateTime<Utc>) -> ReviewThemes {
    let cutoff = now - Duration::days(RECENT_REVIEW_DAYS);
    let mut themes = ReviewThemes::default();

    for review in reviews {
        let text = review.text.to_lowercase();
        if OUTDOOR_KEYWORDS.iter().any(|k| text.contains(k)) {
            themes.outdoor.push(review.clone());
        }
        if APPEARANCE_KEYWORDS.iter().any(|k| text.contains(k)) {
            themes.appearance.push(review.clone());
        }

        let recent = review
            .time
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .is_some_and(|at| at >= cutoff);
        if !recent {
            continue;
        }
        match review.rating {
            Some(r) if r >= 4.0 => themes.recent_positive.push(review.clone()),
            Some(r) if r <= 3.0 => themes.recent_negative.push(review.clone()),
            _ => {}
        }
    }
    themes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn review(text: &str, rating: f64, days_ago: i64, now: DateTime<Utc>) -> CompetitorReview {
        CompetitorReview {
            author: "Guest".into(),
            rating: Some(rating),
            text: text.into(),
            relative_time: None,
            time: Some((now - Duration::days(days_ago)).timestamp()),
        }
    }

    #[test]
    fn themes_bucket_by_keyword_and_recency() {
        let now = Utc::now();
        let reviews = vec![
            review("Loved the patio seating", 5.0, 10, now),
            review("Lawn looked overgrown and full of weeds", 2.0, 30, now),
            review("Beautiful grounds", 5.0, 400, now),
            review("Food was fine", 3.5, 5, now),
        ];
        let themes = classify_reviews(&reviews, now);
        assert_eq!(themes.outdoor.len(), 1);
        assert_eq!(themes.appearance.len(), 2);
        assert_eq!(themes.recent_positive.len(), 1);
        assert_eq!(themes.recent_negative.len(), 1);
        assert_eq!(themes.recent_negative[0].rating, Some(2.0));
    }

    #[tokio::test]
    async fn search_skipped_without_google_key() {
        let aggregator = ResearchAggregator::new(None, None);
        let target = ResearchTarget {
            company: "Lakeway Country Club",
            city: Some("Austin"),
            ..Default::default()
        };
        let bundle = aggregator.gather(&target, Utc::now()).await;
        assert!(bundle.web_mentions.is_empty());
        assert!(bundle.place.is_none());
        assert!(bundle.notes.iter().any(|n| n == "web search skipped: Google Maps key not configured"));
        assert!(!bundle.notes.iter().any(|n| n.contains("search engine id")));
    }

    #[tokio::test]
    async fn search_skipped_without_engine_id() {
        // Place lookups hit an empty mock server and fail; only the search note matters here.
        let server = MockServer::start().await;
        let places = PlacesClient::new("k", 5)
            .unwrap()
            .with_base_url(&format!("{}/maps/api/", server.uri()))
            .unwrap();
        let aggregator = ResearchAggregator::new(Some(places), None);
        let target = ResearchTarget {
            company: "Lakeway Country Club",
            city: Some("Austin"),
            ..Default::default()
        };
        let bundle = aggregator.gather(&target, Utc::now()).await;
        assert!(bundle.web_mentions.is_empty());
        assert!(bundle.notes.iter().any(|n| n == "web search skipped: no search engine id configured"));
    }

    #[tokio::test]
    async fn gathers_mentions_and_place_details() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customsearch/v1"))
            .and(query_param("cx", "engine-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{"title": "Club wins \u{201C}Best Greens\u{201D}", "link": "https://news.example/a", "snippet": "..."}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/maps/api/place/details/json"))
            .and(query_param("place_id", "known-place"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "OK",
                "result": {
                    "website": "https://lakeway.example",
                    "editorial_summary": {"overview": "Private club with golf course"},
                    "reviews": [{"author_name": "Kim", "rating": 5, "text": "Gorgeous patio", "time": Utc::now().timestamp()}]
                }
            })))
            .mount(&server)
            .await;

        let places = PlacesClient::new("k", 5)
            .unwrap()
            .with_base_url(&format!("{}/maps/api/", server.uri()))
            .unwrap();
        let search = WebSearchClient::new("k", "engine-1", 5)
            .unwrap()
            .with_endpoint(format!("{}/customsearch/v1", server.uri()));
        let aggregator = ResearchAggregator::new(Some(places), Some(search));

        let target = ResearchTarget {
            company: "Lakeway Country Club",
            city: Some("Austin"),
            state: Some("TX"),
            place_id: Some("known-place"),
        };
        let bundle = aggregator.gather(&target, Utc::now()).await;

        assert_eq!(bundle.web_mentions.len(), MentionCategory::ALL.len());
        assert_eq!(bundle.web_mentions[0].title, "Club wins 'Best Greens'");
        let place = bundle.place.expect("place snapshot");
        assert_eq!(place.editorial_summary.as_deref(), Some("Private club with golf course"));
        assert_eq!(bundle.review_themes.outdoor.len(), 1);
        assert_eq!(bundle.review_themes.recent_positive.len(), 1);
        assert!(bundle.notes.is_empty());
    }

    #[tokio::test]
    async fn failed_place_details_is_noted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let places = PlacesClient::new("k", 5)
            .unwrap()
            .with_base_url(&format!("{}/maps/api/", server.uri()))
            .unwrap();
        let aggregator = ResearchAggregator::new(Some(places), None);
        let target = ResearchTarget {
            company: "Acme",
            place_id: Some("p1"),
            ..Default::default()
        };
        let bundle = aggregator.gather(&target, Utc::now()).await;
        assert!(bundle.place.is_none());
        assert_eq!(bundle.notes.len(), 2);
    }
}
