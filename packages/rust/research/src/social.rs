//! Social Presence Analyzer.
//!
//! Asks a search-backed model about each platform in turn, classifies the
//! answer, then has a second model synthesize sales insights from the
//! findings.

use std::sync::LazyLock;
use std::time::Duration;

use leadforge_llm::{ChatClient, ChatMessage, ChatOptions};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Default pause between platform lookups.
pub const DEFAULT_PLATFORM_DELAY: Duration = Duration::from_millis(1000);

/// Phrases that mark a lookup answer as "not found".
const NEGATIVE_PHRASES: &[&str] = &[
    "no results",
    "not found",
    "could not find",
    "couldn't find",
    "unable to find",
    "unable to locate",
    "could not locate",
    "no information",
    "no evidence",
    "no official",
    "no presence",
    "does not appear to have",
    "doesn't appear to have",
    "does not have a",
    "doesn't have a",
];

/// "there is no ... page/profile/listing" and close variants.
static NO_PROFILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"there (?:is|are) no (?:\w+ ){0,2}(?:page|pages|profile|profiles|listing|listings|account|accounts|presence)\b",
    )
    .expect("valid regex")
});

static LINKEDIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:[a-z]{2,3}\.)?linkedin\.com/(?:company|in|school)/[A-Za-z0-9_%.\-]+").expect("valid regex")
});
static FACEBOOK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:www\.|m\.)?facebook\.com/[A-Za-z0-9_.\-]+").expect("valid regex")
});
static YELP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://(?:www\.)?yelp\.com/biz/[A-Za-z0-9_%\-]+").expect("valid regex"));
static INSTAGRAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://(?:www\.)?instagram\.com/[A-Za-z0-9_.]+").expect("valid regex"));

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Linkedin,
    Facebook,
    Yelp,
    Instagram,
}

impl Platform {
    /// Lookup order.
    pub const ALL: [Platform; 4] = [Self::Linkedin, Self::Facebook, Self::Yelp, Self::Instagram];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Linkedin => "LinkedIn",
            Self::Facebook => "Facebook",
            Self::Yelp => "Yelp",
            Self::Instagram => "Instagram",
        }
    }

    fn url_pattern(&self) -> &'static Regex {
        match self {
            Self::Linkedin => &LINKEDIN_RE,
            Self::Facebook => &FACEBOOK_RE,
            Self::Yelp => &YELP_RE,
            Self::Instagram => &INSTAGRAM_RE,
        }
    }

    /// First profile URL for this platform in `text`.
    pub fn extract_url(&self, text: &str) -> Option<String> {
        self.url_pattern()
            .find(text)
            .map(|m| m.as_str().trim_end_matches(['.', ',', ')']).to_string())
    }
}

/// Result of one platform lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformPresence {
    pub platform: Platform,
    pub found: bool,
    pub url: Option<String>,
    pub summary: String,
    pub error: Option<String>,
}

/// Sales-facing synthesis of the platform findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialInsights {
    pub summary: String,
    pub strengths: Vec<String>,
    pub gaps: Vec<String>,
    pub opportunities: Vec<String>,
    pub recommended_talking_points: Vec<String>,
    /// Set when synthesis failed and this is the canned object.
    pub fallback: bool,
}

impl SocialInsights {
    /// Fixed insights used whenever synthesis is unavailable.
    pub fn fallback() -> Self {
        Self {
            summary: "Automated social insights are unavailable; review the platform findings directly.".into(),
            strengths: Vec::new(),
            gaps: Vec::new(),
            opportunities: vec!["Review each platform link manually before outreach.".into()],
            recommended_talking_points: vec![
                "Ask how they currently showcase their property and grounds online.".into(),
            ],
            fallback: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialPresenceReport {
    pub company: String,
    pub platforms: Vec<PlatformPresence>,
    /// Number of platforms with a presence (0 to 4).
    pub presence_score: u8,
    pub insights: SocialInsights,
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

pub struct SocialAnalyzer {
    lookup: ChatClient,
    synthesizer: Option<ChatClient>,
    delay: Duration,
}

impl SocialAnalyzer {
    /// `lookup` should be a search-backed model; `synthesizer` is optional
    /// and its absence yields fallback insights.
    pub fn new(lookup: ChatClient, synthesizer: Option<ChatClient>) -> Self {
        Self {
            lookup,
            synthesizer,
            delay: DEFAULT_PLATFORM_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Look up every platform, one at a time, then synthesize insights.
    #[instrument(skip_all, fields(company = %company))]
    pub async fn analyze(&self, company: &str, location: &str) -> SocialPresenceReport {
        let mut platforms = Vec::with_capacity(Platform::ALL.len());
        for (i, platform) in Platform::ALL.into_iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            platforms.push(self.lookup_platform(platform, company, location).await);
        }

        let presence_score = platforms.iter().filter(|p| p.found).count() as u8;
        let insights = self.synthesize(company, &platforms).await;

        info!(presence_score, fallback = insights.fallback, "social presence analyzed");
        SocialPresenceReport {
            company: company.to_string(),
            platforms,
            presence_score,
            insights,
        }
    }

    async fn lookup_platform(&self, platform: Platform, company: &str, location: &str) -> PlatformPresence {
        let prompt = format!(
            "Find the official {label} presence for the business \"{company}\" located in {location}. \
             Reply with the profile URL and two or three sentences on how active it is \
             (followers, posting frequency, ratings). If there is no such page, say so plainly.",
            label = platform.label(),
        );
        let messages = [
            ChatMessage::system("You are a precise research assistant. Only report pages you can verify."),
            ChatMessage::user(prompt),
        ];

        match self.lookup.complete(&messages, ChatOptions::default()).await {
            Ok(answer) => classify_answer(platform, &answer),
            Err(e) => {
                let error = if e.is_unauthorized() {
                    "Invalid Perplexity API key".to_string()
                } else {
                    e.to_string()
                };
                warn!(platform = platform.label(), error = %e, "platform lookup failed");
                PlatformPresence {
                    platform,
                    found: false,
                    url: None,
                    summary: String::new(),
                    error: Some(error),
                }
            }
        }
    }

    async fn synthesize(&self, company: &str, platforms: &[PlatformPresence]) -> SocialInsights {
        let Some(client) = &self.synthesizer else {
            return SocialInsights::fallback();
        };

        let findings = platforms
            .iter()
            .map(|p| {
                let status = if p.found { "present" } else { "not found" };
                format!(
                    "- {}: {status}{}. {}",
                    p.platform.label(),
                    p.url.as_deref().map(|u| format!(" ({u})")).unwrap_or_default(),
                    p.summary
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let messages = [
            ChatMessage::system(
                "You advise a commercial landscaping sales team. Respond with a JSON object with keys \
                 summary (string), strengths, gaps, opportunities, recommended_talking_points (arrays of strings).",
            ),
            ChatMessage::user(format!("Social presence findings for {company}:\n{findings}")),
        ];

        match client.complete_json::<SocialInsights>(&messages).await {
            Ok(mut insights) => {
                insights.fallback = false;
                insights
            }
            Err(e) => {
                warn!(error = %e, "social synthesis failed, using fallback");
                SocialInsights::fallback()
            }
        }
    }
}

/// Classify a lookup answer as found or not, extracting the profile URL.
pub fn classify_answer(platform: Platform, answer: &str) -> PlatformPresence {
    let lowered = answer.to_lowercase();
    let negative = NEGATIVE_PHRASES.iter().any(|p| lowered.contains(p)) || NO_PROFILE_RE.is_match(&lowered);
    PlatformPresence {
        platform,
        found: !negative,
        url: if negative { None } else { platform.extract_url(answer) },
        summary: answer.trim().to_string(),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reply(content: &str) -> serde_json::Value {
        json!({"choices": [{"message": {"content": content}}]})
    }

    #[test]
    fn there_is_no_only_negates_a_missing_profile() {
        let p = classify_answer(
            Platform::Facebook,
            "There is no doubt https://www.facebook.com/acmelawn is their official page.",
        );
        assert!(p.found);
        assert_eq!(p.url.as_deref(), Some("https://www.facebook.com/acmelawn"));

        let p = classify_answer(Platform::Facebook, "There is no official Facebook page for Acme Lawn.");
        assert!(!p.found);
        let p = classify_answer(Platform::Instagram, "there are no instagram accounts matching that name");
        assert!(!p.found);
    }

    #[test]
    fn negative_phrase_means_absent() {
        let p = classify_answer(
            Platform::Yelp,
            "I could not find a Yelp listing for this business. https://www.yelp.com/biz/other",
        );
        assert!(!p.found);
        assert!(p.url.is_none());
    }

    #[test]
    fn extracts_platform_url() {
        let p = classify_answer(
            Platform::Linkedin,
            "Their page is https://www.linkedin.com/company/lakeway-cc. They post weekly.",
        );
        assert!(p.found);
        assert_eq!(p.url.as_deref(), Some("https://www.linkedin.com/company/lakeway-cc"));
        assert_eq!(
            Platform::Instagram.extract_url("see https://instagram.com/lakeway.cc, 2k followers"),
            Some("https://instagram.com/lakeway.cc".into())
        );
    }

    #[tokio::test]
    async fn invalid_key_reported_per_platform() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let lookup = ChatClient::perplexity("bad", "sonar", 5).unwrap().with_base_url(server.uri());
        let analyzer = SocialAnalyzer::new(lookup, None).with_delay(Duration::ZERO);
        let report = analyzer.analyze("Acme", "Austin, TX").await;

        assert_eq!(report.presence_score, 0);
        assert_eq!(report.platforms.len(), 4);
        assert!(
            report
                .platforms
                .iter()
                .all(|p| p.error.as_deref() == Some("Invalid Perplexity API key"))
        );
        assert!(report.insights.fallback);
    }

    #[tokio::test]
    async fn presence_score_counts_found_platforms() {
        let lookup_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("LinkedIn"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("https://www.linkedin.com/company/acme - active")))
            .mount(&lookup_server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("Facebook"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("https://facebook.com/acmeco has 3k likes")))
            .mount(&lookup_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("No results for this business.")))
            .mount(&lookup_server)
            .await;

        let synth_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply(
                r#"{"summary": "Strong on LinkedIn", "strengths": ["Active page"], "gaps": ["No Yelp"], "opportunities": [], "recommended_talking_points": ["Reviews"]}"#,
            )))
            .mount(&synth_server)
            .await;

        let lookup = ChatClient::perplexity("k", "sonar", 5).unwrap().with_base_url(lookup_server.uri());
        let synth = ChatClient::openai("k", "gpt-4o-mini", 5).unwrap().with_base_url(synth_server.uri());
        let analyzer = SocialAnalyzer::new(lookup, Some(synth)).with_delay(Duration::ZERO);
        let report = analyzer.analyze("Acme", "Austin, TX").await;

        assert_eq!(report.presence_score, 2);
        assert_eq!(report.insights.summary, "Strong on LinkedIn");
        assert!(!report.insights.fallback);
    }

    #[tokio::test]
    async fn malformed_synthesis_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("not json at all")))
            .mount(&server)
            .await;

        let lookup = ChatClient::perplexity("k", "sonar", 5).unwrap().with_base_url(server.uri());
        let synth = ChatClient::openai("k", "gpt-4o-mini", 5).unwrap().with_base_url(server.uri());
        let report = SocialAnalyzer::new(lookup, Some(synth))
            .with_delay(Duration::ZERO)
            .analyze("Acme", "Austin, TX")
            .await;
        assert_eq!(report.insights, SocialInsights::fallback());
    }
}
