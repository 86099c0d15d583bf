//! Core domain types for LeadForge leads, activities, and campaigns.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::payloads::{GeoEnrichment, PropertyAnalysis, ServiceMapping};

/// Generate a new time-sortable identifier (UUID v7).
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Deserialize an enum from a string, falling back to its default on
/// `null`, a missing value, or an unrecognised string.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()).unwrap_or_default())
}

fn lenient_opt<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("unknown {} '{other}'", stringify!($name))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Lead enums
// ---------------------------------------------------------------------------

string_enum! {
    /// Contact-data enrichment progress.
    EnrichmentStatus {
        Discovered => "discovered",
        Enriched => "enriched",
        Complete => "complete",
    }
}

impl Default for EnrichmentStatus {
    fn default() -> Self {
        Self::Discovered
    }
}

impl EnrichmentStatus {
    /// Whether contact enrichment has run for the lead.
    pub fn is_enriched(&self) -> bool {
        matches!(self, Self::Enriched | Self::Complete)
    }
}

string_enum! {
    /// Pipeline status of a lead.
    LeadStatus {
        New => "new",
        Contacted => "contacted",
        Qualified => "qualified",
        Proposal => "proposal",
        Won => "won",
        Lost => "lost",
    }
}

impl Default for LeadStatus {
    fn default() -> Self {
        Self::New
    }
}

string_enum! {
    /// Coarse lead temperature, independent of pipeline status.
    QualificationLevel {
        Cold => "cold",
        Warm => "warm",
        Hot => "hot",
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// A prospect/company record with its nested enrichment payloads.
///
/// Every field has a default so partially populated records (older rows,
/// hand-edited JSON) still load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Lead {
    pub id: String,
    pub name: String,
    pub title: String,
    pub company: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub linkedin_url: Option<String>,
    pub website: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub industry: Option<String>,
    pub employee_count: Option<i64>,
    pub apollo_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub enrichment_status: EnrichmentStatus,
    #[serde(deserialize_with = "lenient")]
    pub status: LeadStatus,
    #[serde(deserialize_with = "lenient_opt")]
    pub qualification_level: Option<QualificationLevel>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub enriched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_enrichment: Option<GeoEnrichment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_analysis: Option<PropertyAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_mapping: Option<ServiceMapping>,
}

impl Lead {
    /// Create a freshly discovered lead.
    pub fn new(name: impl Into<String>, company: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            name: name.into(),
            company: company.into(),
            created_at: Some(now),
            updated_at: Some(now),
            ..Default::default()
        }
    }

    /// True when the lead carries enough address data to geocode.
    pub fn has_address(&self) -> bool {
        non_blank(self.street.as_deref()) || non_blank(self.city.as_deref())
    }

    /// Single-line address suitable for a geocoder query.
    pub fn address_line(&self) -> String {
        [
            self.street.as_deref(),
            self.city.as_deref(),
            self.state.as_deref(),
            self.postal_code.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }

    /// Display name for prompts: company if present, else the person.
    pub fn display_company(&self) -> &str {
        if self.company.trim().is_empty() {
            &self.name
        } else {
            &self.company
        }
    }
}

fn non_blank(value: Option<&str>) -> bool {
    value.is_some_and(|s| !s.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One of the three gated enrichment stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    GeoEnrichment,
    PropertyAnalysis,
    ServiceMapping,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 3] = [
        Stage::GeoEnrichment,
        Stage::PropertyAnalysis,
        Stage::ServiceMapping,
    ];

    /// Storage key, identical to the persisted payload field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeoEnrichment => "geo_enrichment",
            Self::PropertyAnalysis => "property_analysis",
            Self::ServiceMapping => "service_mapping",
        }
    }

    /// Human-readable stage name.
    pub fn label(&self) -> &'static str {
        match self {
            Self::GeoEnrichment => "Geo Enrichment",
            Self::PropertyAnalysis => "Property Analysis",
            Self::ServiceMapping => "Service Mapping",
        }
    }

    /// The stage that must be complete before this one may run.
    pub fn prerequisite(&self) -> Option<Stage> {
        match self {
            Self::GeoEnrichment => None,
            Self::PropertyAnalysis => Some(Self::GeoEnrichment),
            Self::ServiceMapping => Some(Self::PropertyAnalysis),
        }
    }

    /// Whether the lead already carries this stage's payload.
    pub fn is_present_on(&self, lead: &Lead) -> bool {
        match self {
            Self::GeoEnrichment => lead.geo_enrichment.is_some(),
            Self::PropertyAnalysis => lead.property_analysis.is_some(),
            Self::ServiceMapping => lead.service_mapping.is_some(),
        }
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "geo" | "geo_enrichment" => Ok(Self::GeoEnrichment),
            "property" | "property_analysis" => Ok(Self::PropertyAnalysis),
            "service" | "service_mapping" => Ok(Self::ServiceMapping),
            other => Err(format!("unknown stage '{other}'")),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Activity
// ---------------------------------------------------------------------------

string_enum! {
    /// Kind of logged interaction.
    ActivityKind {
        Call => "call",
        Email => "email",
        Meeting => "meeting",
        Note => "note",
    }
}

/// A timestamped interaction tied to a lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub lead_id: String,
    pub kind: ActivityKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_by: Option<String>,
    /// Set once on creation, never modified.
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub follow_up_date: Option<NaiveDate>,
    #[serde(default)]
    pub follow_up_action: Option<String>,
    #[serde(default)]
    pub follow_up_completed: bool,
}

// ---------------------------------------------------------------------------
// Campaigns
// ---------------------------------------------------------------------------

string_enum! {
    CampaignStatus {
        Draft => "draft",
        Active => "active",
        Paused => "paused",
        Completed => "completed",
    }
}

string_enum! {
    /// Outreach channel of a campaign step.
    Channel {
        Email => "email",
        Linkedin => "linkedin",
        Call => "call",
    }
}

string_enum! {
    MessageStatus {
        Draft => "draft",
        Approved => "approved",
        Sent => "sent",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: CampaignStatus,
    pub created_at: DateTime<Utc>,
}

/// One touchpoint in a campaign sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStep {
    pub step_number: u32,
    pub channel: Channel,
    #[serde(default)]
    pub delay_days: u32,
    #[serde(default)]
    pub subject: Option<String>,
    /// Free-form guidance for the message generator.
    #[serde(default)]
    pub template: String,
}

/// A generated outreach message for one lead at one campaign step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedMessage {
    pub id: String,
    pub campaign_id: String,
    pub lead_id: String,
    pub step_number: u32,
    #[serde(default)]
    pub subject: Option<String>,
    pub body: String,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_tolerates_missing_and_unknown_fields() {
        let json = r#"{"id":"l1","company":"Acme","status":"negotiating","qualification_level":null}"#;
        let lead: Lead = serde_json::from_str(json).expect("deserialize");
        assert_eq!(lead.company, "Acme");
        assert_eq!(lead.status, LeadStatus::New);
        assert_eq!(lead.enrichment_status, EnrichmentStatus::Discovered);
        assert!(lead.qualification_level.is_none());
        assert!(lead.geo_enrichment.is_none());
    }

    #[test]
    fn lead_parses_known_enums_case_insensitively() {
        let json = r#"{"status":"Proposal","qualification_level":"HOT","enrichment_status":"complete"}"#;
        let lead: Lead = serde_json::from_str(json).unwrap();
        assert_eq!(lead.status, LeadStatus::Proposal);
        assert_eq!(lead.qualification_level, Some(QualificationLevel::Hot));
        assert!(lead.enrichment_status.is_enriched());
    }

    #[test]
    fn address_detection() {
        let mut lead = Lead::new("Dana", "Acme");
        assert!(!lead.has_address());

        lead.city = Some("   ".into());
        assert!(!lead.has_address());

        lead.city = Some("Austin".into());
        lead.state = Some("TX".into());
        assert!(lead.has_address());
        assert_eq!(lead.address_line(), "Austin, TX");
    }

    #[test]
    fn stage_order_and_prerequisites() {
        assert_eq!(Stage::ALL[0].prerequisite(), None);
        assert_eq!(
            Stage::ServiceMapping.prerequisite(),
            Some(Stage::PropertyAnalysis)
        );
        assert_eq!("property".parse::<Stage>().unwrap(), Stage::PropertyAnalysis);
        assert_eq!("service-mapping".parse::<Stage>().unwrap(), Stage::ServiceMapping);
        assert!("billing".parse::<Stage>().is_err());
    }

    #[test]
    fn activity_serialization() {
        let activity = Activity {
            id: new_id(),
            lead_id: "l1".into(),
            kind: ActivityKind::Meeting,
            content: "Site walk".into(),
            created_by: Some("sam".into()),
            created_at: Utc::now(),
            updated_at: None,
            follow_up_date: NaiveDate::from_ymd_opt(2026, 3, 1),
            follow_up_action: Some("Send proposal".into()),
            follow_up_completed: false,
        };
        let json = serde_json::to_string(&activity).unwrap();
        assert!(json.contains(r#""kind":"meeting""#));
        let parsed: Activity = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.follow_up_action.as_deref(), Some("Send proposal"));
    }
}
