//! Nested enrichment payloads attached to a lead, and competitor records.
//!
//! These are persisted as JSON on the lead row. Model output is not always
//! well-typed (numbers arrive as strings, lists as `null`), so numeric and
//! list fields deserialize leniently.

use serde::{Deserialize, Deserializer, Serialize};

/// Accept a number, a numeric string ("2.5 acres"), or null.
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => leading_number(&s),
        _ => None,
    })
}

/// Accept a list of strings or `null`.
fn lenient_vec<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse the first decimal number in `text`, ignoring `$` and thousands separators.
pub fn leading_number(text: &str) -> Option<f64> {
    let mut digits = String::new();
    let mut started = false;
    for ch in text.chars() {
        if ch.is_ascii_digit() || (started && ch == '.') {
            digits.push(ch);
            started = true;
        } else if started && ch == ',' {
            continue;
        } else if started {
            break;
        }
    }
    digits.trim_end_matches('.').parse().ok()
}

// ---------------------------------------------------------------------------
// Geo Enrichment
// ---------------------------------------------------------------------------

/// Output of the Geo Enrichment stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoEnrichment {
    pub lat: f64,
    pub lng: f64,
    pub formatted_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    /// County or metro area.
    pub region: Option<String>,
    pub image_url: Option<String>,
    pub business_intelligence: Option<BusinessIntelligence>,
}

/// Places directory facts about the lead's own business.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessIntelligence {
    pub place_id: Option<String>,
    pub name: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub website: Option<String>,
    pub phone: Option<String>,
    #[serde(deserialize_with = "lenient_vec")]
    pub types: Vec<String>,
    pub business_status: Option<String>,
}

// ---------------------------------------------------------------------------
// Property Analysis
// ---------------------------------------------------------------------------

/// Output of the Property Analysis stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyAnalysis {
    /// e.g. `golf_course`, `office_park`, `apartment_complex`.
    pub property_type: String,
    pub quality: String,
    pub condition: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub lot_size_acres: Option<f64>,
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Service Mapping
// ---------------------------------------------------------------------------

/// Output of the Service Mapping stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceMapping {
    pub executive_summary: Option<String>,
    pub context: ServiceContext,
    #[serde(deserialize_with = "lenient_vec")]
    pub recommended_services: Vec<RecommendedService>,
    pub competition_assessment: CompetitionAssessment,
    pub irrigation_intelligence: Option<serde_json::Value>,
    pub actionable_insights: ActionableInsights,
    pub cost_time_analysis: CostTimeAnalysis,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceContext {
    /// Model-assigned opportunity tag: High, Medium, or Low.
    pub opportunity_level: Option<String>,
    /// Narrative of how well our services fit the property.
    pub service_fit: Option<String>,
    pub property_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendedService {
    pub name: String,
    pub rationale: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetitionAssessment {
    #[serde(deserialize_with = "lenient_vec")]
    pub local_providers: Vec<CompetitorRecord>,
    pub market_saturation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionableInsights {
    #[serde(deserialize_with = "lenient_vec")]
    pub talking_points: Vec<String>,
    #[serde(deserialize_with = "lenient_vec")]
    pub next_steps: Vec<String>,
    #[serde(deserialize_with = "lenient_vec")]
    pub objections: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CostTimeAnalysis {
    /// Free text such as `"$45,000 - $60,000 per year"`.
    pub estimated_annual_value: Option<String>,
    pub implementation_timeline: Option<String>,
}

impl CostTimeAnalysis {
    /// Leading dollar figure of `estimated_annual_value`, if parseable.
    pub fn parsed_annual_value(&self) -> Option<f64> {
        self.estimated_annual_value
            .as_deref()
            .and_then(leading_number)
            .filter(|v| *v > 0.0)
    }
}

// ---------------------------------------------------------------------------
// Competitor Record
// ---------------------------------------------------------------------------

/// A nearby competing business from the places directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetitorRecord {
    pub name: String,
    pub address: Option<String>,
    pub place_id: String,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub phone: Option<String>,
    pub website: Option<String>,
    #[serde(deserialize_with = "lenient_vec")]
    pub opening_hours: Vec<String>,
    pub business_status: Option<String>,
    #[serde(deserialize_with = "lenient_vec")]
    pub reviews: Vec<CompetitorReview>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetitorReview {
    pub author: String,
    pub rating: Option<f64>,
    pub text: String,
    pub relative_time: Option<String>,
    /// Unix seconds.
    pub time: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_number_parsing() {
        assert_eq!(leading_number("$45,000 - $60,000 per year"), Some(45_000.0));
        assert_eq!(leading_number("about 2.5 acres"), Some(2.5));
        assert_eq!(leading_number("12."), Some(12.0));
        assert_eq!(leading_number("unknown"), None);
    }

    #[test]
    fn property_analysis_accepts_string_lot_size() {
        let json = r#"{"property_type":"golf_course","lot_size_acres":"140 acres","quality":"premium"}"#;
        let parsed: PropertyAnalysis = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.lot_size_acres, Some(140.0));
        assert_eq!(parsed.condition, "");
    }

    #[test]
    fn service_mapping_tolerates_nulls() {
        let json = r#"{
            "executive_summary": "Large irrigated campus",
            "recommended_services": null,
            "actionable_insights": {"talking_points": ["Water savings"], "next_steps": null},
            "cost_time_analysis": {"estimated_annual_value": "$85,000/yr"}
        }"#;
        let parsed: ServiceMapping = serde_json::from_str(json).unwrap();
        assert!(parsed.recommended_services.is_empty());
        assert_eq!(parsed.actionable_insights.talking_points.len(), 1);
        assert!(parsed.actionable_insights.next_steps.is_empty());
        assert_eq!(parsed.cost_time_analysis.parsed_annual_value(), Some(85_000.0));
    }
}
