//! AI Opportunity Score: a heuristic, multi-factor score per lead.
//!
//! Three sub-scores (company fit, engagement, timing) are accumulated from
//! tiered bonuses, each clamped to `[0, 100]`, and blended into a composite.
//! Every point adjustment is recorded next to a reason string so the
//! breakdown always explains the number shown.
//!
//! Presentation jitter is injected through a [`NoiseSource`]. The default
//! [`ZeroNoise`] makes scoring fully deterministic; [`SeededNoise`] restores
//! the demo-style variance reproducibly.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use leadforge_shared::{Activity, Lead, LeadStatus, QualificationLevel, ScoringConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

const FIT_WEIGHT: f64 = 0.45;
const ENGAGEMENT_WEIGHT: f64 = 0.30;
const TIMING_WEIGHT: f64 = 0.25;

const FIT_JITTER: f64 = 7.0;
const ENGAGEMENT_JITTER: f64 = 6.0;
const TIMING_JITTER: f64 = 5.0;
const WIN_JITTER: f64 = 3.0;

const WIN_CAP_BEFORE_JITTER: f64 = 92.0;
const WIN_MIN: f64 = 5.0;
const WIN_MAX: f64 = 95.0;

const VALUE_ROUNDING: f64 = 500.0;

const HIGH_VALUE_PROPERTY: &[&str] = &[
    "golf", "country club", "resort", "campus", "university", "college", "hospital", "stadium",
    "corporate", "estate", "cemetery", "theme park",
];

const MEDIUM_VALUE_PROPERTY: &[&str] = &[
    "office", "apartment", "condo", "hotel", "shopping", "retail", "hoa", "community", "school",
    "church", "senior", "medical", "industrial", "warehouse", "park",
];

const QUALITY_KEYWORDS: &[&str] = &[
    "premium", "luxury", "upscale", "excellent", "pristine", "high end", "high-end", "class a",
    "well maintained", "well-maintained",
];

static EXECUTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(ceo|cfo|coo|cto|chief|president|owner|founder|partner|principal|vp|vice president|svp|evp)\b")
        .expect("valid regex")
});

static MANAGER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(director|manager|head|supervisor|superintendent|lead|coordinator)\b").expect("valid regex")
});

// ---------------------------------------------------------------------------
// Noise
// ---------------------------------------------------------------------------

/// Source of presentation jitter.
pub trait NoiseSource: Send {
    /// A value in `[-amplitude, amplitude]`.
    fn jitter(&mut self, amplitude: f64) -> f64;
    /// A value in `[0, 1)` used to pick a point inside a value range.
    fn unit(&mut self) -> f64;
}

/// No jitter; value ranges resolve to their midpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroNoise;

impl NoiseSource for ZeroNoise {
    fn jitter(&mut self, _amplitude: f64) -> f64 {
        0.0
    }

    fn unit(&mut self) -> f64 {
        0.5
    }
}

/// Uniform jitter from a seeded RNG, reproducible per seed.
#[derive(Debug, Clone)]
pub struct SeededNoise {
    rng: StdRng,
}

impl SeededNoise {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl NoiseSource for SeededNoise {
    fn jitter(&mut self, amplitude: f64) -> f64 {
        if amplitude <= 0.0 {
            return 0.0;
        }
        self.rng.random_range(-amplitude..=amplitude)
    }

    fn unit(&mut self) -> f64 {
        self.rng.random::<f64>()
    }
}

/// Noise source selected by the `[scoring]` config section.
pub fn noise_from_config(config: &ScoringConfig) -> Box<dyn NoiseSource> {
    if !config.jitter {
        return Box::new(ZeroNoise);
    }
    let seed = config.seed.unwrap_or_else(|| rand::rng().random());
    Box::new(SeededNoise::new(seed))
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Reasoning for each sub-score, one string per adjustment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub company_fit: Vec<String>,
    pub engagement: Vec<String>,
    pub timing: Vec<String>,
}

/// A lead with its derived scores. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredLead {
    pub lead: Lead,
    pub opportunity_score: u8,
    pub company_fit_score: u8,
    pub engagement_score: u8,
    pub timing_score: u8,
    pub win_probability: u8,
    /// Annual deal value in dollars, always a multiple of 500.
    pub estimated_value: u64,
    pub score_breakdown: ScoreBreakdown,
}

/// Property value tier used by company fit and value estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTier {
    High,
    Medium,
    Generic,
    Unknown,
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Points plus the reason for each adjustment, kept in lock-step.
struct Tally {
    points: f64,
    reasons: Vec<String>,
}

impl Tally {
    fn new(base: f64, label: &str) -> Self {
        Self {
            points: base,
            reasons: vec![format!("{base:.0} {label}")],
        }
    }

    fn add(&mut self, points: f64, reason: impl AsRef<str>) {
        self.points += points;
        self.reasons.push(format!("{points:+.0} {}", reason.as_ref()));
    }

    /// Apply jitter, clamp to `[0, 100]`, and round. A clamp that moves the
    /// total is recorded so the reasons still sum to the score.
    fn finish(mut self, jitter: f64) -> (u8, Vec<String>) {
        if jitter.round() != 0.0 {
            self.add(jitter, "display variance");
        } else {
            self.points += jitter;
        }
        let unclamped = self.points.round();
        let score = unclamped.clamp(0.0, 100.0);
        let correction = score - unclamped;
        if correction < 0.0 {
            self.reasons.push(format!("{correction:+.0} capped at 100"));
        } else if correction > 0.0 {
            self.reasons.push(format!("{correction:+.0} floored at 0"));
        }
        (score as u8, self.reasons)
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Score one lead against its activities.
pub fn score_lead(
    lead: &Lead,
    activities: &[&Activity],
    now: DateTime<Utc>,
    noise: &mut dyn NoiseSource,
) -> ScoredLead {
    let tier = value_tier(lead);

    let (company_fit_score, fit_reasons) = company_fit(lead, tier).finish(noise.jitter(FIT_JITTER));
    let (engagement_score, engagement_reasons) =
        engagement(lead, activities, now).finish(noise.jitter(ENGAGEMENT_JITTER));
    let (timing_score, timing_reasons) = timing(lead, now).finish(noise.jitter(TIMING_JITTER));

    let opportunity_score = composite(company_fit_score, engagement_score, timing_score);
    let win_probability = win_probability(opportunity_score, lead.status, noise.jitter(WIN_JITTER));
    let estimated_value = estimated_value(lead, tier, noise.unit());

    ScoredLead {
        lead: lead.clone(),
        opportunity_score,
        company_fit_score,
        engagement_score,
        timing_score,
        win_probability,
        estimated_value,
        score_breakdown: ScoreBreakdown {
            company_fit: fit_reasons,
            engagement: engagement_reasons,
            timing: timing_reasons,
        },
    }
}

/// Score a batch, matching activities to leads by `lead_id`.
pub fn score_leads(
    leads: &[Lead],
    activities: &[Activity],
    now: DateTime<Utc>,
    noise: &mut dyn NoiseSource,
) -> Vec<ScoredLead> {
    let by_lead = group_activities(activities);
    leads
        .iter()
        .map(|lead| {
            let acts = by_lead.get(lead.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            score_lead(lead, acts, now, noise)
        })
        .collect()
}

/// Score leads supplied as loosely-typed JSON.
///
/// A non-array input yields an empty result; entries that are not lead
/// objects are skipped.
pub fn score_leads_value(
    leads: &serde_json::Value,
    activities: &[Activity],
    now: DateTime<Utc>,
    noise: &mut dyn NoiseSource,
) -> Vec<ScoredLead> {
    let Some(items) = leads.as_array() else {
        return Vec::new();
    };
    let parsed: Vec<Lead> = items
        .iter()
        .filter(|v| v.is_object())
        .filter_map(|v| match serde_json::from_value::<Lead>(v.clone()) {
            Ok(lead) => Some(lead),
            Err(e) => {
                debug!(error = %e, "skipping malformed lead entry");
                None
            }
        })
        .collect();
    score_leads(&parsed, activities, now, noise)
}

fn group_activities(activities: &[Activity]) -> HashMap<&str, Vec<&Activity>> {
    let mut by_lead: HashMap<&str, Vec<&Activity>> = HashMap::new();
    for activity in activities {
        by_lead.entry(activity.lead_id.as_str()).or_default().push(activity);
    }
    by_lead
}

/// `round(fit*0.45 + engagement*0.30 + timing*0.25)`.
pub fn composite(fit: u8, engagement: u8, timing: u8) -> u8 {
    let blended = f64::from(fit) * FIT_WEIGHT + f64::from(engagement) * ENGAGEMENT_WEIGHT
        + f64::from(timing) * TIMING_WEIGHT;
    blended.round().clamp(0.0, 100.0) as u8
}

fn status_multiplier(status: LeadStatus) -> f64 {
    match status {
        LeadStatus::New => 0.5,
        LeadStatus::Contacted => 0.8,
        LeadStatus::Qualified => 1.3,
        LeadStatus::Proposal => 1.8,
        LeadStatus::Won => 2.5,
        LeadStatus::Lost => 0.05,
    }
}

/// Win probability in `[5, 95]`.
pub fn win_probability(composite: u8, status: LeadStatus, jitter: f64) -> u8 {
    let raw = (f64::from(composite) * 0.4 * status_multiplier(status)).min(WIN_CAP_BEFORE_JITTER);
    (raw + jitter).clamp(WIN_MIN, WIN_MAX).round() as u8
}

fn normalized(text: &str) -> String {
    text.to_lowercase().replace(['_', '-'], " ")
}

fn property_type(lead: &Lead) -> Option<String> {
    lead.property_analysis
        .as_ref()
        .map(|p| p.property_type.clone())
        .filter(|t| !t.trim().is_empty())
        .or_else(|| {
            lead.service_mapping
                .as_ref()
                .and_then(|s| s.context.property_type.clone())
                .filter(|t| !t.trim().is_empty())
        })
}

/// Classify the lead's property type into a value tier.
pub fn value_tier(lead: &Lead) -> ValueTier {
    let Some(kind) = property_type(lead) else {
        return ValueTier::Unknown;
    };
    let kind = normalized(&kind);
    if HIGH_VALUE_PROPERTY.iter().any(|k| kind.contains(k)) {
        ValueTier::High
    } else if MEDIUM_VALUE_PROPERTY.iter().any(|k| kind.contains(k)) {
        ValueTier::Medium
    } else {
        ValueTier::Generic
    }
}

fn non_blank(value: Option<&str>) -> bool {
    value.is_some_and(|s| !s.trim().is_empty())
}

fn company_fit(lead: &Lead, tier: ValueTier) -> Tally {
    let mut tally = Tally::new(20.0, "base");
    let kind = property_type(lead).map(|k| normalized(&k)).unwrap_or_default();

    match tier {
        ValueTier::High => tally.add(25.0, format!("high-value property ({kind})")),
        ValueTier::Medium => tally.add(15.0, format!("mid-value property ({kind})")),
        ValueTier::Generic => tally.add(5.0, format!("property type identified ({kind})")),
        ValueTier::Unknown => {}
    }

    if let Some(analysis) = &lead.property_analysis {
        let quality = normalized(&format!("{} {}", analysis.quality, analysis.condition));
        if QUALITY_KEYWORDS.iter().any(|k| quality.contains(k)) {
            tally.add(10.0, "premium property quality");
        }
    }

    if let Some(mapping) = &lead.service_mapping {
        let tag = mapping
            .context
            .opportunity_level
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .unwrap_or_default();
        if tag.starts_with("high") {
            tally.add(15.0, "AI rates opportunity High");
        } else if tag.starts_with("medium") {
            tally.add(8.0, "AI rates opportunity Medium");
        } else if tag.starts_with("low") {
            tally.add(2.0, "AI rates opportunity Low");
        }

        let fit_len = mapping
            .context
            .service_fit
            .as_deref()
            .map(|s| s.trim().chars().count())
            .unwrap_or(0);
        if fit_len > 500 {
            tally.add(10.0, "detailed service-fit analysis");
        } else if fit_len > 200 {
            tally.add(6.0, "moderate service-fit analysis");
        } else if fit_len > 0 {
            tally.add(3.0, "brief service-fit analysis");
        }
    }

    match lead.employee_count {
        Some(n) if n >= 500 => tally.add(12.0, format!("large organization ({n} employees)")),
        Some(n) if n >= 100 => tally.add(8.0, format!("mid-size organization ({n} employees)")),
        Some(n) if n >= 20 => tally.add(4.0, format!("small organization ({n} employees)")),
        _ => {}
    }

    if lead.enrichment_status.is_enriched() {
        tally.add(8.0, "contact enrichment complete");
    }
    if non_blank(lead.apollo_id.as_deref()) {
        tally.add(5.0, "verified contact record");
    }
    tally
}

fn engagement(lead: &Lead, activities: &[&Activity], now: DateTime<Utc>) -> Tally {
    let mut tally = Tally::new(20.0, "base");

    let week_ago = now - Duration::days(7);
    let recent = activities.iter().filter(|a| a.created_at >= week_ago).count();
    match recent {
        n if n >= 5 => tally.add(25.0, format!("{n} activities in the last 7 days")),
        n if n >= 3 => tally.add(18.0, format!("{n} activities in the last 7 days")),
        n if n >= 1 => tally.add(10.0, format!("{n} recent activity in the last 7 days")),
        _ => {}
    }

    match activities.len() {
        n if n >= 10 => tally.add(15.0, format!("{n} total activities")),
        n if n >= 5 => tally.add(10.0, format!("{n} total activities")),
        n if n >= 1 => tally.add(5.0, format!("{n} total activities")),
        _ => {}
    }

    for (present, channel) in [
        (non_blank(lead.email.as_deref()), "email"),
        (non_blank(lead.phone.as_deref()), "phone"),
        (non_blank(lead.linkedin_url.as_deref()), "LinkedIn"),
    ] {
        if present {
            tally.add(7.0, format!("{channel} available"));
        }
    }

    if EXECUTIVE_RE.is_match(&lead.title) {
        tally.add(12.0, format!("executive title ({})", lead.title.trim()));
    } else if MANAGER_RE.is_match(&lead.title) {
        tally.add(6.0, format!("manager-level title ({})", lead.title.trim()));
    }
    tally
}

fn timing(lead: &Lead, now: DateTime<Utc>) -> Tally {
    let mut tally = Tally::new(30.0, "base");

    if let Some(created) = lead.created_at {
        let age = now.signed_duration_since(created).num_days().max(0);
        match age {
            0..=1 => tally.add(30.0, "brand new lead"),
            2..=7 => tally.add(20.0, format!("lead is {age} days old")),
            8..=30 => tally.add(10.0, format!("lead is {age} days old")),
            31..=90 => {}
            _ => tally.add(-10.0, format!("stale lead ({age} days old)")),
        }
    }

    if let Some(enriched) = lead.enriched_at {
        let age = now.signed_duration_since(enriched).num_days().max(0);
        if age <= 7 {
            tally.add(10.0, "enriched this week");
        } else if age <= 30 {
            tally.add(5.0, "enriched this month");
        }
    }

    match lead.qualification_level {
        Some(QualificationLevel::Hot) => tally.add(20.0, "hot lead"),
        Some(QualificationLevel::Warm) => tally.add(10.0, "warm lead"),
        Some(QualificationLevel::Cold) => tally.add(-5.0, "cold lead"),
        None => {}
    }

    match lead.status {
        LeadStatus::Proposal => tally.add(15.0, "proposal stage"),
        LeadStatus::Qualified => tally.add(10.0, "qualified"),
        LeadStatus::Contacted => tally.add(5.0, "contacted"),
        LeadStatus::Won => tally.add(5.0, "won"),
        LeadStatus::New => {}
        LeadStatus::Lost => tally.add(-20.0, "lost"),
    }
    tally
}

/// Annual deal value rounded to the nearest $500.
///
/// A parseable `estimated_annual_value` wins; otherwise a point inside the
/// tier's range is picked with `unit` and scaled by organization size.
pub fn estimated_value(lead: &Lead, tier: ValueTier, unit: f64) -> u64 {
    if let Some(parsed) = lead
        .service_mapping
        .as_ref()
        .and_then(|s| s.cost_time_analysis.parsed_annual_value())
    {
        return round_to_increment(parsed);
    }

    let (low, high) = match tier {
        ValueTier::High => (60_000.0, 140_000.0),
        ValueTier::Medium => (30_000.0, 80_000.0),
        _ if lead.enrichment_status.is_enriched() => (25_000.0, 65_000.0),
        _ if non_blank(lead.apollo_id.as_deref()) => (15_000.0, 40_000.0),
        _ => (8_000.0, 23_000.0),
    };
    let base = low + (high - low) * unit.clamp(0.0, 1.0);
    let multiplier = match lead.employee_count {
        Some(n) if n >= 500 => 1.5,
        Some(n) if n >= 100 => 1.2,
        _ => 1.0,
    };
    round_to_increment(base * multiplier)
}

fn round_to_increment(value: f64) -> u64 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    ((value / VALUE_ROUNDING).round() * VALUE_ROUNDING) as u64
}

// ---------------------------------------------------------------------------
// Memoization
// ---------------------------------------------------------------------------

const MAX_CACHE_ENTRIES: usize = 10_000;

/// Fingerprint of a lead, its activity set, and the scoring day.
pub fn fingerprint(lead: &Lead, activities: &[&Activity], now: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(lead).unwrap_or_default());

    let mut keys: Vec<String> = activities
        .iter()
        .map(|a| format!("{}@{}", a.id, a.created_at.to_rfc3339()))
        .collect();
    keys.sort();
    for key in keys {
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(now.date_naive().to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Memoizes scores per (lead, activity set, day) fingerprint.
#[derive(Debug, Default)]
pub struct ScoreCache {
    entries: HashMap<String, ScoredLead>,
    hits: u64,
    misses: u64,
}

impl ScoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    pub fn score(
        &mut self,
        lead: &Lead,
        activities: &[&Activity],
        now: DateTime<Utc>,
        noise: &mut dyn NoiseSource,
    ) -> ScoredLead {
        let key = fingerprint(lead, activities, now);
        if let Some(hit) = self.entries.get(&key) {
            self.hits += 1;
            return hit.clone();
        }
        self.misses += 1;
        if self.entries.len() >= MAX_CACHE_ENTRIES {
            self.entries.clear();
        }
        let scored = score_lead(lead, activities, now, noise);
        self.entries.insert(key, scored.clone());
        scored
    }

    /// Batch variant of [`ScoreCache::score`].
    pub fn score_all(
        &mut self,
        leads: &[Lead],
        activities: &[Activity],
        now: DateTime<Utc>,
        noise: &mut dyn NoiseSource,
    ) -> Vec<ScoredLead> {
        let by_lead = group_activities(activities);
        leads
            .iter()
            .map(|lead| {
                let acts = by_lead.get(lead.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
                self.score(lead, acts, now, noise)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadforge_shared::{
        ActivityKind, CostTimeAnalysis, EnrichmentStatus, PropertyAnalysis, ServiceContext, ServiceMapping,
        new_id,
    };

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn lead() -> Lead {
        let mut lead = Lead::new("Dana Reyes", "Lakeway Country Club");
        lead.created_at = Some(now() - Duration::days(45));
        lead
    }

    fn activity(lead_id: &str, days_ago: i64) -> Activity {
        Activity {
            id: new_id(),
            lead_id: lead_id.to_string(),
            kind: ActivityKind::Call,
            content: String::new(),
            created_by: None,
            created_at: now() - Duration::days(days_ago),
            updated_at: None,
            follow_up_date: None,
            follow_up_action: None,
            follow_up_completed: false,
        }
    }

    fn golf_lead() -> Lead {
        let mut lead = lead();
        lead.qualification_level = Some(QualificationLevel::Hot);
        lead.status = LeadStatus::Proposal;
        lead.employee_count = Some(600);
        lead.enrichment_status = EnrichmentStatus::Complete;
        lead.property_analysis = Some(PropertyAnalysis {
            property_type: "golf_course".into(),
            quality: "premium".into(),
            ..Default::default()
        });
        lead
    }

    fn reasons_sum(reasons: &[String]) -> f64 {
        reasons
            .iter()
            .map(|r| r.split_whitespace().next().unwrap().parse::<f64>().unwrap())
            .sum()
    }

    #[test]
    fn composite_formula() {
        assert_eq!(composite(80, 60, 40), 64);
        assert_eq!(composite(0, 0, 0), 0);
        assert_eq!(composite(100, 100, 100), 100);
        // 45*.45 + 55*.3 + 65*.25 = 20.25 + 16.5 + 16.25 = 53
        assert_eq!(composite(45, 55, 65), 53);
    }

    #[test]
    fn breakdown_explains_the_number() {
        let lead = golf_lead();
        let scored = score_lead(&lead, &[], now(), &mut ZeroNoise);
        assert_eq!(reasons_sum(&scored.score_breakdown.company_fit), f64::from(scored.company_fit_score));
        assert_eq!(reasons_sum(&scored.score_breakdown.timing), f64::from(scored.timing_score));
        assert_eq!(reasons_sum(&scored.score_breakdown.engagement), f64::from(scored.engagement_score));
    }

    #[test]
    fn breakdown_explains_a_capped_score() {
        let mut lead = lead();
        lead.created_at = Some(now() - Duration::hours(2));
        lead.enriched_at = Some(now() - Duration::hours(1));
        lead.qualification_level = Some(QualificationLevel::Hot);
        lead.status = LeadStatus::Proposal;

        let scored = score_lead(&lead, &[], now(), &mut ZeroNoise);
        // 30 + 30 + 10 + 20 + 15 = 105
        assert_eq!(scored.timing_score, 100);
        assert_eq!(scored.score_breakdown.timing.last().map(String::as_str), Some("-5 capped at 100"));
        assert_eq!(reasons_sum(&scored.score_breakdown.timing), 100.0);
    }

    #[test]
    fn breakdown_explains_a_floored_score() {
        let mut lead = lead();
        lead.created_at = Some(now() - Duration::days(200));
        lead.qualification_level = Some(QualificationLevel::Cold);
        lead.status = LeadStatus::Lost;

        let scored = score_lead(&lead, &[], now(), &mut ZeroNoise);
        // 30 - 10 - 5 - 20 = -5
        assert_eq!(scored.timing_score, 0);
        assert_eq!(scored.score_breakdown.timing.last().map(String::as_str), Some("+5 floored at 0"));
        assert_eq!(reasons_sum(&scored.score_breakdown.timing), 0.0);
    }

    #[test]
    fn golf_course_scenario() {
        let scored = score_lead(&golf_lead(), &[], now(), &mut ZeroNoise);
        // base 20 + high-value 25 + quality 10 + 600 employees 12 + enriched 8
        assert_eq!(scored.company_fit_score, 75);
        assert!((60_000..=210_000).contains(&scored.estimated_value));
        // midpoint 100k * 1.5
        assert_eq!(scored.estimated_value, 150_000);
        assert_eq!(value_tier(&golf_lead()), ValueTier::High);
    }

    #[test]
    fn brand_new_cold_lead_timing() {
        let mut lead = Lead::new("Sam", "Globex");
        lead.created_at = Some(now());
        lead.qualification_level = Some(QualificationLevel::Cold);
        let scored = score_lead(&lead, &[], now(), &mut ZeroNoise);
        assert_eq!(scored.timing_score, 55);
        assert!(scored.score_breakdown.timing.iter().any(|r| r.contains("brand new lead")));
    }

    #[test]
    fn future_created_at_counts_as_new() {
        let mut lead = lead();
        lead.created_at = Some(now() + Duration::days(400));
        let scored = score_lead(&lead, &[], now(), &mut ZeroNoise);
        assert_eq!(scored.timing_score, 60);
    }

    #[test]
    fn engagement_tiers() {
        let mut lead = lead();
        lead.email = Some("dana@lakeway.example".into());
        lead.phone = Some("512-555-0100".into());
        lead.title = "Director of Facilities".into();
        let acts: Vec<Activity> = (0..6).map(|i| activity(&lead.id, i)).collect();
        let refs: Vec<&Activity> = acts.iter().collect();
        let scored = score_lead(&lead, &refs, now(), &mut ZeroNoise);
        // 20 + recent>=5 25 + total>=5 10 + 2 channels 14 + manager 6
        assert_eq!(scored.engagement_score, 75);
    }

    #[test]
    fn director_is_not_cto() {
        assert!(!EXECUTIVE_RE.is_match("Director of Grounds"));
        assert!(EXECUTIVE_RE.is_match("VP, Operations"));
        assert!(MANAGER_RE.is_match("Grounds Manager"));
    }

    #[test]
    fn scores_stay_in_bounds_under_extremes() {
        let mut worst = lead();
        worst.employee_count = Some(-40);
        worst.created_at = Some(now() - Duration::days(5000));
        worst.status = LeadStatus::Lost;
        worst.qualification_level = Some(QualificationLevel::Cold);

        let mut best = golf_lead();
        best.status = LeadStatus::Won;
        best.email = Some("a@b.c".into());
        best.phone = Some("1".into());
        best.linkedin_url = Some("https://linkedin.com/in/x".into());
        best.title = "CEO".into();
        best.apollo_id = Some("ap_1".into());
        best.created_at = Some(now());
        best.enriched_at = Some(now());
        best.service_mapping = Some(ServiceMapping {
            context: ServiceContext {
                opportunity_level: Some("High".into()),
                service_fit: Some("x".repeat(900)),
                ..Default::default()
            },
            ..Default::default()
        });
        let acts: Vec<Activity> = (0..20).map(|_| activity(&best.id, 0)).collect();

        for seed in 0..50 {
            let mut noise = SeededNoise::new(seed);
            let scored = score_leads(&[worst.clone(), best.clone()], &acts, now(), &mut noise);
            for s in &scored {
                for v in [s.company_fit_score, s.engagement_score, s.timing_score, s.opportunity_score] {
                    assert!(v <= 100);
                }
                assert!((5..=95).contains(&s.win_probability));
                assert_eq!(s.estimated_value % 500, 0);
            }
        }
    }

    #[test]
    fn composite_matches_subscores_without_noise() {
        let scored = score_lead(&golf_lead(), &[], now(), &mut ZeroNoise);
        assert_eq!(
            scored.opportunity_score,
            composite(scored.company_fit_score, scored.engagement_score, scored.timing_score)
        );
    }

    #[test]
    fn win_probability_table() {
        assert_eq!(win_probability(50, LeadStatus::New, 0.0), 10);
        assert_eq!(win_probability(100, LeadStatus::Won, 0.0), 92);
        assert_eq!(win_probability(100, LeadStatus::Won, 3.0), 95);
        assert_eq!(win_probability(10, LeadStatus::Lost, -3.0), 5);
    }

    #[test]
    fn parsed_value_is_rounded() {
        let mut lead = lead();
        lead.service_mapping = Some(ServiceMapping {
            cost_time_analysis: CostTimeAnalysis {
                estimated_annual_value: Some("$47,320 - $60,000 annually".into()),
                ..Default::default()
            },
            ..Default::default()
        });
        assert_eq!(estimated_value(&lead, value_tier(&lead), 0.5), 47_500);
    }

    #[test]
    fn value_tiers_fall_back() {
        let mut lead = lead();
        assert_eq!(estimated_value(&lead, ValueTier::Unknown, 0.0), 8_000);
        lead.apollo_id = Some("ap".into());
        assert_eq!(estimated_value(&lead, ValueTier::Unknown, 1.0), 40_000);
        lead.enrichment_status = EnrichmentStatus::Enriched;
        lead.employee_count = Some(150);
        // 25k * 1.2
        assert_eq!(estimated_value(&lead, ValueTier::Unknown, 0.0), 30_000);
    }

    #[test]
    fn non_array_input_is_empty() {
        let mut noise = ZeroNoise;
        assert!(score_leads_value(&serde_json::json!({"id": "x"}), &[], now(), &mut noise).is_empty());
        assert!(score_leads_value(&serde_json::Value::Null, &[], now(), &mut noise).is_empty());
        assert!(score_leads_value(&serde_json::json!([]), &[], now(), &mut noise).is_empty());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let input = serde_json::json!([
            {"id": "a", "name": "Dana", "employee_count": "lots"},
            42,
            {"id": "b", "name": "Sam", "status": "qualified", "qualification_level": "tepid"}
        ]);
        let scored = score_leads_value(&input, &[], now(), &mut ZeroNoise);
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].lead.id, "b");
        assert_eq!(scored[0].lead.qualification_level, None);
    }

    #[test]
    fn seeded_noise_is_reproducible() {
        let lead = golf_lead();
        let a = score_lead(&lead, &[], now(), &mut SeededNoise::new(7));
        let b = score_lead(&lead, &[], now(), &mut SeededNoise::new(7));
        assert_eq!(a.opportunity_score, b.opportunity_score);
        assert_eq!(a.estimated_value, b.estimated_value);
    }

    #[test]
    fn cache_hits_until_inputs_change() {
        let mut cache = ScoreCache::new();
        let mut lead = golf_lead();
        let acts = vec![activity(&lead.id, 1)];

        cache.score_all(std::slice::from_ref(&lead), &acts, now(), &mut ZeroNoise);
        cache.score_all(std::slice::from_ref(&lead), &acts, now(), &mut ZeroNoise);
        assert_eq!(cache.stats(), (1, 1));

        lead.status = LeadStatus::Won;
        cache.score_all(std::slice::from_ref(&lead), &acts, now(), &mut ZeroNoise);
        assert_eq!(cache.stats(), (1, 2));
        assert_eq!(cache.len(), 2);
    }
}
