//! Stage state derivation for the Geo → Property → Service sequence.
//!
//! Two views are derived from the same inputs:
//! - [`StageState`]: authoritative state, computed from persisted payloads
//!   plus persisted [`StageRun`] markers, and validated before a stage runs.
//! - [`StageStatus`]: the four-value display status with its `can_run` flag.

use chrono::{DateTime, Duration, Utc};
use leadforge_shared::{Lead, Stage};
use leadforge_storage::{StageRun, StageRunState};
use serde::Serialize;

/// Minutes after which a running marker is treated as abandoned.
pub const STALE_RUN_MINUTES: i64 = 15;

/// Authoritative state of one stage for one lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Blocked(String),
    Running,
    Complete,
    Failed(String),
}

impl StageState {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Display status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Disabled,
    Loading,
    Complete,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Disabled => "disabled",
            Self::Loading => "loading",
            Self::Complete => "complete",
        }
    }
}

/// Display status for `stage`. Disabled wins over loading.
pub fn stage_status(stage: Stage, lead: &Lead, loading: bool) -> StageStatus {
    let prerequisite_missing = stage.prerequisite().is_some_and(|p| !p.is_present_on(lead));
    if prerequisite_missing {
        StageStatus::Disabled
    } else if loading {
        StageStatus::Loading
    } else if stage.is_present_on(lead) {
        StageStatus::Complete
    } else {
        StageStatus::Pending
    }
}

/// Whether the inputs `stage` needs are present on the lead.
pub fn can_run(stage: Stage, lead: &Lead) -> bool {
    match stage.prerequisite() {
        None => lead.has_address(),
        Some(prerequisite) => prerequisite.is_present_on(lead),
    }
}

fn blocked_reason(stage: Stage, lead: &Lead) -> Option<String> {
    match stage.prerequisite() {
        None if !lead.has_address() => Some("lead has no street or city".to_string()),
        None => None,
        Some(prerequisite) if !prerequisite.is_present_on(lead) => {
            Some(format!("{} has not completed", prerequisite.label()))
        }
        Some(_) => None,
    }
}

/// Authoritative state of `stage`.
///
/// Precedence: blocked, running (unless stale), complete, failed, pending.
pub fn stage_state(stage: Stage, lead: &Lead, runs: &[StageRun], now: DateTime<Utc>) -> StageState {
    if let Some(reason) = blocked_reason(stage, lead) {
        return StageState::Blocked(reason);
    }

    let run = runs.iter().find(|r| r.stage == stage);
    let in_flight = run.is_some_and(|r| {
        r.state == StageRunState::Running
            && now.signed_duration_since(r.updated_at) < Duration::minutes(STALE_RUN_MINUTES)
    });
    if in_flight {
        return StageState::Running;
    }

    if stage.is_present_on(lead) {
        return StageState::Complete;
    }

    match run {
        Some(run) if run.state == StageRunState::Failed => {
            StageState::Failed(run.error.clone().unwrap_or_else(|| "unknown error".to_string()))
        }
        _ => StageState::Pending,
    }
}

/// Both views of one stage, as reported by `stage status`.
#[derive(Debug, Clone, Serialize)]
pub struct StageSnapshot {
    pub stage: Stage,
    pub state: StageState,
    pub status: StageStatus,
    pub can_run: bool,
}

/// Snapshots for all three stages in execution order.
pub fn snapshot(lead: &Lead, runs: &[StageRun], now: DateTime<Utc>) -> Vec<StageSnapshot> {
    Stage::ALL
        .iter()
        .map(|&stage| {
            let state = stage_state(stage, lead, runs, now);
            let loading = state == StageState::Running;
            StageSnapshot {
                stage,
                status: stage_status(stage, lead, loading),
                can_run: can_run(stage, lead),
                state,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadforge_shared::{GeoEnrichment, PropertyAnalysis, ServiceMapping};

    fn addressed() -> Lead {
        let mut lead = Lead::new("Dana", "Acme");
        lead.street = Some("1 Main St".into());
        lead.city = Some("Austin".into());
        lead
    }

    fn run(stage: Stage, state: StageRunState, age_minutes: i64) -> StageRun {
        StageRun {
            stage,
            state,
            error: Some("OpenAI request failed (HTTP 500): boom".into()),
            updated_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    #[test]
    fn fresh_lead_status() {
        let lead = addressed();
        assert_eq!(stage_status(Stage::GeoEnrichment, &lead, false), StageStatus::Pending);
        assert_eq!(stage_status(Stage::PropertyAnalysis, &lead, false), StageStatus::Disabled);
        assert_eq!(stage_status(Stage::ServiceMapping, &lead, false), StageStatus::Disabled);
        assert!(can_run(Stage::GeoEnrichment, &lead));
        assert!(!can_run(Stage::PropertyAnalysis, &lead));
    }

    #[test]
    fn geo_requires_address() {
        let lead = Lead::new("Dana", "Acme");
        assert!(!can_run(Stage::GeoEnrichment, &lead));
        assert!(matches!(
            stage_state(Stage::GeoEnrichment, &lead, &[], Utc::now()),
            StageState::Blocked(_)
        ));
    }

    #[test]
    fn disabled_wins_over_loading() {
        let lead = addressed();
        assert_eq!(stage_status(Stage::ServiceMapping, &lead, true), StageStatus::Disabled);
        assert_eq!(stage_status(Stage::GeoEnrichment, &lead, true), StageStatus::Loading);
    }

    #[test]
    fn completed_chain() {
        let mut lead = addressed();
        lead.geo_enrichment = Some(GeoEnrichment::default());
        lead.property_analysis = Some(PropertyAnalysis::default());
        assert_eq!(stage_status(Stage::PropertyAnalysis, &lead, false), StageStatus::Complete);
        assert_eq!(stage_status(Stage::ServiceMapping, &lead, false), StageStatus::Pending);
        assert!(can_run(Stage::ServiceMapping, &lead));

        lead.service_mapping = Some(ServiceMapping::default());
        let states: Vec<_> = snapshot(&lead, &[], Utc::now()).into_iter().map(|s| s.state).collect();
        assert!(states.iter().all(StageState::is_complete));
    }

    #[test]
    fn running_and_failed_markers() {
        let mut lead = addressed();
        lead.geo_enrichment = Some(GeoEnrichment::default());
        let now = Utc::now();

        let running = [run(Stage::PropertyAnalysis, StageRunState::Running, 1)];
        assert_eq!(stage_state(Stage::PropertyAnalysis, &lead, &running, now), StageState::Running);

        let stale = [run(Stage::PropertyAnalysis, StageRunState::Running, 60)];
        assert_eq!(stage_state(Stage::PropertyAnalysis, &lead, &stale, now), StageState::Pending);

        let failed = [run(Stage::PropertyAnalysis, StageRunState::Failed, 1)];
        assert!(matches!(
            stage_state(Stage::PropertyAnalysis, &lead, &failed, now),
            StageState::Failed(reason) if reason.contains("HTTP 500")
        ));
    }

    #[test]
    fn blocked_ignores_stale_markers() {
        let lead = addressed();
        let running = [run(Stage::ServiceMapping, StageRunState::Running, 1)];
        assert_eq!(
            stage_state(Stage::ServiceMapping, &lead, &running, Utc::now()),
            StageState::Blocked("Property Analysis has not completed".into())
        );
    }
}
