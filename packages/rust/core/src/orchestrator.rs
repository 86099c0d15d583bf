//! Stage execution: single-stage runs and "Run Full Analysis".
//!
//! State is validated before a stage starts and again by the conditional
//! payload write in storage. A run is bracketed by a persisted `running`
//! marker; success clears it, failure replaces it with a `failed` marker.

use async_trait::async_trait;
use chrono::Utc;
use leadforge_shared::{
    GeoEnrichment, Lead, LeadForgeError, PropertyAnalysis, Result, ServiceMapping, Stage,
};
use leadforge_storage::Storage;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::cancel::CancelFlag;
use crate::progress::ProgressReporter;
use crate::stages::{StageState, stage_state};

/// Payload produced by one stage.
#[derive(Debug, Clone)]
pub enum StageOutput {
    Geo(GeoEnrichment),
    Property(PropertyAnalysis),
    Service(ServiceMapping),
}

impl StageOutput {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Geo(_) => Stage::GeoEnrichment,
            Self::Property(_) => Stage::PropertyAnalysis,
            Self::Service(_) => Stage::ServiceMapping,
        }
    }
}

/// Produces a stage payload for a lead. Implementations must check
/// `cancel` before every external request.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(&self, stage: Stage, lead: &Lead, cancel: &CancelFlag) -> Result<StageOutput>;
}

/// Outcome of [`run_full_analysis`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub lead: Lead,
    pub completed: Vec<Stage>,
    /// Stages that were already complete and not re-run.
    pub skipped: Vec<Stage>,
}

/// Run one stage for a lead and persist its payload.
///
/// Returns the lead as stored after the write.
#[instrument(skip_all, fields(lead_id = %lead_id, stage = %stage))]
pub async fn run_stage(
    storage: &Storage,
    executor: &dyn StageExecutor,
    lead_id: &str,
    stage: Stage,
    cancel: &CancelFlag,
) -> Result<Lead> {
    let lead = storage.require_lead(lead_id).await?;
    let runs = storage.list_stage_runs(lead_id).await?;

    match stage_state(stage, &lead, &runs, Utc::now()) {
        StageState::Blocked(reason) => return Err(LeadForgeError::StageBlocked { stage, reason }),
        StageState::Running => {
            return Err(LeadForgeError::validation(format!(
                "{} is already running for this lead",
                stage.label()
            )));
        }
        StageState::Pending | StageState::Complete | StageState::Failed(_) => {}
    }

    cancel.check()?;
    storage.mark_stage_running(lead_id, stage).await?;
    info!("stage started");

    let outcome = match executor.execute(stage, &lead, cancel).await {
        Ok(output) => write_output(storage, lead_id, stage, output).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => {
            storage.clear_stage_run(lead_id, stage).await?;
            info!("stage complete");
            storage.require_lead(lead_id).await
        }
        Err(LeadForgeError::Cancelled) => {
            storage.clear_stage_run(lead_id, stage).await?;
            info!("stage cancelled");
            Err(LeadForgeError::Cancelled)
        }
        Err(e) => {
            warn!(error = %e, "stage failed");
            if let Err(bookkeeping) = storage.mark_stage_failed(lead_id, stage, &e.to_string()).await {
                warn!(error = %bookkeeping, "could not record stage failure");
            }
            Err(e)
        }
    }
}

async fn write_output(storage: &Storage, lead_id: &str, stage: Stage, output: StageOutput) -> Result<()> {
    if output.stage() != stage {
        return Err(LeadForgeError::validation(format!(
            "{} produced a {} payload",
            stage.label(),
            output.stage().label()
        )));
    }
    match output {
        StageOutput::Geo(geo) => storage.set_geo_enrichment(lead_id, &geo).await,
        StageOutput::Property(analysis) => storage.set_property_analysis(lead_id, &analysis).await,
        StageOutput::Service(mapping) => storage.set_service_mapping(lead_id, &mapping).await,
    }
}

/// Run Geo → Property → Service in order.
///
/// Already-complete stages are skipped. The first failure stops the run;
/// later stages are not attempted and earlier payloads stay as written.
#[instrument(skip_all, fields(lead_id = %lead_id))]
pub async fn run_full_analysis(
    storage: &Storage,
    executor: &dyn StageExecutor,
    lead_id: &str,
    cancel: &CancelFlag,
    progress: &dyn ProgressReporter,
) -> Result<AnalysisReport> {
    let mut lead = storage.require_lead(lead_id).await?;
    let mut completed = Vec::new();
    let mut skipped = Vec::new();

    for stage in Stage::ALL {
        if stage.is_present_on(&lead) {
            skipped.push(stage);
            continue;
        }
        cancel.check()?;
        progress.phase(stage.label());
        lead = run_stage(storage, executor, lead_id, stage, cancel).await?;
        completed.push(stage);
    }

    info!(completed = completed.len(), skipped = skipped.len(), "full analysis finished");
    Ok(AnalysisReport {
        lead,
        completed,
        skipped,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::progress::SilentProgress;
    use leadforge_shared::ErrorKind;
    use leadforge_storage::StageRunState;

    pub(crate) async fn temp_storage() -> Storage {
        let path = std::env::temp_dir().join(format!("lf_core_{}.db", uuid::Uuid::now_v7()));
        Storage::open(&path).await.expect("open temp db")
    }

    /// Executor that records calls and fails at a chosen stage.
    #[derive(Default)]
    struct FakeExecutor {
        calls: Mutex<Vec<Stage>>,
        fail_at: Option<Stage>,
        cancel_at: Option<Stage>,
    }

    impl FakeExecutor {
        fn calls(&self) -> Vec<Stage> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StageExecutor for FakeExecutor {
        async fn execute(&self, stage: Stage, _lead: &Lead, cancel: &CancelFlag) -> Result<StageOutput> {
            cancel.check()?;
            self.calls.lock().unwrap().push(stage);
            if self.cancel_at == Some(stage) {
                cancel.cancel();
                return Err(LeadForgeError::Cancelled);
            }
            if self.fail_at == Some(stage) {
                return Err(LeadForgeError::upstream("OpenAI", Some(500), "boom"));
            }
            Ok(match stage {
                Stage::GeoEnrichment => StageOutput::Geo(GeoEnrichment {
                    lat: 30.27,
                    lng: -97.74,
                    ..Default::default()
                }),
                Stage::PropertyAnalysis => StageOutput::Property(PropertyAnalysis {
                    property_type: "office_park".into(),
                    ..Default::default()
                }),
                Stage::ServiceMapping => StageOutput::Service(ServiceMapping::default()),
            })
        }
    }

    /// Executor that deletes the lead out from under the run, then fails.
    struct VanishingLeadExecutor<'a> {
        storage: &'a Storage,
    }

    #[async_trait]
    impl StageExecutor for VanishingLeadExecutor<'_> {
        async fn execute(&self, _stage: Stage, lead: &Lead, _cancel: &CancelFlag) -> Result<StageOutput> {
            self.storage.delete_lead(&lead.id).await?;
            Err(LeadForgeError::upstream("Google Maps", Some(503), "unavailable"))
        }
    }

    async fn seeded_lead(storage: &Storage) -> Lead {
        let mut lead = Lead::new("Dana", "Acme");
        lead.street = Some("1 Main St".into());
        lead.city = Some("Austin".into());
        lead.state = Some("TX".into());
        storage.insert_lead(&lead).await.unwrap();
        lead
    }

    #[tokio::test]
    async fn full_analysis_runs_in_order() {
        let storage = temp_storage().await;
        let lead = seeded_lead(&storage).await;
        let executor = FakeExecutor::default();

        let report = run_full_analysis(&storage, &executor, &lead.id, &CancelFlag::new(), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(report.completed, Stage::ALL.to_vec());
        assert!(report.skipped.is_empty());
        assert!(report.lead.service_mapping.is_some());
        assert!(storage.list_stage_runs(&lead.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stops_at_first_failure_and_keeps_earlier_payloads() {
        let storage = temp_storage().await;
        let lead = seeded_lead(&storage).await;
        let executor = FakeExecutor {
            fail_at: Some(Stage::PropertyAnalysis),
            ..Default::default()
        };

        let err = run_full_analysis(&storage, &executor, &lead.id, &CancelFlag::new(), &SilentProgress)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
        assert_eq!(executor.calls(), vec![Stage::GeoEnrichment, Stage::PropertyAnalysis]);

        let stored = storage.require_lead(&lead.id).await.unwrap();
        assert!(stored.geo_enrichment.is_some());
        assert!(stored.property_analysis.is_none());
        assert!(stored.service_mapping.is_none());

        let runs = storage.list_stage_runs(&lead.id).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].stage, Stage::PropertyAnalysis);
        assert_eq!(runs[0].state, StageRunState::Failed);
    }

    #[tokio::test]
    async fn rerun_skips_completed_stages() {
        let storage = temp_storage().await;
        let lead = seeded_lead(&storage).await;
        let failing = FakeExecutor {
            fail_at: Some(Stage::ServiceMapping),
            ..Default::default()
        };
        let _ = run_full_analysis(&storage, &failing, &lead.id, &CancelFlag::new(), &SilentProgress).await;

        let executor = FakeExecutor::default();
        let report = run_full_analysis(&storage, &executor, &lead.id, &CancelFlag::new(), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(executor.calls(), vec![Stage::ServiceMapping]);
        assert_eq!(report.skipped, vec![Stage::GeoEnrichment, Stage::PropertyAnalysis]);
    }

    #[tokio::test]
    async fn cancellation_before_start_makes_no_calls() {
        let storage = temp_storage().await;
        let lead = seeded_lead(&storage).await;
        let executor = FakeExecutor::default();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = run_full_analysis(&storage, &executor, &lead.id, &cancel, &SilentProgress)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(executor.calls().is_empty());
        assert!(storage.list_stage_runs(&lead.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_mid_run_clears_marker() {
        let storage = temp_storage().await;
        let lead = seeded_lead(&storage).await;
        let executor = FakeExecutor {
            cancel_at: Some(Stage::PropertyAnalysis),
            ..Default::default()
        };
        let cancel = CancelFlag::new();

        let err = run_full_analysis(&storage, &executor, &lead.id, &cancel, &SilentProgress)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(executor.calls(), vec![Stage::GeoEnrichment, Stage::PropertyAnalysis]);
        assert!(storage.list_stage_runs(&lead.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blocked_stage_is_rejected_without_calls() {
        let storage = temp_storage().await;
        let lead = seeded_lead(&storage).await;
        let executor = FakeExecutor::default();

        let err = run_stage(&storage, &executor, &lead.id, Stage::ServiceMapping, &CancelFlag::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StageBlocked);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn stage_error_survives_failed_bookkeeping() {
        let storage = temp_storage().await;
        let lead = seeded_lead(&storage).await;
        let executor = VanishingLeadExecutor { storage: &storage };

        // The failed marker cannot be written once the lead row is gone.
        let err = run_stage(&storage, &executor, &lead.id, Stage::GeoEnrichment, &CancelFlag::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
        assert!(storage.list_stage_runs(&lead.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn running_stage_cannot_start_twice() {
        let storage = temp_storage().await;
        let lead = seeded_lead(&storage).await;
        storage.mark_stage_running(&lead.id, Stage::GeoEnrichment).await.unwrap();

        let err = run_stage(&storage, &FakeExecutor::default(), &lead.id, Stage::GeoEnrichment, &CancelFlag::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
