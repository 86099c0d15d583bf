//! `LeadService`: the backend operation surface used by the CLI.
//!
//! Owns the storage handle, loaded config, provider clients, and the score
//! cache. Every operation returns [`leadforge_shared::Result`]; user-facing
//! copy is produced by the caller via `LeadForgeError::user_message`.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use leadforge_research::{ResearchAggregator, ResearchBundle, ResearchTarget, SocialAnalyzer, SocialPresenceReport};
use leadforge_shared::{
    Activity, ActivityKind, AppConfig, Campaign, CampaignStep, CompetitorRecord, GeneratedMessage, Lead,
    LeadForgeError, LeadStatus, QualificationLevel, Result, Settings, Stage, expand_home, new_id,
};
use leadforge_storage::Storage;
use tracing::{debug, info};

use crate::analysis::{ProviderClients, StageRunner};
use crate::campaign::{self, MessageUpdate};
use crate::cancel::CancelFlag;
use crate::contacts;
use crate::orchestrator::{self, AnalysisReport};
use crate::progress::{BulkProgress, ProgressReporter};
use crate::scoring::{NoiseSource, ScoreCache, ScoredLead, noise_from_config};
use crate::stages::{self, StageSnapshot};

/// Status and/or qualification change for a lead.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeadStatusUpdate {
    pub status: Option<LeadStatus>,
    pub qualification_level: Option<QualificationLevel>,
}

/// Input for logging a new activity.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub kind: ActivityKind,
    pub content: String,
    pub created_by: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub follow_up_action: Option<String>,
}

/// Edits to an activity. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ActivityUpdate {
    pub kind: Option<ActivityKind>,
    pub content: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub follow_up_action: Option<String>,
    pub follow_up_completed: Option<bool>,
}

pub struct LeadService {
    storage: Storage,
    config: AppConfig,
    clients: ProviderClients,
    cache: Mutex<ScoreCache>,
    noise: Mutex<Box<dyn NoiseSource>>,
}

impl LeadService {
    /// Open the configured database and build provider clients.
    pub async fn open(config: AppConfig) -> Result<Self> {
        let db_path = expand_home(&config.defaults.database_path);
        debug!(path = %db_path.display(), "opening lead database");
        let storage = Storage::open(&db_path).await?;
        let clients = ProviderClients::from_config(&config)?;
        Ok(Self::new(storage, config, clients))
    }

    pub fn new(storage: Storage, config: AppConfig, clients: ProviderClients) -> Self {
        let noise = noise_from_config(&config.scoring);
        Self {
            storage,
            config,
            clients,
            cache: Mutex::new(ScoreCache::new()),
            noise: Mutex::new(noise),
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn runner(&self) -> StageRunner<'_> {
        StageRunner::new(&self.clients, &self.config.defaults.service_category)
    }

    // -----------------------------------------------------------------------
    // Leads
    // -----------------------------------------------------------------------

    pub async fn create_lead(&self, lead: Lead) -> Result<Lead> {
        if lead.name.trim().is_empty() && lead.company.trim().is_empty() {
            return Err(LeadForgeError::validation("a lead needs a name or a company"));
        }
        self.storage.insert_lead(&lead).await?;
        info!(lead_id = %lead.id, "lead created");
        Ok(lead)
    }

    pub async fn get_lead(&self, lead_id: &str) -> Result<Lead> {
        self.storage.require_lead(lead_id).await
    }

    pub async fn list_leads(&self) -> Result<Vec<Lead>> {
        self.storage.list_leads().await
    }

    pub async fn delete_lead(&self, lead_id: &str) -> Result<()> {
        self.storage.require_lead(lead_id).await?;
        self.storage.delete_lead(lead_id).await
    }

    pub async fn update_lead_status(&self, lead_id: &str, update: LeadStatusUpdate) -> Result<Lead> {
        if update.status.is_none() && update.qualification_level.is_none() {
            return Err(LeadForgeError::validation(
                "nothing to update: give a status or a qualification level",
            ));
        }
        self.storage
            .update_lead_status(lead_id, update.status, update.qualification_level)
            .await?;
        self.storage.require_lead(lead_id).await
    }

    /// Apollo contact enrichment for one lead.
    pub async fn enrich_lead(&self, lead_id: &str) -> Result<Lead> {
        let apollo = self.clients.require_apollo()?;
        contacts::enrich_lead(&self.storage, apollo, lead_id).await
    }

    // -----------------------------------------------------------------------
    // Activities
    // -----------------------------------------------------------------------

    pub async fn get_lead_activities(&self, lead_id: &str) -> Result<Vec<Activity>> {
        self.storage.require_lead(lead_id).await?;
        self.storage.list_activities(lead_id).await
    }

    pub async fn create_lead_activity(&self, lead_id: &str, input: NewActivity) -> Result<Activity> {
        self.storage.require_lead(lead_id).await?;
        let activity = Activity {
            id: new_id(),
            lead_id: lead_id.to_string(),
            kind: input.kind,
            content: input.content.trim().to_string(),
            created_by: input.created_by,
            created_at: Utc::now(),
            updated_at: None,
            follow_up_date: input.follow_up_date,
            follow_up_action: input.follow_up_action,
            follow_up_completed: false,
        };
        self.storage.insert_activity(&activity).await?;
        Ok(activity)
    }

    pub async fn update_lead_activity(&self, activity_id: &str, update: ActivityUpdate) -> Result<Activity> {
        let mut activity = self
            .storage
            .get_activity(activity_id)
            .await?
            .ok_or_else(|| LeadForgeError::NotFound(format!("activity {activity_id}")))?;

        if let Some(kind) = update.kind {
            activity.kind = kind;
        }
        if let Some(content) = update.content {
            activity.content = content.trim().to_string();
        }
        if update.follow_up_date.is_some() {
            activity.follow_up_date = update.follow_up_date;
        }
        if update.follow_up_action.is_some() {
            activity.follow_up_action = update.follow_up_action;
        }
        if let Some(done) = update.follow_up_completed {
            activity.follow_up_completed = done;
        }

        self.storage.update_activity(&activity).await?;
        self.storage
            .get_activity(activity_id)
            .await?
            .ok_or_else(|| LeadForgeError::NotFound(format!("activity {activity_id}")))
    }

    pub async fn delete_lead_activity(&self, activity_id: &str) -> Result<()> {
        self.storage.delete_activity(activity_id).await
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    pub async fn stage_states(&self, lead_id: &str) -> Result<Vec<StageSnapshot>> {
        let lead = self.storage.require_lead(lead_id).await?;
        let runs = self.storage.list_stage_runs(lead_id).await?;
        Ok(stages::snapshot(&lead, &runs, Utc::now()))
    }

    pub async fn get_geo_enrichment(&self, lead_id: &str, cancel: &CancelFlag) -> Result<Lead> {
        orchestrator::run_stage(&self.storage, &self.runner(), lead_id, Stage::GeoEnrichment, cancel).await
    }

    pub async fn get_property_analysis(&self, lead_id: &str, cancel: &CancelFlag) -> Result<Lead> {
        orchestrator::run_stage(&self.storage, &self.runner(), lead_id, Stage::PropertyAnalysis, cancel).await
    }

    pub async fn get_service_mapping(&self, lead_id: &str, cancel: &CancelFlag) -> Result<Lead> {
        orchestrator::run_stage(&self.storage, &self.runner(), lead_id, Stage::ServiceMapping, cancel).await
    }

    pub async fn run_full_analysis(
        &self,
        lead_id: &str,
        cancel: &CancelFlag,
        progress: &dyn ProgressReporter,
    ) -> Result<AnalysisReport> {
        orchestrator::run_full_analysis(&self.storage, &self.runner(), lead_id, cancel, progress).await
    }

    // -----------------------------------------------------------------------
    // Research
    // -----------------------------------------------------------------------

    /// Nearby competitors for a lead, without persisting them.
    pub async fn competitors(&self, lead_id: &str) -> Result<Vec<CompetitorRecord>> {
        self.clients.require_places()?;
        let lead = self.storage.require_lead(lead_id).await?;
        Ok(self.runner().competitors_for(&lead).await)
    }

    pub async fn research(&self, lead_id: &str) -> Result<ResearchBundle> {
        let lead = self.storage.require_lead(lead_id).await?;
        let geo = lead.geo_enrichment.as_ref();
        let target = ResearchTarget {
            company: lead.display_company(),
            city: geo.and_then(|g| g.city.as_deref()).or(lead.city.as_deref()),
            state: geo.and_then(|g| g.state.as_deref()).or(lead.state.as_deref()),
            place_id: geo
                .and_then(|g| g.business_intelligence.as_ref())
                .and_then(|b| b.place_id.as_deref()),
        };
        let aggregator = ResearchAggregator::new(self.clients.places.clone(), self.clients.search.clone());
        Ok(aggregator.gather(&target, Utc::now()).await)
    }

    pub async fn social_presence(&self, lead_id: &str) -> Result<SocialPresenceReport> {
        let lookup = self.clients.require_perplexity()?.clone();
        let lead = self.storage.require_lead(lead_id).await?;
        let location = [lead.city.as_deref(), lead.state.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(", ");

        let analyzer = SocialAnalyzer::new(lookup, self.clients.openai.clone())
            .with_delay(Duration::from_millis(self.config.social.delay_ms));
        Ok(analyzer.analyze(lead.display_company(), &location).await)
    }

    // -----------------------------------------------------------------------
    // Scoring
    // -----------------------------------------------------------------------

    /// Score every lead, highest opportunity first.
    pub async fn score_leads(&self) -> Result<Vec<ScoredLead>> {
        let leads = self.storage.list_leads().await?;
        let activities = self.storage.list_all_activities().await?;

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let mut noise = self.noise.lock().unwrap_or_else(|e| e.into_inner());
        let mut scored = cache.score_all(&leads, &activities, Utc::now(), &mut **noise);
        let (hits, misses) = cache.stats();
        debug!(hits, misses, "score cache");

        scored.sort_by(|a, b| b.opportunity_score.cmp(&a.opportunity_score));
        Ok(scored)
    }

    pub async fn score_lead(&self, lead_id: &str) -> Result<ScoredLead> {
        let lead = self.storage.require_lead(lead_id).await?;
        let activities = self.storage.list_activities(lead_id).await?;
        let refs: Vec<&Activity> = activities.iter().collect();

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let mut noise = self.noise.lock().unwrap_or_else(|e| e.into_inner());
        Ok(cache.score(&lead, &refs, Utc::now(), &mut **noise))
    }

    // -----------------------------------------------------------------------
    // Campaigns
    // -----------------------------------------------------------------------

    pub async fn create_campaign(&self, name: &str, description: Option<&str>) -> Result<Campaign> {
        campaign::create_campaign(&self.storage, name, description).await
    }

    pub async fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        self.storage.list_campaigns().await
    }

    pub async fn set_campaign_steps(&self, campaign_id: &str, steps: Vec<CampaignStep>) -> Result<Vec<CampaignStep>> {
        campaign::set_campaign_steps(&self.storage, campaign_id, steps).await
    }

    pub async fn add_campaign_leads(&self, campaign_id: &str, lead_ids: &[String]) -> Result<usize> {
        campaign::add_campaign_leads(&self.storage, campaign_id, lead_ids).await
    }

    pub async fn enrich_campaign_leads(
        &self,
        campaign_id: &str,
        cancel: &CancelFlag,
        progress: &dyn ProgressReporter,
    ) -> Result<BulkProgress> {
        let apollo = self.clients.require_apollo()?;
        let delay = Duration::from_millis(self.config.defaults.bulk_delay_ms);
        campaign::enrich_campaign_leads(&self.storage, apollo, campaign_id, delay, cancel, progress).await
    }

    pub async fn generate_messages(
        &self,
        campaign_id: &str,
        cancel: &CancelFlag,
        progress: &dyn ProgressReporter,
    ) -> Result<BulkProgress> {
        let openai = self.clients.require_openai()?;
        campaign::generate_messages(&self.storage, openai, campaign_id, cancel, progress).await
    }

    pub async fn list_generated_messages(&self, campaign_id: &str) -> Result<Vec<GeneratedMessage>> {
        campaign::list_generated_messages(&self.storage, campaign_id).await
    }

    pub async fn update_generated_message(&self, message_id: &str, update: &MessageUpdate) -> Result<GeneratedMessage> {
        campaign::update_generated_message(&self.storage, message_id, update).await
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    /// Which providers are configured. Never includes key values.
    pub fn get_settings(&self) -> Settings {
        Settings::from_config(&self.config)
    }
}
