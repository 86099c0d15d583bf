//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use leadforge_core::{
    ActivityUpdate, CancelFlag, LeadService, LeadStatusUpdate, MessageUpdate, NewActivity,
    ProgressReporter, ScoredLead, StageState,
};
use leadforge_shared::{
    ActivityKind, AppConfig, CampaignStep, Lead, LeadStatus, MessageStatus, QualificationLevel,
    Stage, init_config, load_config,
};
use tracing::{info, warn};

use crate::progress::CliProgress;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LeadForge: prospect enrichment, scoring, and outreach.
#[derive(Parser)]
#[command(
    name = "leadforge",
    version,
    about = "Enrich, score, and run outreach campaigns for sales leads.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Lead records, status, and scores.
    Lead {
        #[command(subcommand)]
        action: LeadAction,
    },

    /// Calls, emails, meetings, and notes logged against a lead.
    Activity {
        #[command(subcommand)]
        action: ActivityAction,
    },

    /// Geo → Property → Service enrichment stages.
    Stage {
        #[command(subcommand)]
        action: StageAction,
    },

    /// Competitor, web, and social research for a lead.
    Research {
        #[command(subcommand)]
        action: ResearchAction,
    },

    /// Outreach campaigns and generated messages.
    Campaign {
        #[command(subcommand)]
        action: CampaignAction,
    },

    /// Show which provider API keys are configured.
    Settings,

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum LeadAction {
    /// Create a lead.
    Add {
        /// Contact name.
        #[arg(long, default_value = "")]
        name: String,

        /// Company name.
        #[arg(long, default_value = "")]
        company: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        website: Option<String>,

        #[arg(long)]
        street: Option<String>,

        #[arg(long)]
        city: Option<String>,

        #[arg(long)]
        state: Option<String>,

        #[arg(long)]
        postal_code: Option<String>,

        #[arg(long)]
        industry: Option<String>,

        /// Approximate employee count.
        #[arg(long)]
        employees: Option<i64>,
    },

    /// List all leads.
    List,

    /// Print one lead with its enrichment payloads as JSON.
    Show { lead_id: String },

    /// Change pipeline status and/or qualification level.
    Status {
        lead_id: String,

        /// new, contacted, qualified, proposal, won, or lost.
        #[arg(long)]
        status: Option<LeadStatus>,

        /// cold, warm, or hot.
        #[arg(long)]
        qualification: Option<QualificationLevel>,
    },

    /// Score one lead, or rank every lead when no id is given.
    Score {
        lead_id: Option<String>,

        /// Print the full scored record as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Fill contact details from Apollo.
    Enrich { lead_id: String },

    /// Delete a lead and its activities.
    Delete { lead_id: String },
}

#[derive(Subcommand)]
pub(crate) enum ActivityAction {
    /// Log an activity against a lead.
    Add {
        lead_id: String,

        /// call, email, meeting, or note.
        #[arg(long, default_value = "note")]
        kind: ActivityKind,

        #[arg(long)]
        content: String,

        /// Who logged it.
        #[arg(long, env = "LEADFORGE_USER")]
        by: Option<String>,

        /// Follow-up date (YYYY-MM-DD).
        #[arg(long)]
        follow_up_date: Option<NaiveDate>,

        #[arg(long)]
        follow_up_action: Option<String>,
    },

    /// List a lead's activities, newest first.
    List { lead_id: String },

    /// Edit an activity.
    Edit {
        activity_id: String,

        #[arg(long)]
        kind: Option<ActivityKind>,

        #[arg(long)]
        content: Option<String>,

        #[arg(long)]
        follow_up_date: Option<NaiveDate>,

        #[arg(long)]
        follow_up_action: Option<String>,

        /// Mark the follow-up as done.
        #[arg(long)]
        completed: bool,
    },

    /// Delete an activity.
    Delete { activity_id: String },
}

#[derive(Subcommand)]
pub(crate) enum StageAction {
    /// Show the state of every stage for a lead.
    Status { lead_id: String },
    /// Run geo enrichment.
    Geo { lead_id: String },
    /// Run property analysis.
    Property { lead_id: String },
    /// Run service mapping.
    Service { lead_id: String },
    /// Run every incomplete stage in order.
    Run { lead_id: String },
}

#[derive(Subcommand)]
pub(crate) enum ResearchAction {
    /// Nearby competitors with reviews.
    Competitors { lead_id: String },
    /// Web mentions, place details, and review themes.
    Bundle { lead_id: String },
    /// Social platform presence and insights.
    Social { lead_id: String },
}

#[derive(Subcommand)]
pub(crate) enum CampaignAction {
    /// Create a draft campaign.
    Create {
        name: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// List campaigns.
    List,

    /// Replace a campaign's steps from a JSON file.
    Steps {
        campaign_id: String,

        /// JSON array of `{step_number, channel, delay_days, subject, template}`.
        #[arg(long)]
        file: PathBuf,
    },

    /// Add leads to a campaign.
    AddLeads {
        campaign_id: String,

        #[arg(required = true)]
        lead_ids: Vec<String>,
    },

    /// Enrich contact data for every campaign lead.
    Enrich { campaign_id: String },

    /// Generate one message per campaign lead per step.
    Generate { campaign_id: String },

    /// List generated messages.
    Messages { campaign_id: String },

    /// Edit a generated message.
    EditMessage {
        message_id: String,

        #[arg(long)]
        subject: Option<String>,

        #[arg(long)]
        body: Option<String>,

        /// draft, approved, or sent.
        #[arg(long)]
        status: Option<MessageStatus>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "leadforge=info",
        1 => "leadforge=debug",
        _ => "leadforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
        Command::Settings => {
            let service = open_service().await?;
            cmd_settings(&service)
        }
        Command::Lead { action } => {
            let service = open_service().await?;
            run_lead(&service, action).await
        }
        Command::Activity { action } => {
            let service = open_service().await?;
            run_activity(&service, action).await
        }
        Command::Stage { action } => {
            let service = open_service().await?;
            run_stage(&service, action).await
        }
        Command::Research { action } => {
            let service = open_service().await?;
            run_research(&service, action).await
        }
        Command::Campaign { action } => {
            let service = open_service().await?;
            run_campaign(&service, action).await
        }
    }
}

async fn open_service() -> Result<LeadService> {
    let config = load_config()?;
    Ok(LeadService::open(config).await?)
}

/// Cancel flag that trips on Ctrl-C.
fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current request");
            flag.cancel();
        }
    });
    cancel
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Leads
// ---------------------------------------------------------------------------

async fn run_lead(service: &LeadService, action: LeadAction) -> Result<()> {
    match action {
        LeadAction::Add {
            name,
            company,
            title,
            email,
            phone,
            website,
            street,
            city,
            state,
            postal_code,
            industry,
            employees,
        } => {
            let mut lead = Lead::new(name, company);
            lead.title = title.unwrap_or_default();
            lead.email = email;
            lead.phone = phone;
            lead.website = website;
            lead.street = street;
            lead.city = city;
            lead.state = state;
            lead.postal_code = postal_code;
            lead.industry = industry;
            lead.employee_count = employees;

            let lead = service.create_lead(lead).await?;
            println!("Lead created: {}", lead.id);
            Ok(())
        }
        LeadAction::List => {
            let leads = service.list_leads().await?;
            if leads.is_empty() {
                println!("No leads yet. Add one with `leadforge lead add`.");
                return Ok(());
            }
            for lead in &leads {
                println!(
                    "{}  {:<32} {:<10} {}",
                    lead.id,
                    lead.display_company(),
                    lead.status,
                    lead.enrichment_status
                );
            }
            Ok(())
        }
        LeadAction::Show { lead_id } => print_json(&service.get_lead(&lead_id).await?),
        LeadAction::Status {
            lead_id,
            status,
            qualification,
        } => {
            if status.is_none() && qualification.is_none() {
                return Err(eyre!("nothing to change: pass --status and/or --qualification"));
            }
            let lead = service
                .update_lead_status(
                    &lead_id,
                    LeadStatusUpdate {
                        status,
                        qualification_level: qualification,
                    },
                )
                .await?;
            let level = lead.qualification_level.map(|q| q.as_str()).unwrap_or("-");
            println!("{}: status {}, qualification {level}", lead.display_company(), lead.status);
            Ok(())
        }
        LeadAction::Score { lead_id, json } => match lead_id {
            Some(id) => {
                let scored = service.score_lead(&id).await?;
                if json {
                    return print_json(&scored);
                }
                print_score_detail(&scored);
                Ok(())
            }
            None => {
                let ranked = service.score_leads().await?;
                if json {
                    return print_json(&ranked);
                }
                println!("{:>5} {:>5} {:>10}  Company", "Score", "Win%", "Value");
                for scored in &ranked {
                    println!(
                        "{:>5} {:>5} {:>10}  {}",
                        scored.opportunity_score,
                        scored.win_probability,
                        format!("${}", scored.estimated_value),
                        scored.lead.display_company()
                    );
                }
                Ok(())
            }
        },
        LeadAction::Enrich { lead_id } => {
            let lead = service.enrich_lead(&lead_id).await?;
            println!("Enriched {}", lead.display_company());
            println!("  Email:    {}", lead.email.as_deref().unwrap_or("-"));
            println!("  Phone:    {}", lead.phone.as_deref().unwrap_or("-"));
            println!("  LinkedIn: {}", lead.linkedin_url.as_deref().unwrap_or("-"));
            Ok(())
        }
        LeadAction::Delete { lead_id } => {
            service.delete_lead(&lead_id).await?;
            println!("Lead deleted: {lead_id}");
            Ok(())
        }
    }
}

fn print_score_detail(scored: &ScoredLead) {
    println!();
    println!("  {}", scored.lead.display_company());
    println!("  Opportunity: {}", scored.opportunity_score);
    println!("  Company fit: {}", scored.company_fit_score);
    for reason in &scored.score_breakdown.company_fit {
        println!("      {reason}");
    }
    println!("  Engagement:  {}", scored.engagement_score);
    for reason in &scored.score_breakdown.engagement {
        println!("      {reason}");
    }
    println!("  Timing:      {}", scored.timing_score);
    for reason in &scored.score_breakdown.timing {
        println!("      {reason}");
    }
    println!("  Win chance:  {}%", scored.win_probability);
    println!("  Est. value:  ${}", scored.estimated_value);
    println!();
}

// ---------------------------------------------------------------------------
// Activities
// ---------------------------------------------------------------------------

async fn run_activity(service: &LeadService, action: ActivityAction) -> Result<()> {
    match action {
        ActivityAction::Add {
            lead_id,
            kind,
            content,
            by,
            follow_up_date,
            follow_up_action,
        } => {
            let activity = service
                .create_lead_activity(
                    &lead_id,
                    NewActivity {
                        kind,
                        content,
                        created_by: by,
                        follow_up_date,
                        follow_up_action,
                    },
                )
                .await?;
            println!("Activity logged: {}", activity.id);
            Ok(())
        }
        ActivityAction::List { lead_id } => {
            let activities = service.get_lead_activities(&lead_id).await?;
            if activities.is_empty() {
                println!("No activities for this lead.");
            }
            for activity in &activities {
                let follow_up = match (activity.follow_up_date, activity.follow_up_completed) {
                    (Some(date), false) => format!("  (follow up {date})"),
                    (Some(_), true) => "  (follow-up done)".to_string(),
                    (None, _) => String::new(),
                };
                println!(
                    "{}  {}  {:<8} {}{follow_up}",
                    activity.id,
                    activity.created_at.format("%Y-%m-%d"),
                    activity.kind,
                    activity.content
                );
            }
            Ok(())
        }
        ActivityAction::Edit {
            activity_id,
            kind,
            content,
            follow_up_date,
            follow_up_action,
            completed,
        } => {
            let update = ActivityUpdate {
                kind,
                content,
                follow_up_date,
                follow_up_action,
                follow_up_completed: completed.then_some(true),
            };
            let activity = service.update_lead_activity(&activity_id, update).await?;
            println!("Activity updated: {}", activity.id);
            Ok(())
        }
        ActivityAction::Delete { activity_id } => {
            service.delete_lead_activity(&activity_id).await?;
            println!("Activity deleted: {activity_id}");
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

async fn run_stage(service: &LeadService, action: StageAction) -> Result<()> {
    let (lead_id, stage) = match action {
        StageAction::Status { lead_id } => return cmd_stage_status(service, &lead_id).await,
        StageAction::Run { lead_id } => return cmd_stage_run(service, &lead_id).await,
        StageAction::Geo { lead_id } => (lead_id, Stage::GeoEnrichment),
        StageAction::Property { lead_id } => (lead_id, Stage::PropertyAnalysis),
        StageAction::Service { lead_id } => (lead_id, Stage::ServiceMapping),
    };

    info!(lead_id = %lead_id, stage = %stage, "running stage");
    let cancel = cancel_on_ctrl_c();
    let reporter = CliProgress::new();
    reporter.phase(stage.label());

    let result = match stage {
        Stage::GeoEnrichment => service.get_geo_enrichment(&lead_id, &cancel).await,
        Stage::PropertyAnalysis => service.get_property_analysis(&lead_id, &cancel).await,
        Stage::ServiceMapping => service.get_service_mapping(&lead_id, &cancel).await,
    };
    reporter.finish();
    let lead = result?;

    println!("{} complete for {}", stage.label(), lead.display_company());
    Ok(())
}

async fn cmd_stage_status(service: &LeadService, lead_id: &str) -> Result<()> {
    for snapshot in service.stage_states(lead_id).await? {
        let state = match &snapshot.state {
            StageState::Pending => "pending".to_string(),
            StageState::Running => "running".to_string(),
            StageState::Complete => "complete".to_string(),
            StageState::Blocked(reason) => format!("blocked: {reason}"),
            StageState::Failed(error) => format!("failed: {error}"),
        };
        let runnable = if snapshot.can_run { "ready" } else { "" };
        println!("{:<20} {:<40} {runnable}", snapshot.stage.label(), state);
    }
    Ok(())
}

async fn cmd_stage_run(service: &LeadService, lead_id: &str) -> Result<()> {
    let cancel = cancel_on_ctrl_c();
    let reporter = CliProgress::new();
    let result = service.run_full_analysis(lead_id, &cancel, &reporter).await;
    reporter.finish();
    let report = result?;

    println!();
    println!("  Analysis finished for {}", report.lead.display_company());
    for stage in &report.completed {
        println!("  ran      {}", stage.label());
    }
    for stage in &report.skipped {
        println!("  skipped  {} (already complete)", stage.label());
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Research
// ---------------------------------------------------------------------------

async fn run_research(service: &LeadService, action: ResearchAction) -> Result<()> {
    match action {
        ResearchAction::Competitors { lead_id } => {
            let competitors = service.competitors(&lead_id).await?;
            if competitors.is_empty() {
                println!("No competitors found nearby.");
            }
            for competitor in &competitors {
                let rating = competitor
                    .rating
                    .map(|r| format!("{r:.1}"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<40} {rating:>4} ({} reviews)  {}",
                    competitor.name,
                    competitor.review_count.unwrap_or(0),
                    competitor.address.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
        ResearchAction::Bundle { lead_id } => print_json(&service.research(&lead_id).await?),
        ResearchAction::Social { lead_id } => print_json(&service.social_presence(&lead_id).await?),
    }
}

// ---------------------------------------------------------------------------
// Campaigns
// ---------------------------------------------------------------------------

async fn run_campaign(service: &LeadService, action: CampaignAction) -> Result<()> {
    match action {
        CampaignAction::Create { name, description } => {
            let campaign = service.create_campaign(&name, description.as_deref()).await?;
            println!("Campaign created: {}", campaign.id);
            Ok(())
        }
        CampaignAction::List => {
            for campaign in service.list_campaigns().await? {
                println!("{}  {:<32} {}", campaign.id, campaign.name, campaign.status);
            }
            Ok(())
        }
        CampaignAction::Steps { campaign_id, file } => {
            let raw = std::fs::read_to_string(&file)
                .wrap_err_with(|| format!("cannot read steps file '{}'", file.display()))?;
            let steps: Vec<CampaignStep> = serde_json::from_str(&raw)
                .wrap_err_with(|| format!("'{}' is not a JSON array of steps", file.display()))?;
            let saved = service.set_campaign_steps(&campaign_id, steps).await?;
            println!("Saved {} step(s)", saved.len());
            for step in &saved {
                println!(
                    "  {}. {:<8} day +{}",
                    step.step_number, step.channel, step.delay_days
                );
            }
            Ok(())
        }
        CampaignAction::AddLeads {
            campaign_id,
            lead_ids,
        } => {
            let added = service.add_campaign_leads(&campaign_id, &lead_ids).await?;
            println!("Added {added} lead(s) to the campaign");
            Ok(())
        }
        CampaignAction::Enrich { campaign_id } => {
            let cancel = cancel_on_ctrl_c();
            let reporter = CliProgress::new();
            let result = service.enrich_campaign_leads(&campaign_id, &cancel, &reporter).await;
            reporter.finish();
            let progress = result?;
            println!();
            println!("  Enrichment finished{}", if progress.cancelled { " (cancelled)" } else { "" });
            println!("  Enriched: {}", progress.completed);
            println!("  Skipped:  {}", progress.skipped);
            println!("  Failed:   {}", progress.failed);
            println!("  Total:    {}", progress.total);
            println!();
            Ok(())
        }
        CampaignAction::Generate { campaign_id } => {
            let cancel = cancel_on_ctrl_c();
            let reporter = CliProgress::new();
            let result = service.generate_messages(&campaign_id, &cancel, &reporter).await;
            reporter.finish();
            let progress = result?;
            println!();
            println!("  Generation finished{}", if progress.cancelled { " (cancelled)" } else { "" });
            println!("  Generated: {}", progress.completed);
            println!("  Existing:  {}", progress.skipped);
            println!("  Failed:    {}", progress.failed);
            println!();
            Ok(())
        }
        CampaignAction::Messages { campaign_id } => {
            let messages = service.list_generated_messages(&campaign_id).await?;
            if messages.is_empty() {
                println!("No messages generated yet.");
            }
            for message in &messages {
                println!(
                    "--- {} | lead {} | step {} | {}",
                    message.id, message.lead_id, message.step_number, message.status
                );
                if let Some(subject) = &message.subject {
                    println!("Subject: {subject}");
                }
                println!("{}", message.body);
                println!();
            }
            Ok(())
        }
        CampaignAction::EditMessage {
            message_id,
            subject,
            body,
            status,
        } => {
            let update = MessageUpdate {
                subject,
                body,
                status,
            };
            let message = service.update_generated_message(&message_id, &update).await?;
            println!("Message {} is now {}", message.id, message.status);
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Settings and config
// ---------------------------------------------------------------------------

fn cmd_settings(service: &LeadService) -> Result<()> {
    let settings = service.get_settings();
    let mark = |on: bool| if on { "configured" } else { "missing" };
    println!("  OpenAI:        {}", mark(settings.openai));
    println!("  Perplexity:    {}", mark(settings.perplexity));
    println!("  Google Maps:   {}", mark(settings.google_maps));
    println!("  Google Search: {}", mark(settings.google_search));
    println!("  Apollo:        {}", mark(settings.apollo));
    println!("  Model:         {}", settings.openai_model);
    println!("  Category:      {}", settings.service_category);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_status_change() {
        let cli = Cli::try_parse_from([
            "leadforge", "lead", "status", "L1", "--status", "qualified", "--qualification", "hot",
        ])
        .unwrap();
        match cli.command {
            Command::Lead {
                action:
                    LeadAction::Status {
                        lead_id,
                        status,
                        qualification,
                    },
            } => {
                assert_eq!(lead_id, "L1");
                assert_eq!(status, Some(LeadStatus::Qualified));
                assert_eq!(qualification, Some(QualificationLevel::Hot));
            }
            _ => panic!("expected lead status"),
        }
    }

    #[test]
    fn rejects_unknown_activity_kind() {
        let err = Cli::try_parse_from([
            "leadforge", "activity", "add", "L1", "--kind", "fax", "--content", "x",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn follow_up_date_parses_iso() {
        let cli = Cli::try_parse_from([
            "leadforge",
            "activity",
            "add",
            "L1",
            "--content",
            "left voicemail",
            "--follow-up-date",
            "2026-11-02",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Activity {
                action: ActivityAction::Add {
                    kind, follow_up_date, ..
                },
            } => {
                assert_eq!(kind, ActivityKind::Note);
                assert_eq!(follow_up_date, NaiveDate::from_ymd_opt(2026, 11, 2));
            }
            _ => panic!("expected activity add"),
        }
    }
}
