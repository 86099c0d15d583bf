//! Campaign sequences: membership, bulk contact enrichment, and bulk
//! message generation.
//!
//! Bulk work runs one item at a time, reports after every item, checks the
//! cancellation flag before each external request, and counts per-item
//! failures instead of aborting.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use leadforge_llm::{ChatClient, ChatMessage};
use leadforge_shared::{
    Campaign, CampaignStatus, CampaignStep, Channel, GeneratedMessage, Lead, LeadForgeError, MessageStatus,
    Result, new_id,
};
use leadforge_storage::Storage;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::cancel::CancelFlag;
use crate::contacts::{ApolloClient, enrich_lead};
use crate::progress::{BulkProgress, ProgressReporter};

/// Default pause between Apollo calls during bulk enrichment.
pub const DEFAULT_BULK_DELAY: Duration = Duration::from_millis(500);

/// Create a draft campaign.
pub async fn create_campaign(storage: &Storage, name: &str, description: Option<&str>) -> Result<Campaign> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LeadForgeError::validation("campaign name must not be empty"));
    }
    let campaign = Campaign {
        id: new_id(),
        name: name.to_string(),
        description: description.map(str::trim).filter(|d| !d.is_empty()).map(str::to_string),
        status: CampaignStatus::Draft,
        created_at: Utc::now(),
    };
    storage.insert_campaign(&campaign).await?;
    info!(campaign_id = %campaign.id, "campaign created");
    Ok(campaign)
}

/// Replace all steps of a campaign. Step numbers must be unique and ≥ 1.
pub async fn set_campaign_steps(
    storage: &Storage,
    campaign_id: &str,
    mut steps: Vec<CampaignStep>,
) -> Result<Vec<CampaignStep>> {
    storage.require_campaign(campaign_id).await?;

    let mut seen = HashSet::new();
    for step in &steps {
        if step.step_number == 0 {
            return Err(LeadForgeError::validation("step numbers start at 1"));
        }
        if !seen.insert(step.step_number) {
            return Err(LeadForgeError::validation(format!(
                "duplicate step number {}",
                step.step_number
            )));
        }
    }
    steps.sort_by_key(|s| s.step_number);

    storage.replace_campaign_steps(campaign_id, &steps).await?;
    Ok(steps)
}

/// Add existing leads to a campaign. Returns how many were newly added.
pub async fn add_campaign_leads(storage: &Storage, campaign_id: &str, lead_ids: &[String]) -> Result<usize> {
    storage.require_campaign(campaign_id).await?;
    for id in lead_ids {
        storage.require_lead(id).await?;
    }
    storage.add_campaign_leads(campaign_id, lead_ids).await
}

/// Enrich every campaign lead through Apollo, one at a time.
///
/// Leads already enriched are skipped. Returns the final tally; a
/// cancelled run returns normally with `cancelled` set.
#[instrument(skip_all, fields(campaign_id = %campaign_id))]
pub async fn enrich_campaign_leads(
    storage: &Storage,
    apollo: &ApolloClient,
    campaign_id: &str,
    delay: Duration,
    cancel: &CancelFlag,
    progress: &dyn ProgressReporter,
) -> Result<BulkProgress> {
    storage.require_campaign(campaign_id).await?;
    let lead_ids = storage.list_campaign_lead_ids(campaign_id).await?;
    let mut tally = BulkProgress::new(lead_ids.len());
    progress.phase("Enriching contacts");

    let mut called = false;
    for lead_id in &lead_ids {
        let lead = match storage.get_lead(lead_id).await? {
            Some(lead) if lead.enrichment_status.is_enriched() => {
                tally.skipped += 1;
                progress.advance(&tally, &lead.name);
                continue;
            }
            Some(lead) => lead,
            None => {
                tally.failed += 1;
                progress.advance(&tally, lead_id);
                continue;
            }
        };

        if called && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if cancel.is_cancelled() {
            tally.cancelled = true;
            break;
        }

        called = true;
        match enrich_lead(storage, apollo, lead_id).await {
            Ok(_) => tally.completed += 1,
            Err(e) => {
                warn!(lead_id = %lead_id, error = %e, "lead enrichment failed");
                tally.failed += 1;
            }
        }
        progress.advance(&tally, &lead.name);
    }

    info!(
        completed = tally.completed,
        failed = tally.failed,
        skipped = tally.skipped,
        cancelled = tally.cancelled,
        "bulk enrichment finished"
    );
    Ok(tally)
}

#[derive(Debug, Deserialize)]
struct DraftReply {
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body: String,
}

/// Generate a draft message for every campaign lead × step.
///
/// Pairs that already have a message are skipped, so a partial run can be
/// resumed.
#[instrument(skip_all, fields(campaign_id = %campaign_id))]
pub async fn generate_messages(
    storage: &Storage,
    openai: &ChatClient,
    campaign_id: &str,
    cancel: &CancelFlag,
    progress: &dyn ProgressReporter,
) -> Result<BulkProgress> {
    let campaign = storage.require_campaign(campaign_id).await?;
    let steps = storage.list_campaign_steps(campaign_id).await?;
    if steps.is_empty() {
        return Err(LeadForgeError::validation(format!(
            "campaign '{}' has no steps",
            campaign.name
        )));
    }
    let lead_ids = storage.list_campaign_lead_ids(campaign_id).await?;
    let existing: HashSet<(String, u32)> = storage
        .list_messages(campaign_id)
        .await?
        .into_iter()
        .map(|m| (m.lead_id, m.step_number))
        .collect();

    let mut tally = BulkProgress::new(lead_ids.len() * steps.len());
    progress.phase("Generating messages");

    'leads: for lead_id in &lead_ids {
        let Some(lead) = storage.get_lead(lead_id).await? else {
            tally.failed += steps.len();
            progress.advance(&tally, lead_id);
            continue;
        };

        for step in &steps {
            if existing.contains(&(lead.id.clone(), step.step_number)) {
                tally.skipped += 1;
                progress.advance(&tally, &lead.name);
                continue;
            }
            if cancel.is_cancelled() {
                tally.cancelled = true;
                break 'leads;
            }

            match draft_message(openai, &campaign, &lead, step).await {
                Ok(message) => {
                    storage.insert_message(&message).await?;
                    tally.completed += 1;
                }
                Err(e) => {
                    warn!(lead_id = %lead.id, step = step.step_number, error = %e, "message generation failed");
                    tally.failed += 1;
                }
            }
            progress.advance(&tally, &format!("{} · step {}", lead.name, step.step_number));
        }
    }

    info!(
        completed = tally.completed,
        failed = tally.failed,
        skipped = tally.skipped,
        cancelled = tally.cancelled,
        "message generation finished"
    );
    Ok(tally)
}

async fn draft_message(
    openai: &ChatClient,
    campaign: &Campaign,
    lead: &Lead,
    step: &CampaignStep,
) -> Result<GeneratedMessage> {
    let messages = [
        ChatMessage::system(
            "You write concise, specific B2B outreach for a commercial services company. \
             Reply with a JSON object {\"subject\": string|null, \"body\": string}.",
        ),
        ChatMessage::user(message_prompt(campaign, lead, step)),
    ];
    let reply: DraftReply = openai.complete_json(&messages).await?;
    let body = reply.body.trim();
    if body.is_empty() {
        return Err(LeadForgeError::parse("generated message has an empty body"));
    }

    let subject = match step.channel {
        Channel::Email => reply
            .subject
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| step.subject.clone()),
        Channel::Linkedin | Channel::Call => None,
    };

    let now = Utc::now();
    Ok(GeneratedMessage {
        id: new_id(),
        campaign_id: campaign.id.clone(),
        lead_id: lead.id.clone(),
        step_number: step.step_number,
        subject,
        body: body.to_string(),
        status: MessageStatus::Draft,
        created_at: now,
        updated_at: now,
    })
}

fn message_prompt(campaign: &Campaign, lead: &Lead, step: &CampaignStep) -> String {
    let format_hint = match step.channel {
        Channel::Email => "an email under 150 words with a subject line",
        Channel::Linkedin => "a LinkedIn message under 80 words, no subject",
        Channel::Call => "a 30-second phone opener script, no subject",
    };

    let mut context = vec![
        format!("Prospect: {} ({})", lead.name, if lead.title.is_empty() { "unknown title" } else { &lead.title }),
        format!("Company: {}", lead.display_company()),
    ];
    if let Some(city) = lead.city.as_deref() {
        context.push(format!("Location: {city}{}", lead.state.as_deref().map(|s| format!(", {s}")).unwrap_or_default()));
    }
    if let Some(property) = &lead.property_analysis {
        context.push(format!("Property: {} ({})", property.property_type.replace('_', " "), property.quality));
    }
    if let Some(mapping) = &lead.service_mapping {
        if let Some(summary) = mapping.executive_summary.as_deref() {
            context.push(format!("Opportunity summary: {summary}"));
        }
        let points = &mapping.actionable_insights.talking_points;
        if !points.is_empty() {
            context.push(format!("Talking points:\n- {}", points.join("\n- ")));
        }
    }

    format!(
        "Campaign: {campaign}\n\
         Step {number} of the sequence, sent {delay} days after the previous step.\n\
         Write {format_hint}.\n\
         Guidance: {guidance}\n\n\
         {context}",
        campaign = campaign.name,
        number = step.step_number,
        delay = step.delay_days,
        guidance = if step.template.trim().is_empty() { "none" } else { step.template.trim() },
        context = context.join("\n"),
    )
}

/// Edits to a generated message. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct MessageUpdate {
    pub subject: Option<String>,
    pub body: Option<String>,
    pub status: Option<MessageStatus>,
}

/// Messages of a campaign.
pub async fn list_generated_messages(storage: &Storage, campaign_id: &str) -> Result<Vec<GeneratedMessage>> {
    storage.require_campaign(campaign_id).await?;
    storage.list_messages(campaign_id).await
}

/// Apply an edit and return the stored message.
pub async fn update_generated_message(
    storage: &Storage,
    message_id: &str,
    update: &MessageUpdate,
) -> Result<GeneratedMessage> {
    if update.body.as_deref().is_some_and(|b| b.trim().is_empty()) {
        return Err(LeadForgeError::validation("message body must not be empty"));
    }
    storage
        .update_message(
            message_id,
            update.subject.as_deref(),
            update.body.as_deref(),
            update.status,
        )
        .await?;
    storage
        .get_message(message_id)
        .await?
        .ok_or_else(|| LeadForgeError::NotFound(format!("message {message_id}")))
}
