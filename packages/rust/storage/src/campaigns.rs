//! Campaigns, their steps and members, and generated outreach messages.

use chrono::Utc;
use leadforge_shared::{
    Campaign, CampaignStatus, CampaignStep, GeneratedMessage, LeadForgeError, MessageStatus, Result,
};
use libsql::params;

use crate::{Storage, db_err, opt_string, parse_ts, req_string};

const MESSAGE_COLUMNS: &str =
    "id, campaign_id, lead_id, step_number, subject, body, status, created_at, updated_at";

impl Storage {
    // -----------------------------------------------------------------------
    // Campaign operations
    // -----------------------------------------------------------------------

    pub async fn insert_campaign(&self, campaign: &Campaign) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO campaigns (id, name, description, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    campaign.id.as_str(),
                    campaign.name.as_str(),
                    campaign.description.as_deref(),
                    campaign.status.as_str(),
                    campaign.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, description, status, created_at FROM campaigns WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_campaign(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Get a campaign by ID, failing with `NotFound` when absent.
    pub async fn require_campaign(&self, id: &str) -> Result<Campaign> {
        self.get_campaign(id)
            .await?
            .ok_or_else(|| LeadForgeError::NotFound(format!("campaign {id}")))
    }

    pub async fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, description, status, created_at FROM campaigns ORDER BY created_at DESC",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_campaign(&row)?);
        }
        Ok(results)
    }

    pub async fn update_campaign_status(&self, id: &str, status: CampaignStatus) -> Result<()> {
        self.check_writable()?;
        let affected = self
            .conn
            .execute(
                "UPDATE campaigns SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .await
            .map_err(db_err)?;
        if affected == 0 {
            return Err(LeadForgeError::NotFound(format!("campaign {id}")));
        }
        Ok(())
    }

    /// Replace every step of a campaign in a single transaction.
    pub async fn replace_campaign_steps(&self, campaign_id: &str, steps: &[CampaignStep]) -> Result<()> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(db_err)?;

        tx.execute(
            "DELETE FROM campaign_steps WHERE campaign_id = ?1",
            params![campaign_id],
        )
        .await
        .map_err(db_err)?;

        for step in steps {
            tx.execute(
                "INSERT INTO campaign_steps (campaign_id, step_number, channel, delay_days, subject, template)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    campaign_id,
                    step.step_number as i64,
                    step.channel.as_str(),
                    step.delay_days as i64,
                    step.subject.as_deref(),
                    step.template.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    /// Steps of a campaign in step order.
    pub async fn list_campaign_steps(&self, campaign_id: &str) -> Result<Vec<CampaignStep>> {
        let mut rows = self
            .conn
            .query(
                "SELECT step_number, channel, delay_days, subject, template
                 FROM campaign_steps WHERE campaign_id = ?1 ORDER BY step_number",
                params![campaign_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(CampaignStep {
                step_number: row.get::<u32>(0).map_err(db_err)?,
                channel: req_string(&row, 1)?
                    .parse()
                    .map_err(LeadForgeError::Storage)?,
                delay_days: row.get::<u32>(2).unwrap_or(0),
                subject: opt_string(&row, 3),
                template: opt_string(&row, 4).unwrap_or_default(),
            });
        }
        Ok(results)
    }

    /// Add leads to a campaign. Existing members are ignored; returns the
    /// number of newly added leads.
    pub async fn add_campaign_leads(&self, campaign_id: &str, lead_ids: &[String]) -> Result<usize> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let mut added = 0usize;
        for lead_id in lead_ids {
            let affected = self
                .conn
                .execute(
                    "INSERT OR IGNORE INTO campaign_leads (campaign_id, lead_id, added_at)
                     VALUES (?1, ?2, ?3)",
                    params![campaign_id, lead_id.as_str(), now.as_str()],
                )
                .await
                .map_err(db_err)?;
            added += affected as usize;
        }
        Ok(added)
    }

    /// Member lead IDs in the order they were added.
    pub async fn list_campaign_lead_ids(&self, campaign_id: &str) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT lead_id FROM campaign_leads WHERE campaign_id = ?1 ORDER BY added_at, lead_id",
                params![campaign_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(req_string(&row, 0)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Generated messages
    // -----------------------------------------------------------------------

    pub async fn insert_message(&self, message: &GeneratedMessage) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                &format!("INSERT INTO generated_messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                params![
                    message.id.as_str(),
                    message.campaign_id.as_str(),
                    message.lead_id.as_str(),
                    message.step_number as i64,
                    message.subject.as_deref(),
                    message.body.as_str(),
                    message.status.as_str(),
                    message.created_at.to_rfc3339(),
                    message.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn get_message(&self, id: &str) -> Result<Option<GeneratedMessage>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM generated_messages WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_message(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Messages of a campaign ordered by lead, then step.
    pub async fn list_messages(&self, campaign_id: &str) -> Result<Vec<GeneratedMessage>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM generated_messages
                     WHERE campaign_id = ?1 ORDER BY lead_id, step_number"
                ),
                params![campaign_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_message(&row)?);
        }
        Ok(results)
    }

    /// Patch subject, body, and/or status of a message.
    pub async fn update_message(
        &self,
        id: &str,
        subject: Option<&str>,
        body: Option<&str>,
        status: Option<MessageStatus>,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "UPDATE generated_messages SET
                   subject = COALESCE(?1, subject),
                   body = COALESCE(?2, body),
                   status = COALESCE(?3, status),
                   updated_at = ?4
                 WHERE id = ?5",
                params![subject, body, status.map(|s| s.as_str()), now, id],
            )
            .await
            .map_err(db_err)?;
        if affected == 0 {
            return Err(LeadForgeError::NotFound(format!("message {id}")));
        }
        Ok(())
    }
}

fn row_to_campaign(row: &libsql::Row) -> Result<Campaign> {
    Ok(Campaign {
        id: req_string(row, 0)?,
        name: req_string(row, 1)?,
        description: opt_string(row, 2),
        status: req_string(row, 3)?
            .parse()
            .map_err(LeadForgeError::Storage)?,
        created_at: parse_ts(&req_string(row, 4)?)?,
    })
}

fn row_to_message(row: &libsql::Row) -> Result<GeneratedMessage> {
    Ok(GeneratedMessage {
        id: req_string(row, 0)?,
        campaign_id: req_string(row, 1)?,
        lead_id: req_string(row, 2)?,
        step_number: row.get::<u32>(3).map_err(db_err)?,
        subject: opt_string(row, 4),
        body: req_string(row, 5)?,
        status: req_string(row, 6)?
            .parse()
            .map_err(LeadForgeError::Storage)?,
        created_at: parse_ts(&req_string(row, 7)?)?,
        updated_at: parse_ts(&req_string(row, 8)?)?,
    })
}
