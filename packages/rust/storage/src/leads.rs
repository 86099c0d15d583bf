//! Lead records, stage payload writes, and stage run bookkeeping.

use chrono::Utc;
use leadforge_shared::{
    GeoEnrichment, Lead, LeadForgeError, LeadStatus, PropertyAnalysis, QualificationLevel, Result,
    ServiceMapping, Stage,
};
use libsql::params;

use crate::{Storage, db_err, opt_json, opt_string, opt_ts, parse_ts, req_string, to_json};

const LEAD_COLUMNS: &str = "id, name, title, company, email, phone, linkedin_url, website,
    street, city, state, postal_code, industry, employee_count, apollo_id,
    enrichment_status, status, qualification_level, created_at, updated_at, enriched_at,
    geo_enrichment_json, property_analysis_json, service_mapping_json";

/// Persisted state of a stage that is in flight or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRunState {
    Running,
    Failed,
}

impl StageRunState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Failed => "failed",
        }
    }
}

/// A `stage_runs` row.
#[derive(Debug, Clone)]
pub struct StageRun {
    pub stage: Stage,
    pub state: StageRunState,
    pub error: Option<String>,
    pub updated_at: chrono::DateTime<Utc>,
}

impl Storage {
    // -----------------------------------------------------------------------
    // Lead operations
    // -----------------------------------------------------------------------

    /// Insert a new lead, including any payloads it already carries.
    ///
    /// Payloads must form a prefix of the stage chain: a lead carrying a
    /// payload whose prerequisite is absent is rejected with `StageBlocked`.
    pub async fn insert_lead(&self, lead: &Lead) -> Result<()> {
        self.check_writable()?;
        for stage in Stage::ALL {
            if let Some(prerequisite) = stage.prerequisite() {
                if stage.is_present_on(lead) && !prerequisite.is_present_on(lead) {
                    return Err(LeadForgeError::StageBlocked {
                        stage,
                        reason: format!("{prerequisite} has not completed"),
                    });
                }
            }
        }
        let now = Utc::now();
        let created_at = lead.created_at.unwrap_or(now).to_rfc3339();
        let updated_at = lead.updated_at.unwrap_or(now).to_rfc3339();
        let geo = lead.geo_enrichment.as_ref().map(to_json).transpose()?;
        let property = lead.property_analysis.as_ref().map(to_json).transpose()?;
        let service = lead.service_mapping.as_ref().map(to_json).transpose()?;

        self.conn
            .execute(
                &format!("INSERT INTO leads ({LEAD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)"),
                params![
                    lead.id.as_str(),
                    lead.name.as_str(),
                    lead.title.as_str(),
                    lead.company.as_str(),
                    lead.email.as_deref(),
                    lead.phone.as_deref(),
                    lead.linkedin_url.as_deref(),
                    lead.website.as_deref(),
                    lead.street.as_deref(),
                    lead.city.as_deref(),
                    lead.state.as_deref(),
                    lead.postal_code.as_deref(),
                    lead.industry.as_deref(),
                    lead.employee_count,
                    lead.apollo_id.as_deref(),
                    lead.enrichment_status.as_str(),
                    lead.status.as_str(),
                    lead.qualification_level.map(|q| q.as_str()),
                    created_at,
                    updated_at,
                    lead.enriched_at.map(|t| t.to_rfc3339()),
                    geo,
                    property,
                    service,
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Get a lead by ID.
    pub async fn get_lead(&self, id: &str) -> Result<Option<Lead>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_lead(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Get a lead by ID, failing with `NotFound` when absent.
    pub async fn require_lead(&self, id: &str) -> Result<Lead> {
        self.get_lead(id)
            .await?
            .ok_or_else(|| LeadForgeError::NotFound(format!("lead {id}")))
    }

    /// List all leads, newest first.
    pub async fn list_leads(&self) -> Result<Vec<Lead>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads ORDER BY created_at DESC"),
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_lead(&row)?);
        }
        Ok(results)
    }

    /// Overwrite the identity, contact, and enrichment columns of a lead.
    ///
    /// Stage payloads are untouched; they are only written through
    /// [`Storage::write_stage_payload`]. Last write wins.
    pub async fn update_lead(&self, lead: &Lead) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "UPDATE leads SET
                   name = ?1, title = ?2, company = ?3, email = ?4, phone = ?5,
                   linkedin_url = ?6, website = ?7, street = ?8, city = ?9, state = ?10,
                   postal_code = ?11, industry = ?12, employee_count = ?13, apollo_id = ?14,
                   enrichment_status = ?15, enriched_at = ?16, updated_at = ?17
                 WHERE id = ?18",
                params![
                    lead.name.as_str(),
                    lead.title.as_str(),
                    lead.company.as_str(),
                    lead.email.as_deref(),
                    lead.phone.as_deref(),
                    lead.linkedin_url.as_deref(),
                    lead.website.as_deref(),
                    lead.street.as_deref(),
                    lead.city.as_deref(),
                    lead.state.as_deref(),
                    lead.postal_code.as_deref(),
                    lead.industry.as_deref(),
                    lead.employee_count,
                    lead.apollo_id.as_deref(),
                    lead.enrichment_status.as_str(),
                    lead.enriched_at.map(|t| t.to_rfc3339()),
                    now,
                    lead.id.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        if affected == 0 {
            return Err(LeadForgeError::NotFound(format!("lead {}", lead.id)));
        }
        Ok(())
    }

    /// Update pipeline status and/or qualification level.
    pub async fn update_lead_status(
        &self,
        id: &str,
        status: Option<LeadStatus>,
        qualification: Option<QualificationLevel>,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "UPDATE leads SET
                   status = COALESCE(?1, status),
                   qualification_level = COALESCE(?2, qualification_level),
                   updated_at = ?3
                 WHERE id = ?4",
                params![
                    status.map(|s| s.as_str()),
                    qualification.map(|q| q.as_str()),
                    now,
                    id
                ],
            )
            .await
            .map_err(db_err)?;
        if affected == 0 {
            return Err(LeadForgeError::NotFound(format!("lead {id}")));
        }
        Ok(())
    }

    /// Delete a lead and (via cascade) its activities and stage runs.
    pub async fn delete_lead(&self, id: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute("DELETE FROM leads WHERE id = ?1", params![id])
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stage payloads
    // -----------------------------------------------------------------------

    /// Persist a stage payload, enforcing the prerequisite at write time.
    ///
    /// Returns `StageBlocked` if the prerequisite payload is absent and
    /// `NotFound` if the lead does not exist.
    pub async fn write_stage_payload(&self, lead_id: &str, stage: Stage, payload_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let sql = match stage {
            Stage::GeoEnrichment => {
                "UPDATE leads SET geo_enrichment_json = ?1, updated_at = ?2 WHERE id = ?3"
            }
            Stage::PropertyAnalysis => {
                "UPDATE leads SET property_analysis_json = ?1, updated_at = ?2
                 WHERE id = ?3 AND geo_enrichment_json IS NOT NULL"
            }
            Stage::ServiceMapping => {
                "UPDATE leads SET service_mapping_json = ?1, updated_at = ?2
                 WHERE id = ?3 AND property_analysis_json IS NOT NULL"
            }
        };

        let affected = self
            .conn
            .execute(sql, params![payload_json, now, lead_id])
            .await
            .map_err(db_err)?;

        if affected > 0 {
            return Ok(());
        }

        self.require_lead(lead_id).await?;
        let prerequisite = stage.prerequisite().map(|p| p.label()).unwrap_or("prerequisite");
        Err(LeadForgeError::StageBlocked {
            stage,
            reason: format!("{prerequisite} has not completed"),
        })
    }

    pub async fn set_geo_enrichment(&self, lead_id: &str, geo: &GeoEnrichment) -> Result<()> {
        self.write_stage_payload(lead_id, Stage::GeoEnrichment, &to_json(geo)?)
            .await
    }

    pub async fn set_property_analysis(&self, lead_id: &str, analysis: &PropertyAnalysis) -> Result<()> {
        self.write_stage_payload(lead_id, Stage::PropertyAnalysis, &to_json(analysis)?)
            .await
    }

    pub async fn set_service_mapping(&self, lead_id: &str, mapping: &ServiceMapping) -> Result<()> {
        self.write_stage_payload(lead_id, Stage::ServiceMapping, &to_json(mapping)?)
            .await
    }

    // -----------------------------------------------------------------------
    // Stage runs
    // -----------------------------------------------------------------------

    /// Record that `stage` is in flight for `lead_id`.
    pub async fn mark_stage_running(&self, lead_id: &str, stage: Stage) -> Result<()> {
        self.upsert_stage_run(lead_id, stage, StageRunState::Running, None)
            .await
    }

    /// Record a failed run of `stage` with its error message.
    pub async fn mark_stage_failed(&self, lead_id: &str, stage: Stage, error: &str) -> Result<()> {
        self.upsert_stage_run(lead_id, stage, StageRunState::Failed, Some(error))
            .await
    }

    async fn upsert_stage_run(
        &self,
        lead_id: &str,
        stage: Stage,
        state: StageRunState,
        error: Option<&str>,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO stage_runs (lead_id, stage, state, error, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(lead_id, stage) DO UPDATE SET
                   state = excluded.state,
                   error = excluded.error,
                   updated_at = excluded.updated_at",
                params![lead_id, stage.as_str(), state.as_str(), error, now],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Forget any running/failed marker for `stage` (after success).
    pub async fn clear_stage_run(&self, lead_id: &str, stage: Stage) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "DELETE FROM stage_runs WHERE lead_id = ?1 AND stage = ?2",
                params![lead_id, stage.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// All stage run markers for a lead.
    pub async fn list_stage_runs(&self, lead_id: &str) -> Result<Vec<StageRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT stage, state, error, updated_at FROM stage_runs WHERE lead_id = ?1",
                params![lead_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let stage_raw = req_string(&row, 0)?;
            let Ok(stage) = stage_raw.parse::<Stage>() else {
                tracing::warn!(stage = %stage_raw, "skipping unknown stage run");
                continue;
            };
            let state = match req_string(&row, 1)?.as_str() {
                "running" => StageRunState::Running,
                _ => StageRunState::Failed,
            };
            results.push(StageRun {
                stage,
                state,
                error: opt_string(&row, 2),
                updated_at: parse_ts(&req_string(&row, 3)?)?,
            });
        }
        Ok(results)
    }
}

/// Convert a database row to a [`Lead`].
fn row_to_lead(row: &libsql::Row) -> Result<Lead> {
    Ok(Lead {
        id: req_string(row, 0)?,
        name: req_string(row, 1)?,
        title: opt_string(row, 2).unwrap_or_default(),
        company: opt_string(row, 3).unwrap_or_default(),
        email: opt_string(row, 4),
        phone: opt_string(row, 5),
        linkedin_url: opt_string(row, 6),
        website: opt_string(row, 7),
        street: opt_string(row, 8),
        city: opt_string(row, 9),
        state: opt_string(row, 10),
        postal_code: opt_string(row, 11),
        industry: opt_string(row, 12),
        employee_count: row.get::<i64>(13).ok(),
        apollo_id: opt_string(row, 14),
        enrichment_status: opt_string(row, 15)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default(),
        status: opt_string(row, 16)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default(),
        qualification_level: opt_string(row, 17).and_then(|s| s.parse().ok()),
        created_at: opt_ts(row, 18),
        updated_at: opt_ts(row, 19),
        enriched_at: opt_ts(row, 20),
        geo_enrichment: opt_json(row, 21, "geo_enrichment_json"),
        property_analysis: opt_json(row, 22, "property_analysis_json"),
        service_mapping: opt_json(row, 23, "service_mapping_json"),
    })
}
