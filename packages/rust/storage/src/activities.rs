//! Activity log persistence.

use chrono::{NaiveDate, Utc};
use leadforge_shared::{Activity, LeadForgeError, Result};
use libsql::params;

use crate::{Storage, db_err, opt_string, opt_ts, parse_ts, req_string};

const ACTIVITY_COLUMNS: &str = "id, lead_id, kind, content, created_by, created_at, updated_at,
    follow_up_date, follow_up_action, follow_up_completed";

impl Storage {
    /// Insert a new activity. The lead must exist.
    pub async fn insert_activity(&self, activity: &Activity) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                &format!("INSERT INTO activities ({ACTIVITY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
                params![
                    activity.id.as_str(),
                    activity.lead_id.as_str(),
                    activity.kind.as_str(),
                    activity.content.as_str(),
                    activity.created_by.as_deref(),
                    activity.created_at.to_rfc3339(),
                    activity.updated_at.map(|t| t.to_rfc3339()),
                    activity.follow_up_date.map(|d| d.to_string()),
                    activity.follow_up_action.as_deref(),
                    activity.follow_up_completed as i64,
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Get an activity by ID.
    pub async fn get_activity(&self, id: &str) -> Result<Option<Activity>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_activity(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// All activities for a lead, newest first.
    pub async fn list_activities(&self, lead_id: &str) -> Result<Vec<Activity>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE lead_id = ?1 ORDER BY created_at DESC"
                ),
                params![lead_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_activity(&row)?);
        }
        Ok(results)
    }

    /// Every activity across all leads (for batch scoring).
    pub async fn list_all_activities(&self) -> Result<Vec<Activity>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ACTIVITY_COLUMNS} FROM activities ORDER BY lead_id, created_at"),
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_activity(&row)?);
        }
        Ok(results)
    }

    /// Overwrite the editable fields of an activity. `created_at` is never
    /// touched; `updated_at` is set to now.
    pub async fn update_activity(&self, activity: &Activity) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "UPDATE activities SET
                   kind = ?1, content = ?2, follow_up_date = ?3,
                   follow_up_action = ?4, follow_up_completed = ?5, updated_at = ?6
                 WHERE id = ?7",
                params![
                    activity.kind.as_str(),
                    activity.content.as_str(),
                    activity.follow_up_date.map(|d| d.to_string()),
                    activity.follow_up_action.as_deref(),
                    activity.follow_up_completed as i64,
                    now,
                    activity.id.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        if affected == 0 {
            return Err(LeadForgeError::NotFound(format!("activity {}", activity.id)));
        }
        Ok(())
    }

    /// Delete an activity. Returns `NotFound` if it did not exist.
    pub async fn delete_activity(&self, id: &str) -> Result<()> {
        self.check_writable()?;
        let affected = self
            .conn
            .execute("DELETE FROM activities WHERE id = ?1", params![id])
            .await
            .map_err(db_err)?;
        if affected == 0 {
            return Err(LeadForgeError::NotFound(format!("activity {id}")));
        }
        Ok(())
    }
}

fn row_to_activity(row: &libsql::Row) -> Result<Activity> {
    let kind_raw = req_string(row, 2)?;
    Ok(Activity {
        id: req_string(row, 0)?,
        lead_id: req_string(row, 1)?,
        kind: kind_raw.parse().map_err(LeadForgeError::Storage)?,
        content: opt_string(row, 3).unwrap_or_default(),
        created_by: opt_string(row, 4),
        created_at: parse_ts(&req_string(row, 5)?)?,
        updated_at: opt_ts(row, 6),
        follow_up_date: opt_string(row, 7)
            .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        follow_up_action: opt_string(row, 8),
        follow_up_completed: row.get::<i64>(9).unwrap_or(0) != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_storage;
    use leadforge_shared::{ActivityKind, ErrorKind, Lead, new_id};

    fn activity(lead_id: &str, kind: ActivityKind, content: &str) -> Activity {
        Activity {
            id: new_id(),
            lead_id: lead_id.to_string(),
            kind,
            content: content.to_string(),
            created_by: Some("rep@leadforge.example".into()),
            created_at: Utc::now(),
            updated_at: None,
            follow_up_date: None,
            follow_up_action: None,
            follow_up_completed: false,
        }
    }

    #[tokio::test]
    async fn activity_crud() {
        let storage = test_storage().await;
        let lead = Lead::new("Dana", "Acme");
        storage.insert_lead(&lead).await.unwrap();

        let mut call = activity(&lead.id, ActivityKind::Call, "Intro call, asked about irrigation audit");
        call.follow_up_date = NaiveDate::from_ymd_opt(2026, 11, 2);
        call.follow_up_action = Some("Send proposal".into());
        storage.insert_activity(&call).await.unwrap();
        storage
            .insert_activity(&activity(&lead.id, ActivityKind::Note, "Gatekeeper is Pat"))
            .await
            .unwrap();

        let listed = storage.list_activities(&lead.id).await.unwrap();
        assert_eq!(listed.len(), 2);

        call.follow_up_completed = true;
        call.content = "Intro call done".into();
        storage.update_activity(&call).await.unwrap();
        let found = storage.get_activity(&call.id).await.unwrap().unwrap();
        assert!(found.follow_up_completed);
        assert_eq!(found.follow_up_date, NaiveDate::from_ymd_opt(2026, 11, 2));
        assert!(found.updated_at.is_some());
        assert_eq!(found.created_at.timestamp(), call.created_at.timestamp());

        storage.delete_activity(&call.id).await.unwrap();
        let err = storage.delete_activity(&call.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn deleting_lead_cascades_activities() {
        let storage = test_storage().await;
        let lead = Lead::new("Dana", "Acme");
        storage.insert_lead(&lead).await.unwrap();
        storage
            .insert_activity(&activity(&lead.id, ActivityKind::Email, "Sent brochure"))
            .await
            .unwrap();

        storage.delete_lead(&lead.id).await.unwrap();
        assert!(storage.list_activities(&lead.id).await.unwrap().is_empty());
    }
}
