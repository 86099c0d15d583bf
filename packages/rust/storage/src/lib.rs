//! libSQL storage layer for leads, activities, stage runs, and campaigns.
//!
//! The [`Storage`] struct wraps an embedded libSQL database. Stage payload
//! writes are conditional on the prerequisite payload being present, so the
//! Geo → Property → Service ordering holds even for callers that bypass the
//! stage orchestrator.
//!
//! **Access rules:**
//! - CLI / service layer: read-write via [`Storage::open`]
//! - Reporting tools: read-only via [`Storage::open_readonly`]

mod activities;
mod campaigns;
mod leads;
mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use leadforge_shared::{LeadForgeError, Result};
use libsql::{Connection, Database, params};
use serde_json::Value;

pub use leads::{StageRun, StageRunState};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LeadForgeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .await
            .map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        LeadForgeError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LeadForgeError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

pub(crate) fn db_err(e: libsql::Error) -> LeadForgeError {
    LeadForgeError::Storage(e.to_string())
}

pub(crate) fn req_string(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx).map_err(db_err)
}

pub(crate) fn opt_string(row: &libsql::Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok()
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LeadForgeError::Storage(format!("invalid date '{raw}': {e}")))
}

pub(crate) fn opt_ts(row: &libsql::Row, idx: i32) -> Option<DateTime<Utc>> {
    opt_string(row, idx).and_then(|s| parse_ts(&s).ok())
}

/// Decode a JSON column; a corrupt payload is logged and treated as absent.
pub(crate) fn opt_json<T: serde::de::DeserializeOwned>(
    row: &libsql::Row,
    idx: i32,
    column: &str,
) -> Option<T> {
    let raw = opt_string(row, idx)?;
    match serde_json::from_str::<Value>(&raw).and_then(serde_json::from_value) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(column, error = %e, "ignoring unreadable JSON column");
            None
        }
    }
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| LeadForgeError::Storage(e.to_string()))
}
