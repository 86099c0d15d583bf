//! SQL migration definitions for the LeadForge database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: leads, activities, stage_runs",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Leads with their nested enrichment payloads (JSON)
CREATE TABLE IF NOT EXISTS leads (
    id                     TEXT PRIMARY KEY,
    name                   TEXT NOT NULL,
    title                  TEXT NOT NULL DEFAULT '',
    company                TEXT NOT NULL DEFAULT '',
    email                  TEXT,
    phone                  TEXT,
    linkedin_url           TEXT,
    website                TEXT,
    street                 TEXT,
    city                   TEXT,
    state                  TEXT,
    postal_code            TEXT,
    industry               TEXT,
    employee_count         INTEGER,
    apollo_id              TEXT,
    enrichment_status      TEXT NOT NULL DEFAULT 'discovered',
    status                 TEXT NOT NULL DEFAULT 'new',
    qualification_level    TEXT,
    created_at             TEXT NOT NULL,
    updated_at             TEXT NOT NULL,
    enriched_at            TEXT,
    geo_enrichment_json    TEXT,
    property_analysis_json TEXT,
    service_mapping_json   TEXT
);

CREATE INDEX IF NOT EXISTS idx_leads_status ON leads(status);

-- Logged interactions
CREATE TABLE IF NOT EXISTS activities (
    id                  TEXT PRIMARY KEY,
    lead_id             TEXT NOT NULL REFERENCES leads(id) ON DELETE CASCADE,
    kind                TEXT NOT NULL,
    content             TEXT NOT NULL DEFAULT '',
    created_by          TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT,
    follow_up_date      TEXT,
    follow_up_action    TEXT,
    follow_up_completed INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_activities_lead ON activities(lead_id);

-- In-flight and failed stage runs; completion is the payload itself
CREATE TABLE IF NOT EXISTS stage_runs (
    lead_id    TEXT NOT NULL REFERENCES leads(id) ON DELETE CASCADE,
    stage      TEXT NOT NULL,
    state      TEXT NOT NULL,
    error      TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (lead_id, stage)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Campaigns, steps, membership, generated messages",
            sql: r#"
CREATE TABLE IF NOT EXISTS campaigns (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT,
    status      TEXT NOT NULL DEFAULT 'draft',
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS campaign_steps (
    campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
    step_number INTEGER NOT NULL,
    channel     TEXT NOT NULL,
    delay_days  INTEGER NOT NULL DEFAULT 0,
    subject     TEXT,
    template    TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (campaign_id, step_number)
);

CREATE TABLE IF NOT EXISTS campaign_leads (
    campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
    lead_id     TEXT NOT NULL REFERENCES leads(id) ON DELETE CASCADE,
    added_at    TEXT NOT NULL,
    PRIMARY KEY (campaign_id, lead_id)
);

CREATE TABLE IF NOT EXISTS generated_messages (
    id          TEXT PRIMARY KEY,
    campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
    lead_id     TEXT NOT NULL REFERENCES leads(id) ON DELETE CASCADE,
    step_number INTEGER NOT NULL,
    subject     TEXT,
    body        TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'draft',
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_campaign ON generated_messages(campaign_id);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
