//! SQL migration definitions for the Leadflow database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

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
            description: "Initial schema: leads, lead_activities",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Prospective contacts
CREATE TABLE IF NOT EXISTS leads (
    id                TEXT PRIMARY KEY,
    company_name      TEXT NOT NULL,
    contact_name      TEXT,
    contact_title     TEXT,
    email             TEXT,
    phone             TEXT,
    website           TEXT,
    linkedin_url      TEXT,
    location          TEXT,
    status            TEXT NOT NULL DEFAULT 'new'
                      CHECK (status IN ('new', 'enriched', 'contacted', 'qualified', 'unqualified')),
    score             INTEGER NOT NULL DEFAULT 0 CHECK (score BETWEEN 0 AND 100),
    is_hot            INTEGER NOT NULL DEFAULT 0,
    source            TEXT NOT NULL,
    signal_type       TEXT,
    notes             TEXT,
    business_segment  TEXT,
    dedup_key         TEXT NOT NULL UNIQUE,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_leads_status ON leads(status);
CREATE INDEX IF NOT EXISTS idx_leads_segment ON leads(business_segment);

-- Append-only activity log
CREATE TABLE IF NOT EXISTS lead_activities (
    id            TEXT PRIMARY KEY,
    lead_id       TEXT NOT NULL REFERENCES leads(id) ON DELETE CASCADE,
    activity_type TEXT NOT NULL,
    actor         TEXT NOT NULL,
    content       TEXT NOT NULL,
    outcome       TEXT,
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_activities_lead ON lead_activities(lead_id, created_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Research summaries, contact tracking, outreach idempotency keys",
            sql: r#"
ALTER TABLE leads ADD COLUMN research_summary TEXT;
ALTER TABLE leads ADD COLUMN last_contacted_at TEXT;
ALTER TABLE lead_activities ADD COLUMN reference TEXT;

CREATE UNIQUE INDEX IF NOT EXISTS idx_activities_reference
    ON lead_activities(lead_id, reference) WHERE reference IS NOT NULL;

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
