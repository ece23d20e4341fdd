//! Turso Embedded / libSQL storage layer for leads and their activity log.
//!
//! The [`Storage`] struct wraps a libSQL database holding the lead store
//! (`leads`) and the append-only activity log (`lead_activities`).
//!
//! **Access rules:**
//! - Pipeline and CLI: read-write via [`Storage::open`]
//! - Reporting/export: read-only via [`Storage::open_readonly`]
//!
//! All writes are serialized through an async write lock so that stage
//! commits (lead update + activity append) run as single transactions on the
//! shared connection without interleaving.

mod migrations;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use leadflow_shared::{
    ActivityType, Actor, CallOutcome, EnrichmentFields, Lead, LeadActivity, LeadId,
    LeadStatus, LeadflowError, NewActivity, Result,
};
use libsql::{Connection, Database, params};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column list shared by every lead query; [`row_to_lead`] relies on its order.
const LEAD_COLUMNS: &str = "id, company_name, contact_name, contact_title, email, phone, website, \
     linkedin_url, location, status, score, is_hot, source, signal_type, notes, business_segment, \
     research_summary, dedup_key, last_contacted_at, created_at, updated_at";

/// Column list for activity queries; [`row_to_activity`] relies on its order.
const ACTIVITY_COLUMNS: &str =
    "id, lead_id, activity_type, actor, content, outcome, reference, created_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    write_lock: Mutex<()>,
}

/// Filter for [`Storage::list_leads`]. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub business_segment: Option<String>,
    pub source: Option<String>,
    pub hot_only: bool,
    /// Substring match on company or contact name.
    pub search: Option<String>,
    pub limit: Option<u32>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LeadflowError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        conn.execute("PRAGMA foreign_keys = ON", params![])
            .await
            .map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            write_lock: Mutex::new(()),
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
            write_lock: Mutex::new(()),
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
                        LeadflowError::Storage(format!(
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
            return Err(LeadflowError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lead operations
    // -----------------------------------------------------------------------

    /// Insert a new lead together with its creation activity, atomically.
    ///
    /// Returns `None` without writing anything when a lead with the same
    /// dedup key already exists.
    pub async fn create_lead(
        &self,
        lead: &Lead,
        activity: &NewActivity,
    ) -> Result<Option<LeadActivity>> {
        self.check_writable()?;
        let _write = self.write_lock.lock().await;

        let tx = self.conn.transaction().await.map_err(db_err)?;
        let inserted = tx
            .execute(
                &format!(
                    "INSERT INTO leads ({LEAD_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                             ?16, ?17, ?18, ?19, ?20, ?21)
                     ON CONFLICT(dedup_key) DO NOTHING"
                ),
                params![
                    lead.id.to_string(),
                    lead.company_name.as_str(),
                    lead.contact.contact_name.as_deref(),
                    lead.contact.contact_title.as_deref(),
                    lead.contact.email.as_deref(),
                    lead.contact.phone.as_deref(),
                    lead.contact.website.as_deref(),
                    lead.contact.linkedin_url.as_deref(),
                    lead.contact.location.as_deref(),
                    lead.status.as_str(),
                    i64::from(lead.score),
                    i64::from(lead.is_hot),
                    lead.source.as_str(),
                    lead.signal_type.as_deref(),
                    lead.notes.as_deref(),
                    lead.business_segment.as_deref(),
                    lead.research_summary.as_deref(),
                    lead.dedup_key.as_str(),
                    lead.last_contacted_at.map(timestamp),
                    timestamp(lead.created_at),
                    timestamp(lead.updated_at),
                ],
            )
            .await
            .map_err(db_err)?;

        if inserted == 0 {
            tx.rollback().await.map_err(db_err)?;
            return Ok(None);
        }

        let recorded = insert_activity(&tx, &lead.id, activity).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(Some(recorded))
    }

    /// Get a lead by ID.
    pub async fn get_lead(&self, id: &LeadId) -> Result<Option<Lead>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_lead(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Get a lead by ID, failing with `NotFound` when it does not exist.
    pub async fn require_lead(&self, id: &LeadId) -> Result<Lead> {
        self.get_lead(id)
            .await?
            .ok_or_else(|| LeadflowError::lead_not_found(id))
    }

    /// Look up a lead by its dedup key.
    pub async fn find_by_dedup_key(&self, key: &str) -> Result<Option<Lead>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE dedup_key = ?1"),
                params![key],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_lead(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// List leads matching `filter`, newest first.
    pub async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<libsql::Value> = Vec::new();

        if let Some(status) = filter.status {
            values.push(libsql::Value::Text(status.as_str().to_string()));
            clauses.push(format!("status = ?{}", values.len()));
        }
        if let Some(segment) = &filter.business_segment {
            values.push(libsql::Value::Text(segment.clone()));
            clauses.push(format!("business_segment = ?{}", values.len()));
        }
        if let Some(source) = &filter.source {
            values.push(libsql::Value::Text(source.clone()));
            clauses.push(format!("source = ?{}", values.len()));
        }
        if filter.hot_only {
            clauses.push("is_hot = 1".to_string());
        }
        if let Some(search) = &filter.search {
            values.push(libsql::Value::Text(format!("%{}%", search.to_lowercase())));
            let n = values.len();
            clauses.push(format!(
                "(lower(company_name) LIKE ?{n} OR lower(coalesce(contact_name, '')) LIKE ?{n})"
            ));
        }

        let mut sql = format!("SELECT {LEAD_COLUMNS} FROM leads");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            values.push(libsql::Value::Integer(i64::from(limit)));
            sql.push_str(&format!(" LIMIT ?{}", values.len()));
        }

        let mut rows = self
            .conn
            .query(&sql, libsql::params::Params::Positional(values))
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_lead(&row)?);
        }
        Ok(results)
    }

    /// Write every mutable column of `lead`, bumping `updated_at`.
    ///
    /// `id`, `dedup_key` and `created_at` are never rewritten.
    pub async fn update_lead(&self, lead: &mut Lead) -> Result<()> {
        self.check_writable()?;
        let _write = self.write_lock.lock().await;
        write_lead(&self.conn, lead).await
    }

    /// Update a lead and append one activity in a single transaction.
    pub async fn commit_lead(
        &self,
        lead: &mut Lead,
        activity: &NewActivity,
    ) -> Result<LeadActivity> {
        self.check_writable()?;
        let _write = self.write_lock.lock().await;

        let tx = self.conn.transaction().await.map_err(db_err)?;
        let before = lead.updated_at;
        if let Err(e) = write_lead(&tx, lead).await {
            lead.updated_at = before;
            tx.rollback().await.map_err(db_err)?;
            return Err(e);
        }
        let recorded = match insert_activity(&tx, &lead.id, activity).await {
            Ok(recorded) => recorded,
            Err(e) => {
                lead.updated_at = before;
                tx.rollback().await.map_err(db_err)?;
                return Err(e);
            }
        };
        tx.commit().await.map_err(db_err)?;
        Ok(recorded)
    }

    /// Delete a lead and its activity history. Returns `false` if it did not exist.
    pub async fn delete_lead(&self, id: &LeadId) -> Result<bool> {
        self.check_writable()?;
        let _write = self.write_lock.lock().await;

        let tx = self.conn.transaction().await.map_err(db_err)?;
        tx.execute(
            "DELETE FROM lead_activities WHERE lead_id = ?1",
            params![id.to_string()],
        )
        .await
        .map_err(db_err)?;
        let deleted = tx
            .execute("DELETE FROM leads WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(deleted > 0)
    }

    /// Lead counts per status (statuses with no leads are omitted).
    pub async fn count_leads_by_status(&self) -> Result<Vec<(LeadStatus, u64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT status, COUNT(*) FROM leads GROUP BY status ORDER BY status",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let status: String = row.get(0).map_err(db_err)?;
            let count: i64 = row.get(1).map_err(db_err)?;
            results.push((status.parse()?, count.max(0) as u64));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Activity log operations
    // -----------------------------------------------------------------------

    /// Append an activity to an existing lead's log.
    pub async fn append_activity(
        &self,
        lead_id: &LeadId,
        activity: &NewActivity,
    ) -> Result<LeadActivity> {
        self.check_writable()?;
        if self.get_lead(lead_id).await?.is_none() {
            return Err(LeadflowError::lead_not_found(lead_id));
        }
        let _write = self.write_lock.lock().await;
        insert_activity(&self.conn, lead_id, activity).await
    }

    /// All activities for a lead, oldest first.
    pub async fn list_activities(&self, lead_id: &LeadId) -> Result<Vec<LeadActivity>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ACTIVITY_COLUMNS} FROM lead_activities
                     WHERE lead_id = ?1 ORDER BY created_at, id"
                ),
                params![lead_id.to_string()],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_activity(&row)?);
        }
        Ok(results)
    }

    /// Find the activity recorded under an idempotency key, if any.
    pub async fn find_activity_by_reference(
        &self,
        lead_id: &LeadId,
        reference: &str,
    ) -> Result<Option<LeadActivity>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ACTIVITY_COLUMNS} FROM lead_activities
                     WHERE lead_id = ?1 AND reference = ?2"
                ),
                params![lead_id.to_string(), reference],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_activity(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Statement helpers (shared by plain and transactional writes)
// ---------------------------------------------------------------------------

async fn write_lead(conn: &Connection, lead: &mut Lead) -> Result<()> {
    lead.updated_at = Utc::now();
    let updated = conn
        .execute(
            "UPDATE leads SET
               company_name = ?2, contact_name = ?3, contact_title = ?4, email = ?5,
               phone = ?6, website = ?7, linkedin_url = ?8, location = ?9, status = ?10,
               score = ?11, is_hot = ?12, source = ?13, signal_type = ?14, notes = ?15,
               business_segment = ?16, research_summary = ?17, last_contacted_at = ?18,
               updated_at = ?19
             WHERE id = ?1",
            params![
                lead.id.to_string(),
                lead.company_name.as_str(),
                lead.contact.contact_name.as_deref(),
                lead.contact.contact_title.as_deref(),
                lead.contact.email.as_deref(),
                lead.contact.phone.as_deref(),
                lead.contact.website.as_deref(),
                lead.contact.linkedin_url.as_deref(),
                lead.contact.location.as_deref(),
                lead.status.as_str(),
                i64::from(lead.score),
                i64::from(lead.is_hot),
                lead.source.as_str(),
                lead.signal_type.as_deref(),
                lead.notes.as_deref(),
                lead.business_segment.as_deref(),
                lead.research_summary.as_deref(),
                lead.last_contacted_at.map(timestamp),
                timestamp(lead.updated_at),
            ],
        )
        .await
        .map_err(db_err)?;

    if updated == 0 {
        return Err(LeadflowError::lead_not_found(&lead.id));
    }
    Ok(())
}

async fn insert_activity(
    conn: &Connection,
    lead_id: &LeadId,
    activity: &NewActivity,
) -> Result<LeadActivity> {
    let recorded = LeadActivity {
        id: Uuid::now_v7().to_string(),
        lead_id: lead_id.clone(),
        activity_type: activity.activity_type,
        actor: activity.actor,
        content: activity.content.clone(),
        outcome: activity.outcome,
        reference: activity.reference.clone(),
        created_at: Utc::now(),
    };

    conn.execute(
        &format!(
            "INSERT INTO lead_activities ({ACTIVITY_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        ),
        params![
            recorded.id.as_str(),
            lead_id.to_string(),
            recorded.activity_type.as_str(),
            recorded.actor.as_str(),
            recorded.content.as_str(),
            recorded.outcome.map(|o| o.as_str()),
            recorded.reference.as_deref(),
            timestamp(recorded.created_at),
        ],
    )
    .await
    .map_err(db_err)?;

    Ok(recorded)
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

fn db_err(e: libsql::Error) -> LeadflowError {
    LeadflowError::Storage(e.to_string())
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LeadflowError::Storage(format!("invalid date '{s}': {e}")))
}

/// Convert a database row to a [`Lead`].
fn row_to_lead(row: &libsql::Row) -> Result<Lead> {
    let id: String = row.get(0).map_err(db_err)?;
    let status: String = row.get(9).map_err(db_err)?;
    let score: i64 = row.get(10).map_err(db_err)?;
    let is_hot: i64 = row.get(11).map_err(db_err)?;
    let created_at: String = row.get(19).map_err(db_err)?;
    let updated_at: String = row.get(20).map_err(db_err)?;

    Ok(Lead {
        id: id.parse()?,
        company_name: row.get::<String>(1).map_err(db_err)?,
        contact: EnrichmentFields {
            contact_name: row.get::<String>(2).ok(),
            contact_title: row.get::<String>(3).ok(),
            email: row.get::<String>(4).ok(),
            phone: row.get::<String>(5).ok(),
            website: row.get::<String>(6).ok(),
            linkedin_url: row.get::<String>(7).ok(),
            location: row.get::<String>(8).ok(),
        },
        status: status.parse()?,
        score: score.clamp(0, 100) as u8,
        is_hot: is_hot != 0,
        source: row.get::<String>(12).map_err(db_err)?,
        signal_type: row.get::<String>(13).ok(),
        notes: row.get::<String>(14).ok(),
        business_segment: row.get::<String>(15).ok(),
        research_summary: row.get::<String>(16).ok(),
        dedup_key: row.get::<String>(17).map_err(db_err)?,
        last_contacted_at: match row.get::<String>(18).ok() {
            Some(s) => Some(parse_timestamp(&s)?),
            None => None,
        },
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

/// Convert a database row to a [`LeadActivity`].
fn row_to_activity(row: &libsql::Row) -> Result<LeadActivity> {
    let lead_id: String = row.get(1).map_err(db_err)?;
    let activity_type: String = row.get(2).map_err(db_err)?;
    let actor: String = row.get(3).map_err(db_err)?;
    let created_at: String = row.get(7).map_err(db_err)?;

    Ok(LeadActivity {
        id: row.get::<String>(0).map_err(db_err)?,
        lead_id: lead_id.parse()?,
        activity_type: activity_type.parse::<ActivityType>()?,
        actor: actor.parse::<Actor>()?,
        content: row.get::<String>(4).map_err(db_err)?,
        outcome: match row.get::<String>(5).ok() {
            Some(s) => Some(s.parse::<CallOutcome>()?),
            None => None,
        },
        reference: row.get::<String>(6).ok(),
        created_at: parse_timestamp(&created_at)?,
    })
}
