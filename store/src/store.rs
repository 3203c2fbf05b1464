//! SQLite-backed lifecycle store
//!
//! Single source of truth for which proposals have been seen, posted, and
//! finalized. One connection behind an async mutex; every write autocommits,
//! so state is durable before the calling task proceeds.
//!
//! Status transitions are enforced here, not in callers: each transition
//! UPDATE is predicated on the expected predecessor status, so a stale or
//! repeated call cannot move a row backwards or skip a step.

use crate::errors::{Result, StoreError};
use crate::records::{ProposalRecord, ProposalStatus, RationaleRecord, StatusCounts};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use tokio::sync::Mutex;

/// Embedded schema SQL from SCHEMA.sql
const SCHEMA_SQL: &str = include_str!("../SCHEMA.sql");

/// Lifecycle store wrapper
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open the store at a path and initialize the schema
    ///
    /// Creates the database file if it doesn't exist.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::open_with_source(
                    format!("failed to create db directory: {}", parent.display()),
                    e,
                )
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            StoreError::open_with_source(format!("failed to open db at {}", path.display()), e)
        })?;

        Self::apply_schema(&conn)?;

        tracing::debug!(path = %path.display(), "Lifecycle store initialized");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::open_with_source("failed to open in-memory db", e))?;

        Self::apply_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Apply the schema to the database
    fn apply_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| StoreError::open_with_source("failed to apply schema", e))?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // proposals
    // ─────────────────────────────────────────────────────────────────────────────

    /// Record a newly discovered proposal
    ///
    /// Returns `true` if a row was created, `false` if the gaid was already
    /// known (re-discovery is a no-op; existing state wins).
    pub async fn insert_discovered(
        &self,
        gaid: &str,
        title: &str,
        raw_metadata: &str,
        discovered_at: i64,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let inserted = conn
            .execute(
                r#"
                INSERT OR IGNORE INTO proposals (gaid, title, raw_metadata, discovered_at, status)
                VALUES (?1, ?2, ?3, ?4, 'discovered')
                "#,
                params![gaid, title, raw_metadata, discovered_at],
            )
            .map_err(|e| StoreError::query_with_source("failed to insert proposal", e))?;

        if inserted > 0 {
            tracing::debug!(gaid, discovered_at, "Recorded discovered proposal");
        }
        Ok(inserted > 0)
    }

    /// Get a proposal by gaid
    pub async fn get_proposal(&self, gaid: &str) -> Result<Option<ProposalRecord>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            r#"
            SELECT gaid, title, raw_metadata, discovered_at, thread_id, poll_message_id,
                   posted_at, poll_end_at, final_vote, final_rationale, status
            FROM proposals
            WHERE gaid = ?1
            "#,
            params![gaid],
            row_to_proposal,
        )
        .optional()
        .map_err(|e| StoreError::query_with_source("failed to get proposal", e))
    }

    /// All proposals in a given status, oldest chain activity first
    pub async fn list_proposals(&self, status: ProposalStatus) -> Result<Vec<ProposalRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT gaid, title, raw_metadata, discovered_at, thread_id, poll_message_id,
                       posted_at, poll_end_at, final_vote, final_rationale, status
                FROM proposals
                WHERE status = ?1
                ORDER BY discovered_at ASC, gaid ASC
                "#,
            )
            .map_err(|e| StoreError::query_with_source("failed to prepare query", e))?;

        let rows = stmt
            .query_map(params![status.as_str()], row_to_proposal)
            .map_err(|e| StoreError::query_with_source("failed to query proposals", e))?;

        let mut proposals = Vec::new();
        for row in rows {
            proposals
                .push(row.map_err(|e| StoreError::query_with_source("failed to read row", e))?);
        }
        Ok(proposals)
    }

    /// Record the platform ids after the thread and poll were created
    ///
    /// `discovered -> posted`. Fails with `InvalidTransition` if the row
    /// already moved on, which is what keeps a replayed discovery pass from
    /// ever recording a second thread/poll pair.
    pub async fn record_posted(
        &self,
        gaid: &str,
        thread_id: u64,
        poll_message_id: u64,
        posted_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let updated = conn
            .execute(
                r#"
                UPDATE proposals
                SET thread_id = ?2, poll_message_id = ?3, posted_at = ?4, status = 'posted'
                WHERE gaid = ?1 AND status = 'discovered'
                "#,
                params![gaid, thread_id, poll_message_id, posted_at.to_rfc3339()],
            )
            .map_err(|e| StoreError::query_with_source("failed to record posted ids", e))?;

        if updated == 0 {
            return Err(transition_failure(
                &conn,
                gaid,
                ProposalStatus::Discovered,
                ProposalStatus::Posted,
            ));
        }

        tracing::debug!(gaid, thread_id, poll_message_id, "Proposal posted");
        Ok(())
    }

    /// Open the voting window
    ///
    /// `posted -> awaiting_close`.
    pub async fn mark_awaiting_close(&self, gaid: &str, poll_end_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().await;
        let updated = conn
            .execute(
                r#"
                UPDATE proposals
                SET poll_end_at = ?2, status = 'awaiting_close'
                WHERE gaid = ?1 AND status = 'posted'
                "#,
                params![gaid, poll_end_at.to_rfc3339()],
            )
            .map_err(|e| StoreError::query_with_source("failed to mark awaiting close", e))?;

        if updated == 0 {
            return Err(transition_failure(
                &conn,
                gaid,
                ProposalStatus::Posted,
                ProposalStatus::AwaitingClose,
            ));
        }

        tracing::debug!(gaid, poll_end_at = %poll_end_at, "Voting window open");
        Ok(())
    }

    /// Record the outcome and close out the proposal
    ///
    /// `awaiting_close -> finalized`. Terminal; no further writes touch the row.
    pub async fn mark_finalized(
        &self,
        gaid: &str,
        final_vote: &str,
        final_rationale: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let updated = conn
            .execute(
                r#"
                UPDATE proposals
                SET final_vote = ?2, final_rationale = ?3, status = 'finalized'
                WHERE gaid = ?1 AND status = 'awaiting_close'
                "#,
                params![gaid, final_vote, final_rationale],
            )
            .map_err(|e| StoreError::query_with_source("failed to mark finalized", e))?;

        if updated == 0 {
            return Err(transition_failure(
                &conn,
                gaid,
                ProposalStatus::AwaitingClose,
                ProposalStatus::Finalized,
            ));
        }

        tracing::debug!(gaid, final_vote, "Proposal finalized");
        Ok(())
    }

    /// Per-status row counts
    pub async fn counts_by_status(&self) -> Result<StatusCounts> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM proposals GROUP BY status")
            .map_err(|e| StoreError::query_with_source("failed to prepare query", e))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| StoreError::query_with_source("failed to count proposals", e))?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, n) =
                row.map_err(|e| StoreError::query_with_source("failed to read count row", e))?;
            match ProposalStatus::parse(&status) {
                Some(ProposalStatus::Discovered) => counts.discovered = n,
                Some(ProposalStatus::Posted) => counts.posted = n,
                Some(ProposalStatus::AwaitingClose) => counts.awaiting_close = n,
                Some(ProposalStatus::Finalized) => counts.finalized = n,
                None => return Err(StoreError::query(format!("unknown status in db: {status}"))),
            }
        }
        Ok(counts)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // rationales
    // ─────────────────────────────────────────────────────────────────────────────

    /// Append a rationale comment
    ///
    /// Returns `true` if stored, `false` if this message_id was already
    /// captured (REST sweeps overlap, so replays are expected).
    pub async fn append_rationale(
        &self,
        gaid: &str,
        message_id: u64,
        author: &str,
        text: &str,
        submitted_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let inserted = conn
            .execute(
                r#"
                INSERT OR IGNORE INTO rationales (gaid, message_id, author, text, submitted_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![gaid, message_id, author, text, submitted_at.to_rfc3339()],
            )
            .map_err(|e| StoreError::query_with_source("failed to append rationale", e))?;

        if inserted > 0 {
            tracing::debug!(gaid, message_id, author, "Captured rationale");
        }
        Ok(inserted > 0)
    }

    /// All rationales for a proposal, oldest first
    pub async fn list_rationales(&self, gaid: &str) -> Result<Vec<RationaleRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, gaid, message_id, author, text, submitted_at
                FROM rationales
                WHERE gaid = ?1
                ORDER BY submitted_at ASC, id ASC
                "#,
            )
            .map_err(|e| StoreError::query_with_source("failed to prepare query", e))?;

        let rows = stmt
            .query_map(params![gaid], |row| {
                Ok(RationaleRecord {
                    id: row.get(0)?,
                    gaid: row.get(1)?,
                    message_id: row.get(2)?,
                    author: row.get(3)?,
                    text: row.get(4)?,
                    submitted_at: row
                        .get::<_, String>(5)
                        .ok()
                        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(Utc::now),
                })
            })
            .map_err(|e| StoreError::query_with_source("failed to query rationales", e))?;

        let mut rationales = Vec::new();
        for row in rows {
            rationales
                .push(row.map_err(|e| StoreError::query_with_source("failed to read row", e))?);
        }
        Ok(rationales)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // watermark
    // ─────────────────────────────────────────────────────────────────────────────

    /// Highest block_time already processed, if any cycle has completed
    pub async fn get_watermark(&self) -> Result<Option<i64>> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT block_time FROM watermark WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| StoreError::query_with_source("failed to get watermark", e))
    }

    /// Advance the watermark
    ///
    /// The upsert keeps the maximum of the stored and offered values, so the
    /// watermark can never regress no matter what callers pass in.
    pub async fn advance_watermark(&self, block_time: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO watermark (id, block_time) VALUES (1, ?1)
            ON CONFLICT(id) DO UPDATE SET block_time = MAX(block_time, excluded.block_time)
            "#,
            params![block_time],
        )
        .map_err(|e| StoreError::query_with_source("failed to advance watermark", e))?;

        tracing::debug!(block_time, "Watermark advanced");
        Ok(())
    }
}

/// Map a full proposals row to a record
fn row_to_proposal(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProposalRecord> {
    let status_str: String = row.get(10)?;
    let status = ProposalStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            rusqlite::types::Type::Text,
            format!("unknown proposal status: {status_str}").into(),
        )
    })?;

    Ok(ProposalRecord {
        gaid: row.get(0)?,
        title: row.get(1)?,
        raw_metadata: row.get(2)?,
        discovered_at: row.get(3)?,
        thread_id: row.get(4)?,
        poll_message_id: row.get(5)?,
        posted_at: row.get::<_, Option<String>>(6)?.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }),
        poll_end_at: row.get::<_, Option<String>>(7)?.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }),
        final_vote: row.get(8)?,
        final_rationale: row.get(9)?,
        status,
    })
}

/// Build the error for a transition UPDATE that matched no rows
fn transition_failure(
    conn: &Connection,
    gaid: &str,
    expected: ProposalStatus,
    target: ProposalStatus,
) -> StoreError {
    let actual = conn
        .query_row(
            "SELECT status FROM proposals WHERE gaid = ?1",
            params![gaid],
            |row| row.get::<_, String>(0),
        )
        .optional();

    match actual {
        Ok(Some(s)) => match ProposalStatus::parse(&s) {
            Some(actual) => StoreError::InvalidTransition {
                gaid: gaid.to_string(),
                expected,
                actual,
                target,
            },
            None => StoreError::query(format!("unknown status in db: {s}")),
        },
        Ok(None) => StoreError::NotFound {
            gaid: gaid.to_string(),
        },
        Err(e) => StoreError::query_with_source("failed to read status", e),
    }
}
