//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the FailureStore trait.

use crate::state::FailureKind;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{FailureStore, StorageError, StorageResult};
use crate::storage::{BatchRecord, BatchStatus, PendingFailureRecord};
use crate::ColetaError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const PENDING_COLUMNS: &str = "id, task_id, url, batch_id, last_batch_id, error_kind, attempts,
     failure_count, recorded_at, last_failed_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path` and initializes the schema
    pub fn new(path: &Path) -> Result<Self, ColetaError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, ColetaError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Raw pending row, converted after the query so a bad `error_kind` surfaces
/// as a storage error instead of a panic
type RawPending = (i64, String, String, i64, i64, String, u32, u32, String, String);

fn read_pending(row: &Row<'_>) -> rusqlite::Result<RawPending> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn into_record(raw: RawPending) -> StorageResult<PendingFailureRecord> {
    let (
        id,
        task_id,
        url,
        batch_id,
        last_batch_id,
        kind,
        attempts,
        failure_count,
        recorded_at,
        last_failed_at,
    ) = raw;

    let error_kind =
        FailureKind::from_db_string(&kind).ok_or_else(|| StorageError::CorruptRow {
            table: "pending_failures",
            message: format!("unknown error_kind '{}' for {}", kind, url),
        })?;

    Ok(PendingFailureRecord {
        id,
        task_id,
        url,
        batch_id,
        last_batch_id,
        error_kind,
        attempts,
        failure_count,
        recorded_at,
        last_failed_at,
    })
}

type RawBatch = (i64, String, Option<String>, String, String);

fn read_batch(row: &Row<'_>) -> rusqlite::Result<RawBatch> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn into_batch(raw: RawBatch) -> StorageResult<BatchRecord> {
    let (id, started_at, finished_at, config_hash, status) = raw;

    let status = BatchStatus::from_db_string(&status).ok_or_else(|| StorageError::CorruptRow {
        table: "batches",
        message: format!("unknown status '{}' for batch {}", status, id),
    })?;

    Ok(BatchRecord {
        id,
        started_at,
        finished_at,
        config_hash,
        status,
    })
}

impl FailureStore for SqliteStorage {
    // ===== Batch Management =====

    fn create_batch(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO batches (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, BatchStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_batch(&self, batch_id: i64) -> StorageResult<BatchRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM batches WHERE id = ?1",
                params![batch_id],
                read_batch,
            )
            .optional()?
            .ok_or(StorageError::BatchNotFound(batch_id))
            .and_then(into_batch)
    }

    fn get_latest_batch(&self) -> StorageResult<Option<BatchRecord>> {
        let batch = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM batches ORDER BY id DESC LIMIT 1",
                [],
                read_batch,
            )
            .optional()?;
        batch.map(into_batch).transpose()
    }

    fn update_batch_status(&mut self, batch_id: i64, status: BatchStatus) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE batches SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), batch_id],
        )?;
        if updated == 0 {
            return Err(StorageError::BatchNotFound(batch_id));
        }
        Ok(())
    }

    fn complete_batch(&mut self, batch_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE batches SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![BatchStatus::Completed.to_db_string(), now, batch_id],
        )?;
        if updated == 0 {
            return Err(StorageError::BatchNotFound(batch_id));
        }
        Ok(())
    }

    // ===== Pending Failures =====

    fn record_failure(
        &mut self,
        task_id: &str,
        url: &str,
        batch_id: i64,
        kind: FailureKind,
        attempts: u32,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO pending_failures
                (task_id, url, batch_id, last_batch_id, error_kind, attempts, failure_count,
                 recorded_at, last_failed_at)
             VALUES (?1, ?2, ?3, ?3, ?4, ?5, 1, ?6, ?6)
             ON CONFLICT(task_id, url) DO UPDATE SET
                last_batch_id = excluded.last_batch_id,
                error_kind = excluded.error_kind,
                attempts = excluded.attempts,
                failure_count = pending_failures.failure_count + 1,
                last_failed_at = excluded.last_failed_at",
            params![task_id, url, batch_id, kind.to_db_string(), attempts, now],
        )?;
        Ok(())
    }

    fn load_pending(&self, task_id: &str) -> StorageResult<Vec<PendingFailureRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM pending_failures WHERE task_id = ?1 ORDER BY recorded_at, id",
            PENDING_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![task_id], read_pending)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(into_record).collect()
    }

    fn resolve_failure(&mut self, task_id: &str, url: &str) -> StorageResult<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM pending_failures WHERE task_id = ?1 AND url = ?2",
            params![task_id, url],
        )?;
        Ok(deleted > 0)
    }

    fn clear_pending(&mut self, task_id: &str) -> StorageResult<u64> {
        let deleted = self.conn.execute(
            "DELETE FROM pending_failures WHERE task_id = ?1",
            params![task_id],
        )?;
        Ok(deleted as u64)
    }

    // ===== Statistics =====

    fn count_pending(&self, task_id: Option<&str>) -> StorageResult<u64> {
        let count: i64 = match task_id {
            Some(task_id) => self.conn.query_row(
                "SELECT COUNT(*) FROM pending_failures WHERE task_id = ?1",
                params![task_id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM pending_failures", [], |row| {
                    row.get(0)
                })?,
        };
        Ok(count as u64)
    }

    fn pending_by_task(&self) -> StorageResult<HashMap<String, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT task_id, COUNT(*) FROM pending_failures GROUP BY task_id")?;

        let mut summary = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (task_id, count) = row?;
            summary.insert(task_id, count as u64);
        }

        Ok(summary)
    }
}
