//! Row-level operations for the `jobs` table.
//!
//! Functions take a borrowed connection so that callers can compose several
//! of them inside a single `Database::with_conn` lock and transaction.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// A raw job row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub id: String,
    pub source_reference: String,
    pub raw_reference: String,
    pub channel_id: i64,
    pub message_id: i64,
    pub status: String,
    pub current_stage: Option<String>,
    /// JSON object mapping stage name to an array of stored path references.
    pub stage_artifacts: String,
    pub error_stage: Option<String>,
    pub error_cause: Option<String>,
    pub retry_count: u32,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            source_reference: row.get("source_reference")?,
            raw_reference: row.get("raw_reference")?,
            channel_id: row.get("channel_id")?,
            message_id: row.get("message_id")?,
            status: row.get("status")?,
            current_stage: row.get("current_stage")?,
            stage_artifacts: row.get("stage_artifacts")?,
            error_stage: row.get("error_stage")?,
            error_cause: row.get("error_cause")?,
            retry_count: row.get("retry_count")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Inserts a new job row unless a job with the same `source_reference`
/// already exists. Returns `true` when a row was written.
pub fn insert_if_absent(conn: &Connection, job: &JobRow) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "INSERT INTO jobs (id, source_reference, raw_reference, channel_id, message_id, status,
         current_stage, stage_artifacts, error_stage, error_cause, retry_count, created_at,
         updated_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(source_reference) DO NOTHING",
        params![
            job.id,
            job.source_reference,
            job.raw_reference,
            job.channel_id,
            job.message_id,
            job.status,
            job.current_stage,
            job.stage_artifacts,
            job.error_stage,
            job.error_cause,
            job.retry_count,
            job.created_at,
            job.updated_at,
            job.completed_at,
        ],
    )?;
    Ok(changed == 1)
}

/// Updates the mutable columns of an existing job row. Identity columns
/// (`id`, references, coordinates, `created_at`) are never rewritten.
pub fn update(conn: &Connection, job: &JobRow) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE jobs SET status=?2, current_stage=?3, stage_artifacts=?4, error_stage=?5,
         error_cause=?6, retry_count=?7, updated_at=?8, completed_at=?9
         WHERE id=?1",
        params![
            job.id,
            job.status,
            job.current_stage,
            job.stage_artifacts,
            job.error_stage,
            job.error_cause,
            job.retry_count,
            job.updated_at,
            job.completed_at,
        ],
    )?;
    Ok(())
}

/// Finds a job by its ID.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM jobs WHERE id = ?1",
            params![id],
            JobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Finds a job by its normalized source reference.
pub fn find_by_reference(
    conn: &Connection,
    source_reference: &str,
) -> Result<Option<JobRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM jobs WHERE source_reference = ?1",
            params![source_reference],
            JobRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Lists jobs oldest first, optionally restricted to one status.
pub fn list(conn: &Connection, status: Option<&str>) -> Result<Vec<JobRow>, DatabaseError> {
    let rows = match status {
        Some(status) => {
            let mut stmt = conn.prepare(
                "SELECT * FROM jobs WHERE status = ?1 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map(params![status], JobRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare("SELECT * FROM jobs ORDER BY created_at ASC, rowid ASC")?;
            let rows = stmt
                .query_map([], JobRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_job(id: &str, message_id: i64) -> JobRow {
        JobRow {
            id: id.to_string(),
            source_reference: format!("t.me/c/100/{}", message_id),
            raw_reference: format!("https://t.me/c/100/{}", message_id),
            channel_id: 100,
            message_id,
            status: "pending".to_string(),
            current_stage: None,
            stage_artifacts: "{}".to_string(),
            error_stage: None,
            error_cause: None,
            retry_count: 0,
            created_at: format!("2026-01-01T00:00:{:02}Z", message_id),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            completed_at: None,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        db.with_conn(|conn| {
            assert!(insert_if_absent(conn, &sample_job("job-1", 1))?);

            let found = find_by_id(conn, "job-1")?.expect("row");
            assert_eq!(found.source_reference, "t.me/c/100/1");
            assert_eq!(found.status, "pending");
            assert_eq!(found.stage_artifacts, "{}");

            let by_ref = find_by_reference(conn, "t.me/c/100/1")?.expect("row");
            assert_eq!(by_ref.id, "job-1");
            Ok::<_, DatabaseError>(())
        })
        .unwrap();
    }

    #[test]
    fn test_insert_conflicting_reference_is_ignored() {
        let db = test_db();
        db.with_conn(|conn| {
            assert!(insert_if_absent(conn, &sample_job("first", 7))?);
            assert!(!insert_if_absent(conn, &sample_job("second", 7))?);

            assert!(find_by_id(conn, "second")?.is_none());
            assert_eq!(list(conn, None)?.len(), 1);
            Ok::<_, DatabaseError>(())
        })
        .unwrap();
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        let found = db.with_conn(|conn| find_by_id(conn, "nonexistent")).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_update_keeps_identity() {
        let db = test_db();
        db.with_conn(|conn| {
            let mut job = sample_job("job-2", 2);
            insert_if_absent(conn, &job)?;

            job.status = "error".to_string();
            job.current_stage = Some("summarize".to_string());
            job.error_stage = Some("summarize".to_string());
            job.error_cause = Some("quota".to_string());
            job.retry_count = 2;
            job.source_reference = "tampered".to_string();
            update(conn, &job)?;

            let found = find_by_id(conn, "job-2")?.expect("row");
            assert_eq!(found.status, "error");
            assert_eq!(found.error_cause.as_deref(), Some("quota"));
            assert_eq!(found.retry_count, 2);
            assert_eq!(found.source_reference, "t.me/c/100/2");
            Ok::<_, DatabaseError>(())
        })
        .unwrap();
    }

    #[test]
    fn test_list_orders_oldest_first_and_filters() {
        let db = test_db();
        db.with_conn(|conn| {
            insert_if_absent(conn, &sample_job("c", 3))?;
            insert_if_absent(conn, &sample_job("a", 1))?;
            let mut done = sample_job("b", 2);
            done.status = "done".to_string();
            insert_if_absent(conn, &done)?;

            let ids: Vec<String> = list(conn, None)?.into_iter().map(|r| r.id).collect();
            assert_eq!(ids, vec!["a", "b", "c"]);

            let done_rows = list(conn, Some("done"))?;
            assert_eq!(done_rows.len(), 1);
            assert_eq!(done_rows[0].id, "b");
            Ok::<_, DatabaseError>(())
        })
        .unwrap();
    }
}
