//! Append-only audit log of stage failures (`job_errors` table).

use rusqlite::{params, Connection};

use super::DatabaseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRow {
    pub id: String,
    pub job_id: String,
    pub stage: String,
    pub cause: String,
    pub occurred_at: String,
}

pub fn insert(conn: &Connection, row: &ErrorRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO job_errors (id, job_id, stage, cause, occurred_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![row.id, row.job_id, row.stage, row.cause, row.occurred_at],
    )?;
    Ok(())
}

/// Returns every recorded failure of a job, oldest first.
pub fn list_for_job(conn: &Connection, job_id: &str) -> Result<Vec<ErrorRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, job_id, stage, cause, occurred_at FROM job_errors
         WHERE job_id = ?1 ORDER BY occurred_at ASC, rowid ASC",
    )?;
    let rows = stmt
        .query_map(params![job_id], |r| {
            Ok(ErrorRow {
                id: r.get(0)?,
                job_id: r.get(1)?,
                stage: r.get(2)?,
                cause: r.get(3)?,
                occurred_at: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
