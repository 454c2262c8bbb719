//! Archived sync run summaries

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;

use super::{parse_time, MetadataStore};
use crate::errors::{StoreError, StoreResult};

/// Minimal record of a finished sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRunArchive {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Terminal status (`completed`, `cancelled`, `failed`)
    pub status: String,
    pub course_ids: Vec<String>,
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub errors: Vec<String>,
}

impl MetadataStore {
    /// Store a terminal run summary; archiving the same session twice replaces it
    pub async fn archive_sync_run(&self, run: &SyncRunArchive) -> StoreResult<()> {
        let course_ids = serde_json::to_string(&run.course_ids).map_err(|e| {
            StoreError::InvalidValue {
                field: "course_ids".to_string(),
                value: e.to_string(),
            }
        })?;
        let errors = serde_json::to_string(&run.errors).map_err(|e| StoreError::InvalidValue {
            field: "errors".to_string(),
            value: e.to_string(),
        })?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO sync_runs (
                session_id, started_at, finished_at, status, course_ids,
                total, completed, failed, skipped, errors
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.session_id)
        .bind(run.started_at.to_rfc3339())
        .bind(run.finished_at.to_rfc3339())
        .bind(&run.status)
        .bind(course_ids)
        .bind(run.total as i64)
        .bind(run.completed as i64)
        .bind(run.failed as i64)
        .bind(run.skipped as i64)
        .bind(errors)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Most recent archived runs first
    pub async fn recent_sync_runs(&self, limit: u32) -> StoreResult<Vec<SyncRunArchive>> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, started_at, finished_at, status, course_ids,
                   total, completed, failed, skipped, errors
            FROM sync_runs
            ORDER BY finished_at DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let json_list = |field: &str| -> StoreResult<Vec<String>> {
                    let raw: String = row.try_get(field)?;
                    serde_json::from_str(&raw).map_err(|_| StoreError::InvalidValue {
                        field: field.to_string(),
                        value: raw,
                    })
                };
                let count = |field: &str| -> StoreResult<u64> {
                    Ok(row.try_get::<i64, _>(field)?.max(0) as u64)
                };

                Ok(SyncRunArchive {
                    session_id: row.try_get("session_id")?,
                    started_at: parse_time(&row.try_get::<String, _>("started_at")?, "started_at")?,
                    finished_at: parse_time(&row.try_get::<String, _>("finished_at")?, "finished_at")?,
                    status: row.try_get("status")?,
                    course_ids: json_list("course_ids")?,
                    total: count("total")?,
                    completed: count("completed")?,
                    failed: count("failed")?,
                    skipped: count("skipped")?,
                    errors: json_list("errors")?,
                })
            })
            .collect()
    }
}
