//! Record search and aggregate statistics

use serde::Serialize;
use sqlx::Row;

use super::{record_from_row, MetadataStore, RECORD_COLUMNS};
use crate::app::models::DownloadRecord;
use crate::errors::StoreResult;

/// Filters for [`MetadataStore::search`]; unset filters match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub course_id: Option<String>,
    /// Matches records whose MIME type starts with this prefix (`image/`)
    pub mime_prefix: Option<String>,
    /// Case-insensitive substring of title, file name or description
    pub text: Option<String>,
    pub limit: Option<u32>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn course(mut self, course_id: impl Into<String>) -> Self {
        self.course_id = Some(course_id.into());
        self
    }

    pub fn mime_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.mime_prefix = Some(prefix.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Record count for one course
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseCount {
    pub course_id: String,
    pub course_name: Option<String>,
    pub files: u64,
}

/// Totals across the whole store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Number of download records
    pub total_files: u64,
    /// Bytes on disk; deduplicated records share their canonical file
    pub total_bytes: u64,
    pub per_course: Vec<CourseCount>,
    pub per_mime: Vec<(String, u64)>,
    pub uncategorized: u64,
    pub deduplicated: u64,
}

/// Escape LIKE wildcards so user text matches literally
fn like_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl MetadataStore {
    /// Records matching every set filter, newest first
    pub async fn search(&self, query: &SearchQuery) -> StoreResult<Vec<DownloadRecord>> {
        let sql = format!(
            r#"
            SELECT {} FROM download_records
            WHERE (? IS NULL OR course_id = ?)
              AND (? IS NULL OR mime_type LIKE ? ESCAPE '\')
              AND (? IS NULL
                   OR title LIKE ? ESCAPE '\'
                   OR file_name LIKE ? ESCAPE '\'
                   OR description LIKE ? ESCAPE '\')
            ORDER BY downloaded_at DESC, id DESC
            LIMIT ?
            "#,
            RECORD_COLUMNS
        );

        let mime = query
            .mime_prefix
            .as_deref()
            .map(|prefix| format!("{}%", like_escape(prefix)));
        let text = query
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| format!("%{}%", like_escape(t)));
        let limit = query.limit.map(i64::from).unwrap_or(-1);

        let rows = sqlx::query(&sql)
            .bind(&query.course_id)
            .bind(&query.course_id)
            .bind(&mime)
            .bind(&mime)
            .bind(&text)
            .bind(&text)
            .bind(&text)
            .bind(&text)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Counts and sizes across all records
    pub async fn aggregate_statistics(&self) -> StoreResult<Statistics> {
        let totals = sqlx::query(
            r#"
            SELECT COUNT(*) AS files,
                   SUM(CASE WHEN course_id IS NULL OR course_id = '' THEN 1 ELSE 0 END) AS uncategorized,
                   SUM(CASE WHEN status = 'deduplicated' THEN 1 ELSE 0 END) AS deduplicated
            FROM download_records
            "#,
        )
        .fetch_one(self.pool())
        .await?;

        let bytes = sqlx::query(
            r#"
            SELECT COALESCE(SUM(size), 0) AS bytes FROM (
                SELECT local_path, MAX(size) AS size FROM download_records GROUP BY local_path
            )
            "#,
        )
        .fetch_one(self.pool())
        .await?;

        let per_course = sqlx::query(
            r#"
            SELECT course_id, MAX(course_name) AS course_name, COUNT(*) AS files
            FROM download_records
            WHERE course_id IS NOT NULL AND course_id <> ''
            GROUP BY course_id
            ORDER BY files DESC, course_id
            "#,
        )
        .fetch_all(self.pool())
        .await?
        .iter()
        .map(|row| {
            Ok(CourseCount {
                course_id: row.try_get("course_id")?,
                course_name: row.try_get("course_name")?,
                files: row.try_get::<i64, _>("files")?.max(0) as u64,
            })
        })
        .collect::<StoreResult<Vec<_>>>()?;

        let per_mime = sqlx::query(
            r#"
            SELECT mime_type, COUNT(*) AS files
            FROM download_records
            GROUP BY mime_type
            ORDER BY files DESC, mime_type
            "#,
        )
        .fetch_all(self.pool())
        .await?
        .iter()
        .map(|row| {
            Ok((
                row.try_get::<String, _>("mime_type")?,
                row.try_get::<i64, _>("files")?.max(0) as u64,
            ))
        })
        .collect::<StoreResult<Vec<_>>>()?;

        let count = |name: &str| -> StoreResult<u64> {
            Ok(totals.try_get::<Option<i64>, _>(name)?.unwrap_or(0).max(0) as u64)
        };

        Ok(Statistics {
            total_files: count("files")?,
            total_bytes: bytes.try_get::<i64, _>("bytes")?.max(0) as u64,
            per_course,
            per_mime,
            uncategorized: count("uncategorized")?,
            deduplicated: count("deduplicated")?,
        })
    }
}
