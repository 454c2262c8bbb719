//! Metadata store
//!
//! SQLite-backed system of record for courses, download records and archived
//! sync run summaries. The orchestrator only writes courses and records; the
//! remaining queries serve browsing, statistics and manual recategorization.
//!
//! # Module Organization
//!
//! - [`queries`] - search filters and aggregate statistics
//! - [`runs`] - archived sync run summaries

pub mod queries;
pub mod runs;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::app::digest::ContentDigest;
use crate::app::models::{Course, CourseState, DownloadRecord, MaterialKind, RecordStatus};
use crate::errors::{StoreError, StoreResult};

pub use queries::{CourseCount, SearchQuery, Statistics};
pub use runs::SyncRunArchive;

const RECORD_COLUMNS: &str = "id, material_id, attachment_id, title, file_name, course_id, \
    course_name, material_kind, mime_type, local_path, size, digest, status, downloaded_at, \
    material_created_at, description, original_url, session_id";

/// Durable metadata for downloaded materials
#[derive(Debug, Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    /// Open (creating if needed) the database at `path`
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let database_url = format!("sqlite://{}?mode=rwc", path.display());
        info!("Opening metadata store at {}", path.display());
        let pool = SqlitePool::connect(&database_url).await?;

        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    /// Private in-memory database
    pub async fn in_memory() -> StoreResult<Self> {
        // One connection, otherwise each pooled connection sees its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    async fn create_tables(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS courses (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                section TEXT,
                state TEXT NOT NULL,
                last_sync TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS download_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                material_id TEXT NOT NULL,
                attachment_id TEXT NOT NULL,
                title TEXT NOT NULL,
                file_name TEXT NOT NULL,
                course_id TEXT,
                course_name TEXT,
                material_kind TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                local_path TEXT NOT NULL,
                size INTEGER NOT NULL,
                digest TEXT NOT NULL,
                status TEXT NOT NULL,
                downloaded_at TEXT NOT NULL,
                material_created_at TEXT,
                description TEXT,
                original_url TEXT,
                session_id TEXT,
                UNIQUE(material_id, attachment_id, digest)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_digest ON download_records (digest)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_course ON download_records (course_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_runs (
                session_id TEXT PRIMARY KEY,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                status TEXT NOT NULL,
                course_ids TEXT NOT NULL,
                total INTEGER NOT NULL,
                completed INTEGER NOT NULL,
                failed INTEGER NOT NULL,
                skipped INTEGER NOT NULL,
                errors TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Metadata tables ready");
        Ok(())
    }

    /// Insert or refresh a course; stamps `last_sync` with the current time
    ///
    /// Courses are never deleted, so history stays attributable after the
    /// remote side removes a course.
    pub async fn upsert_course(&self, course: &Course) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO courses (id, name, section, state, last_sync)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                section = excluded.section,
                state = excluded.state,
                last_sync = excluded.last_sync
            "#,
        )
        .bind(&course.id)
        .bind(&course.name)
        .bind(&course.section)
        .bind(course.state.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All known courses, by name
    pub async fn list_courses(&self) -> StoreResult<Vec<Course>> {
        let rows = sqlx::query("SELECT id, name, section, state, last_sync FROM courses ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(Course {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    section: row.try_get("section")?,
                    state: CourseState::from_remote(&row.try_get::<String, _>("state")?),
                    last_sync: parse_optional_time(row.try_get("last_sync")?, "last_sync")?,
                })
            })
            .collect()
    }

    /// Persist a download record, returning its row id
    ///
    /// Re-recording the same material, attachment and digest refreshes the
    /// existing row instead of adding one. A record that stored new bytes
    /// repoints every record sharing its digest at the new canonical path.
    pub async fn insert_download_record(&self, record: &DownloadRecord) -> StoreResult<i64> {
        let mut tx = self.pool.begin().await?;
        let digest = record.digest.to_hex();
        let local_path = record.local_path.to_string_lossy().to_string();

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO download_records (
                material_id, attachment_id, title, file_name, course_id, course_name,
                material_kind, mime_type, local_path, size, digest, status, downloaded_at,
                material_created_at, description, original_url, session_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(material_id, attachment_id, digest) DO UPDATE SET
                title = excluded.title,
                local_path = excluded.local_path,
                downloaded_at = excluded.downloaded_at,
                session_id = excluded.session_id
            RETURNING id
            "#,
        )
        .bind(&record.material_id)
        .bind(&record.attachment_id)
        .bind(&record.title)
        .bind(&record.file_name)
        .bind(&record.course_id)
        .bind(&record.course_name)
        .bind(record.material_kind.as_str())
        .bind(&record.mime_type)
        .bind(&local_path)
        .bind(record.size as i64)
        .bind(&digest)
        .bind(record.status.as_str())
        .bind(record.downloaded_at.to_rfc3339())
        .bind(record.material_created_at.map(|d| d.to_rfc3339()))
        .bind(&record.description)
        .bind(&record.original_url)
        .bind(&record.session_id)
        .fetch_one(&mut *tx)
        .await?;

        if record.status == RecordStatus::Stored {
            sqlx::query("UPDATE download_records SET local_path = ? WHERE digest = ? AND local_path <> ?")
                .bind(&local_path)
                .bind(&digest)
                .bind(&local_path)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    /// Records produced for one material
    pub async fn records_for_material(&self, material_id: &str) -> StoreResult<Vec<DownloadRecord>> {
        let sql = format!(
            "SELECT {} FROM download_records WHERE material_id = ? ORDER BY id",
            RECORD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(material_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    /// Every record, oldest first
    pub async fn all_records(&self) -> StoreResult<Vec<DownloadRecord>> {
        let sql = format!("SELECT {} FROM download_records ORDER BY id", RECORD_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    /// Records without a course
    pub async fn find_uncategorized(&self) -> StoreResult<Vec<DownloadRecord>> {
        let sql = format!(
            "SELECT {} FROM download_records WHERE course_id IS NULL OR course_id = '' ORDER BY id",
            RECORD_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    /// Move every record of a material to another course
    ///
    /// Only metadata changes; files stay where they are. Returns the number of
    /// records updated.
    pub async fn reassign_material_course(
        &self,
        material_id: &str,
        new_course_id: &str,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE download_records
            SET course_id = ?,
                course_name = (SELECT name FROM courses WHERE id = ?)
            WHERE material_id = ?
            "#,
        )
        .bind(new_course_id)
        .bind(new_course_id)
        .bind(material_id)
        .execute(&self.pool)
        .await?;

        info!(
            "Reassigned {} records of material {} to course {}",
            result.rows_affected(),
            material_id,
            new_course_id
        );
        Ok(result.rows_affected())
    }

    /// Digest and canonical path of every stored payload
    pub async fn known_digests(&self) -> StoreResult<Vec<(ContentDigest, PathBuf)>> {
        let rows = sqlx::query(
            "SELECT digest, MIN(local_path) AS local_path FROM download_records GROUP BY digest",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let digest = ContentDigest::from_hex(&row.try_get::<String, _>("digest")?)?;
                let path = PathBuf::from(row.try_get::<String, _>("local_path")?);
                Ok((digest, path))
            })
            .collect()
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_time(value: &str, field: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        })
}

fn parse_optional_time(value: Option<String>, field: &str) -> StoreResult<Option<DateTime<Utc>>> {
    value.as_deref().map(|v| parse_time(v, field)).transpose()
}

fn record_from_row(row: &SqliteRow) -> StoreResult<DownloadRecord> {
    let kind: String = row.try_get("material_kind")?;
    let status: String = row.try_get("status")?;
    let size: i64 = row.try_get("size")?;

    Ok(DownloadRecord {
        id: Some(row.try_get("id")?),
        material_id: row.try_get("material_id")?,
        attachment_id: row.try_get("attachment_id")?,
        title: row.try_get("title")?,
        file_name: row.try_get("file_name")?,
        course_id: row.try_get("course_id")?,
        course_name: row.try_get("course_name")?,
        material_kind: MaterialKind::parse(&kind).ok_or(StoreError::InvalidValue {
            field: "material_kind".to_string(),
            value: kind.clone(),
        })?,
        mime_type: row.try_get("mime_type")?,
        local_path: PathBuf::from(row.try_get::<String, _>("local_path")?),
        size: size.max(0) as u64,
        digest: ContentDigest::from_hex(&row.try_get::<String, _>("digest")?)?,
        status: RecordStatus::parse(&status).ok_or(StoreError::InvalidValue {
            field: "status".to_string(),
            value: status.clone(),
        })?,
        downloaded_at: parse_time(&row.try_get::<String, _>("downloaded_at")?, "downloaded_at")?,
        material_created_at: parse_optional_time(
            row.try_get("material_created_at")?,
            "material_created_at",
        )?,
        description: row.try_get("description")?,
        original_url: row.try_get("original_url")?,
        session_id: row.try_get("session_id")?,
    })
}
