//! Data models for Classroom Sync
//!
//! Courses, materials and their attachments as enumerated from the remote
//! classroom service, plus the durable download records produced by a sync.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::app::digest::ContentDigest;
use crate::constants::mime;

/// Lifecycle state of a course as reported by the classroom service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CourseState {
    Active,
    Archived,
    Provisioned,
    Declined,
    Suspended,
    Deleted,
    Unspecified,
}

impl CourseState {
    /// Parse the remote enum string (e.g., "ACTIVE")
    pub fn from_remote(value: &str) -> Self {
        match value {
            "ACTIVE" => Self::Active,
            "ARCHIVED" => Self::Archived,
            "PROVISIONED" => Self::Provisioned,
            "DECLINED" => Self::Declined,
            "SUSPENDED" => Self::Suspended,
            "DELETED" => Self::Deleted,
            _ => Self::Unspecified,
        }
    }

    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Archived => "ARCHIVED",
            Self::Provisioned => "PROVISIONED",
            Self::Declined => "DECLINED",
            Self::Suspended => "SUSPENDED",
            Self::Deleted => "DELETED",
            Self::Unspecified => "COURSE_STATE_UNSPECIFIED",
        }
    }
}

impl fmt::Display for CourseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A course on the classroom service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub name: String,
    pub section: Option<String>,
    pub state: CourseState,
    /// Last time a sync touched this course (set by the store)
    pub last_sync: Option<DateTime<Utc>>,
}

impl Course {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            section: None,
            state: CourseState::Active,
            last_sync: None,
        }
    }
}

/// Which classroom stream a material came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialKind {
    Assignment,
    Announcement,
    CourseMaterial,
}

impl MaterialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::Announcement => "announcement",
            Self::CourseMaterial => "course_material",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "assignment" => Some(Self::Assignment),
            "announcement" => Some(Self::Announcement),
            "course_material" => Some(Self::CourseMaterial),
            _ => None,
        }
    }
}

impl fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the bytes behind an attachment live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentSource {
    /// A file on the remote file host
    DriveFile {
        file_id: String,
        mime_type: Option<String>,
        alternate_link: Option<String>,
    },
    /// A plain web link
    Link { url: String },
    /// A video on the video host
    YouTubeVideo { video_id: String, url: String },
    /// A form hosted by the classroom service
    Form { form_url: String },
    /// A material kind this client cannot fetch; `key` is unique within its material
    Unsupported { kind: String, key: String },
}

/// Reference to remote content carried by a material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub title: Option<String>,
    pub source: AttachmentSource,
}

impl Attachment {
    /// Drive file attachment with a declared type
    pub fn drive(
        file_id: impl Into<String>,
        title: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            title: Some(title.into()),
            source: AttachmentSource::DriveFile {
                file_id: file_id.into(),
                mime_type: Some(mime_type.into()),
                alternate_link: None,
            },
        }
    }

    /// Plain link attachment
    pub fn link(url: impl Into<String>, title: Option<String>) -> Self {
        Self {
            title,
            source: AttachmentSource::Link { url: url.into() },
        }
    }

    /// Stable identifier of the remote content, unique within a material
    pub fn remote_id(&self) -> &str {
        match &self.source {
            AttachmentSource::DriveFile { file_id, .. } => file_id,
            AttachmentSource::Link { url } => url,
            AttachmentSource::YouTubeVideo { video_id, .. } => video_id,
            AttachmentSource::Form { form_url } => form_url,
            AttachmentSource::Unsupported { key, .. } => key,
        }
    }

    /// Declared MIME type, if the listing provided one
    pub fn declared_mime(&self) -> Option<&str> {
        match &self.source {
            AttachmentSource::DriveFile { mime_type, .. } => mime_type.as_deref(),
            AttachmentSource::Unsupported { .. } => None,
            _ => Some(mime::SHORTCUT),
        }
    }

    /// True for native editable formats that must be converted before download
    pub fn export_required(&self) -> bool {
        matches!(
            self.declared_mime(),
            Some(mime::NATIVE_DOCUMENT)
                | Some(mime::NATIVE_SPREADSHEET)
                | Some(mime::NATIVE_PRESENTATION)
                | Some(mime::NATIVE_DRAWING)
        )
    }

    /// URL a user would open in a browser
    pub fn url(&self) -> Option<&str> {
        match &self.source {
            AttachmentSource::DriveFile { alternate_link, .. } => alternate_link.as_deref(),
            AttachmentSource::Link { url } => Some(url),
            AttachmentSource::YouTubeVideo { url, .. } => Some(url),
            AttachmentSource::Form { form_url } => Some(form_url),
            AttachmentSource::Unsupported { .. } => None,
        }
    }

    /// Title, falling back to the remote id
    pub fn display_name(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| self.remote_id())
    }
}

/// One classroom item that may carry attachments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    pub id: String,
    pub title: String,
    /// None for stream-only posts without a course
    pub course_id: Option<String>,
    pub kind: MaterialKind,
    pub description: Option<String>,
    pub alternate_link: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub attachments: Vec<Attachment>,
}

impl Material {
    pub fn new(id: impl Into<String>, title: impl Into<String>, kind: MaterialKind) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            course_id: None,
            kind,
            description: None,
            alternate_link: None,
            created_at: None,
            updated_at: None,
            attachments: Vec::new(),
        }
    }

    pub fn in_course(mut self, course_id: impl Into<String>) -> Self {
        self.course_id = Some(course_id.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn created(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }
}

/// Inclusive creation-date filter for listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(since: Option<NaiveDate>, until: Option<NaiveDate>) -> Self {
        Self { since, until }
    }

    pub fn is_unbounded(&self) -> bool {
        self.since.is_none() && self.until.is_none()
    }

    /// Items without a creation time always pass
    pub fn contains(&self, created_at: Option<DateTime<Utc>>) -> bool {
        let Some(created_at) = created_at else {
            return true;
        };
        let day = created_at.date_naive();
        self.since.map_or(true, |since| day >= since) && self.until.map_or(true, |until| day <= until)
    }
}

/// How a download record relates to the bytes on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordStatus {
    /// This record's job wrote the canonical file
    Stored,
    /// The digest already had a canonical file; no bytes were written
    Deduplicated,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::Deduplicated => "deduplicated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stored" => Some(Self::Stored),
            "deduplicated" => Some(Self::Deduplicated),
            _ => None,
        }
    }
}

/// Durable result of resolving one attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Row id, assigned by the store
    pub id: Option<i64>,
    pub material_id: String,
    pub attachment_id: String,
    pub title: String,
    pub file_name: String,
    pub course_id: Option<String>,
    pub course_name: Option<String>,
    pub material_kind: MaterialKind,
    pub mime_type: String,
    pub local_path: PathBuf,
    pub size: u64,
    pub digest: ContentDigest,
    pub status: RecordStatus,
    pub downloaded_at: DateTime<Utc>,
    pub material_created_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub original_url: Option<String>,
    pub session_id: Option<String>,
}

impl DownloadRecord {
    pub fn is_uncategorized(&self) -> bool {
        self.course_id.as_deref().map_or(true, str::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_course_state_round_trip_names() {
        assert_eq!(CourseState::from_remote("ACTIVE"), CourseState::Active);
        assert_eq!(CourseState::from_remote("ARCHIVED").as_str(), "ARCHIVED");
        assert_eq!(CourseState::from_remote("bogus"), CourseState::Unspecified);
    }

    #[test]
    fn test_attachment_export_flag() {
        let doc = Attachment::drive("f1", "Notes", mime::NATIVE_DOCUMENT);
        assert!(doc.export_required());
        assert_eq!(doc.remote_id(), "f1");

        let pdf = Attachment::drive("f2", "Paper.pdf", mime::PDF);
        assert!(!pdf.export_required());

        let link = Attachment::link("https://example.com", None);
        assert!(!link.export_required());
        assert_eq!(link.declared_mime(), Some(mime::SHORTCUT));
        assert_eq!(link.display_name(), "https://example.com");
    }

    /// Test inclusive date range
    ///
    /// Both boundaries are inclusive and undated items are never filtered out.
    #[test]
    fn test_date_range_inclusive() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 10),
            NaiveDate::from_ymd_opt(2024, 1, 20),
        );
        let at = |d: u32| Some(Utc.with_ymd_and_hms(2024, 1, d, 23, 59, 0).unwrap());

        assert!(range.contains(at(10)));
        assert!(range.contains(at(20)));
        assert!(!range.contains(at(9)));
        assert!(!range.contains(at(21)));
        assert!(range.contains(None));
        assert!(DateRange::default().is_unbounded());
    }

    #[test]
    fn test_material_kind_parse() {
        for kind in [
            MaterialKind::Assignment,
            MaterialKind::Announcement,
            MaterialKind::CourseMaterial,
        ] {
            assert_eq!(MaterialKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MaterialKind::parse("quiz"), None);
    }
}
