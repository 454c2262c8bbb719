//! Remote classroom service listings
//!
//! Read-only enumeration of courses and the three material streams
//! (coursework, course materials, announcements). Every listing pages until
//! the service stops returning a page token.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::http::HttpHandler;
use crate::app::models::{
    Attachment, AttachmentSource, Course, CourseState, DateRange, Material, MaterialKind,
};
use crate::app::rate::RateGate;
use crate::constants::{api, naming};
use crate::errors::{ClientError, ClientResult};

/// Read-only view of the classroom service
#[async_trait]
pub trait ClassroomSource: Send + Sync {
    /// Courses visible to the user, optionally only active ones
    async fn list_courses(&self, active_only: bool) -> ClientResult<Vec<Course>>;

    /// A single course by id
    async fn get_course(&self, course_id: &str) -> ClientResult<Course>;

    /// All materials of a course created within `range`
    async fn list_materials(&self, course_id: &str, range: &DateRange) -> ClientResult<Vec<Material>>;
}

/// Classroom REST client
#[derive(Debug, Clone)]
pub struct ClassroomClient {
    http: HttpHandler,
    gate: RateGate,
    base_url: Url,
}

impl ClassroomClient {
    pub fn new(http: HttpHandler, gate: RateGate, base_url: Url) -> Self {
        Self {
            http,
            gate,
            base_url,
        }
    }

    fn endpoint(&self, path: &str) -> ClientResult<Url> {
        self.base_url.join(path).map_err(|e| ClientError::InvalidUrl {
            url: format!("{}{}", self.base_url, path),
            error: e.to_string(),
        })
    }

    /// Fetch every page of a listing
    async fn list_all<P>(&self, path: &str, params: &[(&str, &str)]) -> ClientResult<Vec<P::Item>>
    where
        P: Page + DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        let page_size = api::PAGE_SIZE.to_string();
        let mut pages = 0u32;

        loop {
            let mut url = self.endpoint(path)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("pageSize", &page_size);
                for (key, value) in params {
                    query.append_pair(key, value);
                }
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            self.gate.acquire().await;
            let page: P = self.http.get_json(&url).await?;
            pages += 1;
            let (batch, next) = page.into_parts();
            items.extend(batch);

            match next {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Listed {} items from {} in {} pages", items.len(), path, pages);
        Ok(items)
    }
}

#[async_trait]
impl ClassroomSource for ClassroomClient {
    async fn list_courses(&self, active_only: bool) -> ClientResult<Vec<Course>> {
        let params: &[(&str, &str)] = if active_only {
            &[("courseStates", api::ACTIVE_COURSE_STATE)]
        } else {
            &[]
        };
        let courses = self.list_all::<CoursePage>("courses", params).await?;
        Ok(courses.into_iter().map(WireCourse::into_course).collect())
    }

    async fn get_course(&self, course_id: &str) -> ClientResult<Course> {
        self.gate.acquire().await;
        let url = self.endpoint(&format!("courses/{}", course_id))?;
        let course: WireCourse = self.http.get_json(&url).await?;
        Ok(course.into_course())
    }

    async fn list_materials(&self, course_id: &str, range: &DateRange) -> ClientResult<Vec<Material>> {
        let base = format!("courses/{}", course_id);

        let coursework = self
            .list_all::<CourseWorkPage>(&format!("{}/courseWork", base), &[])
            .await?;
        let course_materials = self
            .list_all::<CourseWorkMaterialPage>(&format!("{}/courseWorkMaterials", base), &[])
            .await?;
        let announcements = self
            .list_all::<AnnouncementPage>(&format!("{}/announcements", base), &[])
            .await?;

        let materials: Vec<Material> = coursework
            .into_iter()
            .map(|w| w.into_material(MaterialKind::Assignment))
            .chain(
                course_materials
                    .into_iter()
                    .map(|w| w.into_material(MaterialKind::CourseMaterial)),
            )
            .chain(announcements.into_iter().map(WireAnnouncement::into_material))
            .map(|mut m| {
                if m.course_id.as_deref().map_or(true, str::is_empty) {
                    m.course_id = Some(course_id.to_string());
                }
                m
            })
            .filter(|m| range.contains(m.created_at))
            .collect();

        Ok(materials)
    }
}

/// One page of a listing response
pub trait Page {
    type Item;
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

macro_rules! page_type {
    ($name:ident, $field:literal, $item:ty) => {
        #[derive(Debug, Deserialize)]
        struct $name {
            #[serde(rename = $field, default)]
            items: Vec<$item>,
            #[serde(rename = "nextPageToken", default)]
            next_page_token: Option<String>,
        }

        impl Page for $name {
            type Item = $item;
            fn into_parts(self) -> (Vec<$item>, Option<String>) {
                (self.items, self.next_page_token)
            }
        }
    };
}

page_type!(CoursePage, "courses", WireCourse);
page_type!(CourseWorkPage, "courseWork", WireWork);
page_type!(CourseWorkMaterialPage, "courseWorkMaterial", WireWork);
page_type!(AnnouncementPage, "announcements", WireAnnouncement);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCourse {
    id: String,
    #[serde(default)]
    name: String,
    section: Option<String>,
    course_state: Option<String>,
}

impl WireCourse {
    fn into_course(self) -> Course {
        Course {
            id: self.id,
            name: self.name,
            section: self.section,
            state: self
                .course_state
                .as_deref()
                .map(CourseState::from_remote)
                .unwrap_or(CourseState::Unspecified),
            last_sync: None,
        }
    }
}

/// Coursework and course materials share this shape
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireWork {
    id: String,
    course_id: Option<String>,
    #[serde(default)]
    title: String,
    description: Option<String>,
    alternate_link: Option<String>,
    creation_time: Option<DateTime<Utc>>,
    update_time: Option<DateTime<Utc>>,
    #[serde(default)]
    materials: Vec<WireMaterial>,
}

impl WireWork {
    fn into_material(self, kind: MaterialKind) -> Material {
        let attachments = into_attachments(&self.id, self.materials);
        Material {
            id: self.id,
            title: self.title,
            course_id: self.course_id,
            kind,
            description: self.description,
            alternate_link: self.alternate_link,
            created_at: self.creation_time,
            updated_at: self.update_time,
            attachments,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAnnouncement {
    id: String,
    course_id: Option<String>,
    #[serde(default)]
    text: String,
    alternate_link: Option<String>,
    creation_time: Option<DateTime<Utc>>,
    update_time: Option<DateTime<Utc>>,
    #[serde(default)]
    materials: Vec<WireMaterial>,
}

impl WireAnnouncement {
    fn into_material(self) -> Material {
        let attachments = into_attachments(&self.id, self.materials);
        Material {
            title: announcement_title(&self.text),
            id: self.id,
            course_id: self.course_id,
            kind: MaterialKind::Announcement,
            description: Some(self.text).filter(|t| !t.is_empty()),
            alternate_link: self.alternate_link,
            created_at: self.creation_time,
            updated_at: self.update_time,
            attachments,
        }
    }
}

/// Announcements have no title; use the start of their text
pub fn announcement_title(text: &str) -> String {
    let title: String = text
        .trim()
        .chars()
        .take(naming::ANNOUNCEMENT_TITLE_LENGTH)
        .collect();
    if title.is_empty() {
        "Announcement".to_string()
    } else {
        title
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMaterial {
    drive_file: Option<WireSharedDriveFile>,
    #[serde(alias = "youTubeVideo")]
    youtube_video: Option<WireYouTube>,
    link: Option<WireLink>,
    form: Option<WireForm>,
    /// Any other material kind, keyed by its field name
    #[serde(flatten)]
    other: serde_json::Map<String, serde_json::Value>,
}

/// Convert wire materials, keeping unknown kinds so they surface as job failures
fn into_attachments(material_id: &str, materials: Vec<WireMaterial>) -> Vec<Attachment> {
    materials
        .into_iter()
        .enumerate()
        .map(|(index, wire)| {
            wire.into_attachment().unwrap_or_else(|kind| {
                warn!(
                    "Material {} has an unsupported attachment kind: {}",
                    material_id, kind
                );
                Attachment {
                    title: None,
                    source: AttachmentSource::Unsupported {
                        key: format!("{}#{}", kind, index),
                        kind,
                    },
                }
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSharedDriveFile {
    drive_file: WireDriveFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDriveFile {
    id: String,
    title: Option<String>,
    alternate_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireYouTube {
    id: String,
    title: Option<String>,
    alternate_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireLink {
    url: String,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireForm {
    form_url: String,
    title: Option<String>,
}

impl WireMaterial {
    /// The attachment, or the name of the unrecognised kind
    fn into_attachment(self) -> Result<Attachment, String> {
        if let Some(shared) = self.drive_file {
            let file = shared.drive_file;
            return Ok(Attachment {
                title: file.title,
                source: AttachmentSource::DriveFile {
                    file_id: file.id,
                    // Listings carry no type; resolved via the file host
                    mime_type: None,
                    alternate_link: file.alternate_link,
                },
            });
        }
        if let Some(video) = self.youtube_video {
            let url = video
                .alternate_link
                .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", video.id));
            return Ok(Attachment {
                title: video.title,
                source: AttachmentSource::YouTubeVideo {
                    video_id: video.id,
                    url,
                },
            });
        }
        if let Some(link) = self.link {
            return Ok(Attachment {
                title: link.title,
                source: AttachmentSource::Link { url: link.url },
            });
        }
        if let Some(form) = self.form {
            return Ok(Attachment {
                title: form.title,
                source: AttachmentSource::Form {
                    form_url: form.form_url,
                },
            });
        }
        Err(self
            .other
            .into_iter()
            .next()
            .map(|(kind, _)| kind)
            .unwrap_or_else(|| "unknown".to_string()))
    }
}
