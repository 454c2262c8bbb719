//! Attachment resolution
//!
//! Turns an attachment reference into a [`FetchPlan`] describing how its bytes
//! are obtained. Native editable formats on the file host have no byte
//! representation of their own and must be exported server side; everything
//! else on the file host is fetched directly. Links, videos and forms become
//! shortcut notes that never touch the network.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::models::{Attachment, AttachmentSource, Material};
use crate::constants::mime;
use crate::errors::ResolveError;

/// Target format for server-side export of native files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportFormat {
    Pdf,
    Xlsx,
}

impl ExportFormat {
    /// Export target for a native MIME type, if it has one
    pub fn for_native(mime_type: &str) -> Option<Self> {
        match mime_type {
            mime::NATIVE_DOCUMENT | mime::NATIVE_PRESENTATION | mime::NATIVE_DRAWING => {
                Some(Self::Pdf)
            }
            mime::NATIVE_SPREADSHEET => Some(Self::Xlsx),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => mime::PDF,
            Self::Xlsx => mime::XLSX,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Xlsx => "xlsx",
        }
    }
}

/// What kind of non-file attachment a shortcut stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShortcutKind {
    Link,
    Video,
    Form,
}

impl fmt::Display for ShortcutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Link => "Web Link",
            Self::Video => "YouTube Video",
            Self::Form => "Form",
        })
    }
}

/// A small text note standing in for a link-like attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortcut {
    pub kind: ShortcutKind,
    pub title: String,
    pub url: String,
    pub material_title: Option<String>,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Shortcut {
    /// Attach the owning material's context to the note
    pub fn with_material(mut self, material: &Material) -> Self {
        self.material_title = Some(material.title.clone());
        self.description = material.description.clone();
        self.created_at = material.created_at;
        self
    }

    /// Note body; deterministic for identical inputs so re-runs deduplicate
    pub fn render(&self) -> String {
        format!(
            "{}: {}\nURL: {}\nMaterial: {}\nDescription: {}\nDate: {}\n",
            self.kind,
            self.title,
            self.url,
            self.material_title.as_deref().unwrap_or(""),
            self.description.as_deref().unwrap_or(""),
            self.created_at.map(|d| d.to_rfc3339()).unwrap_or_default(),
        )
    }
}

/// How to obtain the bytes behind an attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchPlan {
    /// Byte GET of the stored file
    Direct { file_id: String },
    /// Server-side conversion then byte GET
    Export { file_id: String, format: ExportFormat },
    /// Locally rendered note; no remote call
    Shortcut(Shortcut),
}

impl FetchPlan {
    /// Remote identifier used in log lines and error messages
    pub fn remote_id(&self) -> &str {
        match self {
            Self::Direct { file_id } | Self::Export { file_id, .. } => file_id,
            Self::Shortcut(shortcut) => &shortcut.url,
        }
    }

    /// Whether executing the plan spends rate-limit budget
    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::Shortcut(_))
    }
}

/// Maps attachments to fetch plans
#[derive(Debug, Clone, Copy, Default)]
pub struct AttachmentResolver;

impl AttachmentResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a single attachment
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::UnsupportedAttachmentKind` for native formats that
    /// have no export target (forms, folders, sites, ...)
    pub fn resolve(&self, attachment: &Attachment) -> Result<FetchPlan, ResolveError> {
        match &attachment.source {
            AttachmentSource::DriveFile {
                file_id, mime_type, ..
            } => {
                let declared = mime_type.as_deref().unwrap_or(mime::OCTET_STREAM);
                if let Some(format) = ExportFormat::for_native(declared) {
                    Ok(FetchPlan::Export {
                        file_id: file_id.clone(),
                        format,
                    })
                } else if declared.starts_with(mime::NATIVE_PREFIX) {
                    Err(ResolveError::UnsupportedAttachmentKind {
                        title: attachment.display_name().to_string(),
                        mime_type: declared.to_string(),
                    })
                } else {
                    Ok(FetchPlan::Direct {
                        file_id: file_id.clone(),
                    })
                }
            }
            AttachmentSource::Link { url } => Ok(Self::shortcut(
                ShortcutKind::Link,
                attachment.title.as_deref().unwrap_or("Web Link"),
                url,
            )),
            AttachmentSource::YouTubeVideo { url, .. } => Ok(Self::shortcut(
                ShortcutKind::Video,
                attachment.title.as_deref().unwrap_or("YouTube Video"),
                url,
            )),
            AttachmentSource::Form { form_url } => Ok(Self::shortcut(
                ShortcutKind::Form,
                attachment.title.as_deref().unwrap_or("Form"),
                form_url,
            )),
            AttachmentSource::Unsupported { kind, .. } => {
                Err(ResolveError::UnsupportedAttachmentKind {
                    title: attachment.display_name().to_string(),
                    mime_type: kind.clone(),
                })
            }
        }
    }

    /// Resolve an attachment in the context of its material
    pub fn resolve_for(
        &self,
        material: &Material,
        attachment: &Attachment,
    ) -> Result<FetchPlan, ResolveError> {
        match self.resolve(attachment)? {
            FetchPlan::Shortcut(shortcut) => Ok(FetchPlan::Shortcut(shortcut.with_material(material))),
            plan => Ok(plan),
        }
    }

    fn shortcut(kind: ShortcutKind, title: &str, url: &str) -> FetchPlan {
        FetchPlan::Shortcut(Shortcut {
            kind,
            title: title.to_string(),
            url: url.to_string(),
            material_title: None,
            description: None,
            created_at: None,
        })
    }
}
