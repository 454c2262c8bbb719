//! File and directory naming rules
//!
//! Sanitization is deterministic so that the same title always yields the same
//! base name; collisions are resolved by the placer with numeric suffixes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::app::resolver::FetchPlan;
use crate::constants::{mime, naming};

/// Directory category under each course
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Documents,
    Presentations,
    Spreadsheets,
    Images,
    Videos,
    Audio,
    Archives,
    Web,
    Other,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Documents,
        Category::Presentations,
        Category::Spreadsheets,
        Category::Images,
        Category::Videos,
        Category::Audio,
        Category::Archives,
        Category::Web,
        Category::Other,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Documents => "Documents",
            Self::Presentations => "Presentations",
            Self::Spreadsheets => "Spreadsheets",
            Self::Images => "Images",
            Self::Videos => "Videos",
            Self::Audio => "Audio",
            Self::Archives => "Archives",
            Self::Web => "Web",
            Self::Other => "Other",
        }
    }

    /// Classify by MIME type, falling back to the file extension
    pub fn classify(mime_type: &str, file_name: &str) -> Self {
        Self::from_mime(mime_type).unwrap_or_else(|| {
            let (_, ext) = split_extension(file_name);
            Self::from_extension(ext.trim_start_matches('.')).unwrap_or(Self::Other)
        })
    }

    fn from_mime(mime_type: &str) -> Option<Self> {
        let mime_type = mime_type.to_ascii_lowercase();
        if mime_type.starts_with("image/") {
            return Some(Self::Images);
        }
        if mime_type.starts_with("video/") {
            return Some(Self::Videos);
        }
        if mime_type.starts_with("audio/") {
            return Some(Self::Audio);
        }

        match mime_type.as_str() {
            mime::PDF
            | mime::TEXT_PLAIN
            | "application/msword"
            | "application/rtf"
            | "application/vnd.oasis.opendocument.text"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(Self::Documents)
            }
            "application/vnd.ms-powerpoint"
            | "application/vnd.oasis.opendocument.presentation"
            | "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
                Some(Self::Presentations)
            }
            mime::XLSX
            | "application/vnd.ms-excel"
            | "application/vnd.oasis.opendocument.spreadsheet"
            | "text/csv" => Some(Self::Spreadsheets),
            "application/zip"
            | "application/x-rar-compressed"
            | "application/x-7z-compressed"
            | "application/x-tar"
            | "application/gzip" => Some(Self::Archives),
            "text/html" | "text/css" | "text/javascript" | "application/json"
            | "application/xml" | "text/xml" => Some(Self::Web),
            _ => None,
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" | "doc" | "docx" | "odt" | "rtf" | "txt" => Some(Self::Documents),
            "ppt" | "pptx" | "odp" => Some(Self::Presentations),
            "xls" | "xlsx" | "ods" | "csv" => Some(Self::Spreadsheets),
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "svg" | "tiff" => Some(Self::Images),
            "mp4" | "avi" | "mov" | "wmv" | "flv" | "webm" | "mkv" | "mpeg" => Some(Self::Videos),
            "mp3" | "wav" | "ogg" | "m4a" | "flac" | "aac" => Some(Self::Audio),
            "zip" | "rar" | "7z" | "tar" | "gz" => Some(Self::Archives),
            "html" | "htm" | "css" | "js" | "json" | "xml" => Some(Self::Web),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Conventional extension (with dot) for a MIME type
pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let ext = match mime_type {
        mime::PDF | mime::NATIVE_DOCUMENT | mime::NATIVE_PRESENTATION | mime::NATIVE_DRAWING => {
            ".pdf"
        }
        mime::NATIVE_SPREADSHEET | mime::XLSX => ".xlsx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => ".docx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => ".pptx",
        "application/msword" => ".doc",
        "application/vnd.ms-powerpoint" => ".ppt",
        "application/vnd.ms-excel" => ".xls",
        mime::TEXT_PLAIN => ".txt",
        "text/csv" => ".csv",
        "text/html" => ".html",
        "text/css" => ".css",
        "text/javascript" => ".js",
        "application/json" => ".json",
        "application/xml" | "text/xml" => ".xml",
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/bmp" => ".bmp",
        "image/svg+xml" => ".svg",
        "video/mp4" => ".mp4",
        "video/mpeg" => ".mpeg",
        "video/quicktime" => ".mov",
        "video/x-msvideo" => ".avi",
        "audio/mpeg" => ".mp3",
        "audio/wav" => ".wav",
        "audio/ogg" => ".ogg",
        "application/zip" => ".zip",
        "application/x-rar-compressed" => ".rar",
        "application/x-7z-compressed" => ".7z",
        _ => return None,
    };
    Some(ext)
}

/// Split `name` into stem and extension (extension keeps its dot)
///
/// A leading dot does not start an extension, so `.profile` has none.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx < name.len() - 1 => {
            (&name[..idx], &name[idx..])
        }
        _ => (name, ""),
    }
}

fn clean(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| {
            if c.is_control() || naming::UNSAFE_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim_matches(|c| c == '.' || c == ' ');

    let mut collapsed = String::with_capacity(trimmed.len());
    let mut in_run = false;
    for c in trimmed.chars() {
        if c.is_whitespace() || c == '_' {
            if !in_run {
                collapsed.push('_');
            }
            in_run = true;
        } else {
            collapsed.push(c);
            in_run = false;
        }
    }
    collapsed
}

fn truncate_chars(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

fn truncate_bytes(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut idx = max;
    while !value.is_char_boundary(idx) {
        idx -= 1;
    }
    &value[..idx]
}

/// Cut a stem so it fits both the character and the byte budget
fn truncate_stem(stem: &str, max_chars: usize, max_bytes: usize) -> &str {
    truncate_bytes(truncate_chars(stem, max_chars), max_bytes)
}

fn trim_tail(value: &str) -> &str {
    value.trim_end_matches(|c| c == '_' || c == '.' || c == ' ')
}

/// Sanitize a file name, keeping its extension within `max_length` characters
///
/// The result also never exceeds [`naming::MAX_NAME_BYTES`] bytes.
pub fn sanitize_file_name(raw: &str, max_length: usize) -> String {
    let mut name = clean(raw);

    if name.chars().count() > max_length || name.len() > naming::MAX_NAME_BYTES {
        let (stem, ext) = split_extension(&name);
        let ext_len = ext.chars().count();
        name = if looks_like_extension(ext) && ext_len < max_length {
            let stem = trim_tail(truncate_stem(
                stem,
                max_length - ext_len,
                naming::MAX_NAME_BYTES - ext.len(),
            ));
            format!("{}{}", stem, ext)
        } else {
            trim_tail(truncate_stem(&name, max_length, naming::MAX_NAME_BYTES)).to_string()
        };
    }

    if name.is_empty() || name == "." || name == ".." {
        naming::UNTITLED_FILE.to_string()
    } else {
        name
    }
}

/// Sanitize a course name for use as a directory
pub fn sanitize_course_name(raw: &str) -> String {
    let mut name = clean(raw);
    if name.chars().count() > naming::MAX_COURSE_DIR_LENGTH || name.len() > naming::MAX_NAME_BYTES
    {
        name = trim_tail(truncate_stem(
            &name,
            naming::MAX_COURSE_DIR_LENGTH,
            naming::MAX_NAME_BYTES,
        ))
        .to_string();
    }
    if name.is_empty() {
        naming::UNTITLED_COURSE.to_string()
    } else {
        name
    }
}

/// Directory name for an optional course
pub fn course_dir_name(course_name: Option<&str>) -> String {
    match course_name.map(str::trim) {
        None | Some("") => naming::UNCATEGORIZED_DIR.to_string(),
        Some(name) if name.eq_ignore_ascii_case(naming::UNCATEGORIZED_DIR) => {
            naming::UNCATEGORIZED_DIR.to_string()
        }
        Some(name) => sanitize_course_name(name),
    }
}

/// Sanitized name with an extension guaranteed when the MIME type has one
pub fn base_file_name(raw: &str, mime_type: &str) -> String {
    let name = sanitize_file_name(raw, naming::MAX_FILE_NAME_LENGTH);
    if looks_like_extension(split_extension(&name).1) {
        return name;
    }
    match extension_for_mime(mime_type) {
        Some(ext) => {
            let stem = truncate_stem(
                &name,
                naming::MAX_FILE_NAME_LENGTH - ext.len(),
                naming::MAX_NAME_BYTES - ext.len(),
            );
            format!("{}{}", stem, ext)
        }
        None => name,
    }
}

/// `name.ext` for n == 0, else `name_n.ext`
pub fn candidate_name(base: &str, n: u32) -> String {
    if n == 0 {
        return base.to_string();
    }
    let (stem, ext) = split_extension(base);
    format!("{}_{}{}", stem, n, ext)
}

// Extensions that look like a real format suffix rather than part of a title,
// so "3.1" in "Lecture 3.1" is not one
fn looks_like_extension(ext: &str) -> bool {
    let ext = ext.trim_start_matches('.');
    (1..=7).contains(&ext.len())
        && ext.chars().all(|c| c.is_ascii_alphanumeric())
        && ext.chars().any(|c| c.is_ascii_alphabetic())
}

/// File name a plan's payload should be stored under
///
/// Exports take the export format's extension in place of any existing one;
/// shortcuts are stored as text notes.
pub fn file_name_for_plan(title: &str, plan: &FetchPlan) -> String {
    let title = title.trim();
    match plan {
        FetchPlan::Export { format, .. } => {
            let (stem, ext) = split_extension(title);
            let stem = if looks_like_extension(ext) { stem } else { title };
            format!("{}.{}", stem, format.extension())
        }
        FetchPlan::Shortcut(_) => format!("{}.txt", title),
        FetchPlan::Direct { .. } => title.to_string(),
    }
}
