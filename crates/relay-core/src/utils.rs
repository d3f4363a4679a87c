use std::{fmt, sync::OnceLock};

use regex::Regex;

// ============== Timestamp Helpers ==============

/// Seconds since the Unix epoch (0 if the clock is before it).
pub fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ============== Filenames ==============

fn forbidden_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:"|?*\\/\x00-\x1f\x7f]"#).expect("valid regex"))
}

fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Make a name safe for use as a release asset while keeping non-ASCII
/// letters (Hindi, Arabic, ...) intact.
///
/// Only the stem is rewritten; the extension after the last `.` is kept as is.
pub fn sanitize_filename(name: &str) -> String {
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, ext),
        None => (name, ""),
    };

    let stem = forbidden_chars().replace_all(stem, "_");
    let stem = whitespace_runs().replace_all(&stem, " ");
    let mut stem = stem.trim_matches(|c| c == ' ' || c == '.').to_string();
    if stem.is_empty() {
        stem = "file".to_string();
    }

    if ext.is_empty() {
        stem
    } else {
        format!("{stem}.{ext}")
    }
}

// ============== URLs ==============

pub fn is_url(text: &str) -> bool {
    (text.starts_with("http://") || text.starts_with("https://")) && text.len() > 8
}

/// Broad category of a URL target, used for display only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Video,
    Playlist,
    Audio,
    Document,
    Image,
    Archive,
    Unknown,
}

impl FileKind {
    pub fn from_url(url: &str) -> Self {
        let ext = url_extension(url);
        match ext.as_str() {
            "mp4" | "mkv" | "avi" | "mov" | "wmv" | "flv" | "webm" => FileKind::Video,
            "m3u8" | "m3u" => FileKind::Playlist,
            "mp3" | "wav" | "flac" | "aac" | "ogg" => FileKind::Audio,
            "pdf" | "doc" | "docx" | "txt" | "rtf" => FileKind::Document,
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" => FileKind::Image,
            "zip" | "rar" | "7z" | "tar" | "gz" => FileKind::Archive,
            _ => FileKind::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Video => "video",
            FileKind::Playlist => "m3u8",
            FileKind::Audio => "audio",
            FileKind::Document => "document",
            FileKind::Image => "image",
            FileKind::Archive => "archive",
            FileKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last path segment of a URL, without query string or fragment.
fn last_path_segment(url: &str) -> &str {
    let no_query = url.split(['?', '#']).next().unwrap_or("");
    let after_scheme = no_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(no_query);
    // Drop the host so `https://example.com` has no segment.
    let path = after_scheme.split_once('/').map(|(_, p)| p).unwrap_or("");
    path.rsplit('/').next().unwrap_or("")
}

/// Lowercased extension of the URL's last path segment, or empty.
pub fn url_extension(url: &str) -> String {
    let seg = last_path_segment(url);
    match seg.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 8
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => String::new(),
    }
}

/// Derive an asset name from a download URL.
///
/// Uses the last path segment; falls back to `fallback` when there is none
/// and appends `.bin` when the result has no extension.
pub fn filename_from_url(url: &str, fallback: &str) -> String {
    let seg = last_path_segment(url);
    let name = if seg.is_empty() { fallback } else { seg };
    if name.contains('.') {
        name.to_string()
    } else {
        format!("{name}.bin")
    }
}

/// Append the URL's extension to `name` if it has none.
pub fn with_url_extension(name: &str, url: &str) -> String {
    if name.contains('.') {
        return name.to_string();
    }
    let ext = url_extension(url);
    if ext.is_empty() {
        name.to_string()
    } else {
        format!("{name}.{ext}")
    }
}
