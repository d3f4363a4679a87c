//! Formatting utilities (sizes, progress bars, Telegram HTML status messages).

use crate::{domain::ReleaseAsset, progress::ProgressSnapshot, utils::FileKind};

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Human-readable size with one decimal, in 1024 steps.
pub fn format_size(bytes: f64) -> String {
    let mut size = bytes.max(0.0);
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}

pub fn format_bytes(bytes: u64) -> String {
    format_size(bytes as f64)
}

const BAR_CELLS: usize = 20;

/// 20-cell bar, one cell per 5%.
pub fn progress_bar(percent: f64) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 5.0).floor() as usize).min(BAR_CELLS);
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_CELLS - filled))
}

/// Which leg of the relay a progress message describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    DownloadTelegram,
    DownloadUrl,
    Upload,
}

impl Phase {
    pub fn title(self) -> &'static str {
        match self {
            Phase::DownloadTelegram => "📥 <b>Downloading from Telegram...</b>",
            Phase::DownloadUrl => "📥 <b>Downloading from URL...</b>",
            Phase::Upload => "📤 <b>Uploading to GitHub...</b>",
        }
    }
}

/// 1-based position of an item among the items handled in one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    pub index: usize,
    pub total: usize,
}

impl Position {
    pub fn single() -> Self {
        Self { index: 1, total: 1 }
    }

    pub fn remaining(self) -> usize {
        self.total.saturating_sub(self.index)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.index, self.total)
    }
}

pub fn render_progress(
    phase: Phase,
    position: Position,
    file_name: &str,
    snap: &ProgressSnapshot,
) -> String {
    let mut lines = vec![
        format!("{} ({position})", phase.title()),
        String::new(),
        format!("📁 <code>{}</code>", escape_html(file_name)),
    ];

    match (snap.total, snap.percent) {
        (Some(total), Some(percent)) => {
            lines.push(format!(
                "📊 {} / {}",
                format_bytes(snap.bytes),
                format_bytes(total)
            ));
            lines.push(format!("⏳ {percent:.1}%"));
            lines.push(format!("🚀 Speed: {}/s", format_size(snap.speed_bps)));
            lines.push(format!("📋 Remaining: {} files", position.remaining()));
            lines.push(progress_bar(percent));
        }
        _ => {
            lines.push(format!("📊 {} (size unknown)", format_bytes(snap.bytes)));
            lines.push(format!("🚀 Speed: {}/s", format_size(snap.speed_bps)));
            lines.push(format!("📋 Remaining: {} files", position.remaining()));
        }
    }

    lines.join("\n")
}

pub fn render_file_queued(file_name: &str, size: u64, position: usize) -> String {
    format!(
        "📋 <b>File Queued</b>\n\n📁 <b>File:</b> <code>{}</code>\n📊 <b>Size:</b> {}\n🔢 <b>Position:</b> {position}",
        escape_html(file_name),
        format_bytes(size),
    )
}

pub fn render_url_queued(url: &str, file_name: &str, kind: FileKind, position: usize) -> String {
    format!(
        "📋 <b>URL Queued</b>\n\n🔗 <b>URL:</b> <code>{}</code>\n📁 <b>File:</b> <code>{}</code>\n📋 <b>Type:</b> <code>{kind}</code>\n🔢 <b>Position:</b> {position}",
        escape_html(url),
        escape_html(file_name),
    )
}

pub fn render_starting(phase: Phase, position: Position, file_name: &str, detail: &str) -> String {
    format!(
        "{} ({position})\n📁 <b>File:</b> <code>{}</code>\n{detail}📋 <b>Remaining:</b> {} files\n⏳ Starting...",
        phase.title(),
        escape_html(file_name),
        position.remaining()
    )
}

pub fn render_complete(
    position: Position,
    file_name: &str,
    size: u64,
    download_url: &str,
    queued: usize,
) -> String {
    let queue_text = if queued > 0 {
        format!("\n\n📋 <b>Queue:</b> {queued} files remaining")
    } else {
        String::new()
    };
    format!(
        "✅ <b>Upload Complete!</b> ({position})\n\n📁 <b>File:</b> <code>{}</code>\n📊 <b>Size:</b> {}\n🔗 <b>Download URL:</b>\n{}{queue_text}",
        escape_html(file_name),
        format_bytes(size),
        escape_html(download_url),
    )
}

pub fn render_failed(position: Position, error: &str) -> String {
    format!(
        "❌ <b>Upload Failed</b> ({position})\n\nError: {}",
        escape_html(&truncate(error, 300))
    )
}

/// One page of the release listing plus the page count.
pub fn render_asset_page(assets: &[ReleaseAsset], page: usize, page_size: usize) -> Option<(String, usize)> {
    let page_size = page_size.max(1);
    let total_pages = assets.len().div_ceil(page_size).max(1);
    if page == 0 || page > total_pages || assets.is_empty() {
        return None;
    }

    let start = (page - 1) * page_size;
    let end = (start + page_size).min(assets.len());

    let mut out = format!("📂 <b>Files in Release (Page {page}/{total_pages}):</b>\n\n");
    for (i, asset) in assets[start..end].iter().enumerate() {
        out.push_str(&render_asset_entry(start + i + 1, asset));
    }
    out.push_str(&format!(
        "📄 <b>Total:</b> {} files | <b>Page:</b> {page}/{total_pages}\n🗑️ Use <code>/delete &lt;number&gt;</code> to delete a file\n✏️ Use <code>/rename &lt;number&gt; &lt;new_name&gt;</code> to rename a file",
        assets.len()
    ));
    Some((out, total_pages))
}

pub fn render_asset_entry(number: usize, asset: &ReleaseAsset) -> String {
    format!(
        "<b>{number}.</b> <code>{}</code>\n   📊 Size: {:.1} MB\n   🔗 <a href=\"{}\">Download</a>\n\n",
        escape_html(&asset.name),
        asset.size as f64 / (1024.0 * 1024.0),
        escape_html(&asset.browser_download_url),
    )
}

pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    format!("{}...", s.chars().take(max_chars).collect::<String>())
}
