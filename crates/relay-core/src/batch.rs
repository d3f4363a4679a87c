//! Batch upload lists (`.txt` files of `name : url` lines) and their results.

use chrono::{DateTime, Local};

use crate::{
    formatting::escape_html,
    utils::{filename_from_url, is_url, with_url_extension, FileKind},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchEntry {
    pub file_name: String,
    pub url: String,
    pub kind: FileKind,
    pub line_number: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchOutcome {
    pub file_name: String,
    pub result: std::result::Result<String, String>,
}

impl BatchOutcome {
    pub fn success(file_name: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            result: Ok(download_url.into()),
        }
    }

    pub fn failure(file_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            result: Err(error.into()),
        }
    }
}

/// Parse a batch list.
///
/// Accepted lines:
/// - `name : https://host/file` (split on the first colon)
/// - `https://host/file` (name taken from the URL)
///
/// Blank lines and `#` comments are skipped; anything else is logged and skipped.
pub fn parse_batch(content: &str) -> Vec<BatchEntry> {
    let mut entries = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line_number = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Only a real scheme marks a bare URL; `httpd.conf : https://...` is a named line.
        if is_url(line) {
            let fallback = format!("file_{line_number}");
            entries.push(BatchEntry {
                file_name: filename_from_url(line, &fallback),
                url: line.to_string(),
                kind: FileKind::from_url(line),
                line_number,
            });
            continue;
        }

        let Some((name, url)) = line.split_once(':') else {
            tracing::warn!(line_number, "batch line has no URL");
            continue;
        };
        let (name, url) = (name.trim(), url.trim());
        if name.is_empty() || !is_url(url) {
            tracing::warn!(line_number, "batch line is not `name : url`");
            continue;
        }

        entries.push(BatchEntry {
            file_name: with_url_extension(name, url),
            url: url.to_string(),
            kind: FileKind::from_url(url),
            line_number,
        });
    }

    entries
}

/// Body of the results file sent back after a batch.
pub fn render_results(outcomes: &[BatchOutcome], source_name: &str, now: DateTime<Local>) -> String {
    let mut lines = vec![
        format!("# Upload Results - {}", now.format("%Y-%m-%d %H:%M:%S")),
        format!("# Original file: {source_name}"),
        String::new(),
    ];

    for outcome in outcomes {
        lines.push(match &outcome.result {
            Ok(url) => format!("{} : {url}", outcome.file_name),
            Err(err) => format!("# FAILED: {} - {err}", outcome.file_name),
        });
    }

    lines.join("\n")
}

pub fn results_file_name(source_name: &str, unix_secs: u64) -> String {
    let stem = source_name
        .strip_suffix(".txt")
        .or_else(|| source_name.strip_suffix(".TXT"))
        .unwrap_or(source_name);
    format!("results_{stem}_{unix_secs}.txt")
}

pub fn render_batch_started(source_name: &str, total: usize) -> String {
    format!(
        "📋 <b>Batch Upload Started</b>\n\n📁 <b>Source:</b> <code>{}</code>\n📊 <b>Total Items:</b> {total}\n⏳ <b>Status:</b> Starting...",
        escape_html(source_name)
    )
}

pub fn render_batch_summary(source_name: &str, total: usize, outcomes: &[BatchOutcome]) -> String {
    let successful = outcomes.iter().filter(|o| o.result.is_ok()).count();
    format!(
        "✅ <b>Batch Upload Complete!</b>\n\n📁 <b>Source:</b> <code>{}</code>\n📊 <b>Total:</b> {total} items\n✅ <b>Successful:</b> {successful}\n❌ <b>Failed:</b> {}\n\n📄 <b>Results file attached above</b> ⬆️",
        escape_html(source_name),
        total - successful.min(total),
    )
}

pub fn render_batch_undelivered(source_name: &str, total: usize, processed: usize, error: &str) -> String {
    format!(
        "⚠️ <b>Batch Upload Complete with Issues</b>\n\n📁 <b>Source:</b> <code>{}</code>\n📊 <b>Processed:</b> {processed}/{total}\n❌ <b>Could not send results file:</b> {}",
        escape_html(source_name),
        escape_html(error),
    )
}

/// Reply to an accepted batch file, listing the first entries.
pub fn render_batch_accepted(source_name: &str, entries: &[BatchEntry], position: usize) -> String {
    const PREVIEW: usize = 5;

    let mut out = format!(
        "📋 <b>Batch file received:</b> <code>{}</code>\n📊 <b>Items found:</b> {}\n\n",
        escape_html(source_name),
        entries.len()
    );
    for entry in entries.iter().take(PREVIEW) {
        out.push_str(&format!(
            "• <code>{}</code> ({})\n",
            escape_html(&entry.file_name),
            entry.kind
        ));
    }
    if entries.len() > PREVIEW {
        out.push_str(&format!("... and {} more\n", entries.len() - PREVIEW));
    }
    out.push_str(&format!("\n📋 <b>Queue position:</b> {position}"));
    out
}

pub const BATCH_HELP: &str = "❌ <b>No valid entries found in the file.</b>\n\n\
Use one entry per line:\n\
<code>filename : https://example.com/file.mp4</code>\n\
<code>https://example.com/other.zip</code>\n\n\
Lines starting with <code>#</code> are ignored.";
