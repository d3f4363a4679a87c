use teloxide::prelude::*;

use relay_core::{
    domain::{ChatId, ReleaseAsset, UserId},
    formatting::{escape_html, render_asset_entry, render_asset_page},
    messaging::types::{InlineButton, InlineKeyboard},
    queue::{render_queue, ActiveUpload},
    utils::sanitize_filename,
};

use crate::router::AppState;

const SEARCH_LIMIT: usize = 20;

pub(super) const ACCESS_DENIED: &str =
    "❌ <b>Access Denied</b>\n\nThis command is only available to administrators.";
pub(super) const NO_FILES: &str = "📂 <b>No files found in release</b>";

pub(super) const LIST_PAGE_PREFIX: &str = "list_page_";
pub(super) const CLOSE_LIST: &str = "close_list";

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

fn start_text(is_admin: bool) -> String {
    let role = if is_admin {
        "<b>Admin User</b>"
    } else {
        "<b>Regular User</b>"
    };
    let mut out = format!(
        "🤖 <b>GitHub Release Uploader Bot</b>\n\n👤 {role}\n\n\
Send me files or URLs to upload to GitHub release!\n\n\
<b>Features:</b>\n\
• Send multiple files - they'll upload one by one\n\
• Send multiple URLs - processed in order\n\
• Send TXT files with filename:url format for batch upload\n\
• Real-time progress with speed display\n\
• Queue system for batch uploads\n\
• Preserves Unicode filenames (Hindi, etc.)\n\n\
<b>Commands:</b>\n\
• /help - Show usage\n\
• /status - Check upload status\n\
• /queue - Check queue status"
    );
    if is_admin {
        out.push_str(
            "\n• /list - List files in release with navigation\n\
• /search &lt;filename&gt; - Search files by name\n\
• /delete &lt;number&gt; - Delete file by list number\n\
• /rename &lt;number&gt; &lt;new_filename&gt; - Rename file\n\
• /stop - Stop all processes\n\
• /restart - Restart all processes",
        );
    }
    out
}

fn help_text(is_admin: bool, repo: &str, tag: &str, max_file_size: u64) -> String {
    let mut out = format!(
        "<b>How to use:</b>\n\n\
1. <b>File Upload</b>: Send any file directly to the bot\n\
2. <b>URL Upload</b>: Send a URL pointing to a file\n\
3. <b>Batch Upload</b>: Send TXT file with filename:url pairs\n\
4. <b>Queue System</b>: Send multiple files/URLs - they'll queue automatically\n\n\
<b>TXT File Format for Batch Upload:</b>\n\
<pre>movie1.mp4 : https://example.com/video1.mp4\n\
document.pdf : https://example.com/doc.pdf\n\
https://example.com/audio.mp3</pre>\n\n\
<b>Features:</b>\n\
• Supports files up to {}\n\
• Real-time progress updates with speed\n\
• Direct upload to GitHub releases\n\
• Batch upload generates results TXT file\n\n\
<b>Target Repository:</b> <code>{}</code>\n\
<b>Release Tag:</b> <code>{}</code>",
        relay_core::formatting::format_bytes(max_file_size),
        escape_html(repo),
        escape_html(tag),
    );
    if is_admin {
        out.push_str(
            "\n\n<b>Admin Commands:</b>\n\
• /list - Browse files with navigation buttons\n\
• /search &lt;filename&gt; - Search files by name\n\
• /delete &lt;number&gt; - Remove file by list number\n\
• /rename &lt;number&gt; &lt;new_name&gt; - Rename file by list number\n\
• /stop - Stop all running processes\n\
• /restart - Restart all processes",
        );
    }
    out
}

fn status_text(active: Option<&ActiveUpload>, queued: usize) -> String {
    let Some(a) = active else {
        return "📊 <b>No active uploads</b>".to_string();
    };
    format!(
        "📊 <b>Upload Status</b>\n\n📁 <b>Current File:</b> <code>{}</code>\n📋 <b>Progress:</b> {}/{}\n⏳ <b>Remaining:</b> {} files\n📥 <b>Queued:</b> {queued}",
        escape_html(&a.file_name),
        a.index,
        a.total,
        a.remaining,
    )
}

/// Text and navigation keyboard for one page of the release listing.
pub(super) fn list_view(
    assets: &[ReleaseAsset],
    page: usize,
    page_size: usize,
) -> (String, Option<InlineKeyboard>) {
    if assets.is_empty() {
        return (NO_FILES.to_string(), None);
    }
    let Some((text, total_pages)) = render_asset_page(assets, page, page_size) else {
        let total_pages = assets.len().div_ceil(page_size.max(1));
        return (
            format!("📂 <b>Page {page} not found</b>\n\nTotal pages: {total_pages}"),
            None,
        );
    };
    (text, Some(list_keyboard(page, total_pages)))
}

fn list_keyboard(page: usize, total_pages: usize) -> InlineKeyboard {
    let mut nav = Vec::new();
    if page > 1 {
        nav.push(InlineButton::new(
            "◀️ Previous",
            format!("{LIST_PAGE_PREFIX}{}", page - 1),
        ));
    }
    if page < total_pages {
        nav.push(InlineButton::new(
            "Next ▶️",
            format!("{LIST_PAGE_PREFIX}{}", page + 1),
        ));
    }

    let mut keyboard = InlineKeyboard::default();
    keyboard.push_row(nav);
    keyboard.push_row(vec![InlineButton::new("❌ Close", CLOSE_LIST)]);
    keyboard
}

fn render_search(assets: &[ReleaseAsset], term: &str) -> String {
    let needle = term.to_lowercase();
    let matches: Vec<(usize, &ReleaseAsset)> = assets
        .iter()
        .enumerate()
        .filter(|(_, a)| a.name.to_lowercase().contains(&needle))
        .map(|(i, a)| (i + 1, a))
        .collect();

    if matches.is_empty() {
        return format!(
            "🔍 <b>No files found matching:</b> <code>{}</code>",
            escape_html(term)
        );
    }

    let mut out = format!(
        "🔍 <b>Search Results for:</b> <code>{}</code>\n\n",
        escape_html(term)
    );
    for (number, asset) in matches.iter().take(SEARCH_LIMIT) {
        out.push_str(&render_asset_entry(*number, asset));
    }
    if matches.len() > SEARCH_LIMIT {
        out.push_str(&format!(
            "... and {} more results\n\n",
            matches.len() - SEARCH_LIMIT
        ));
    }
    out.push_str(&format!(
        "📊 <b>Found:</b> {} files\n🗑️ Use <code>/delete &lt;number&gt;</code> to delete a file",
        matches.len()
    ));
    out
}

/// Parse a 1-based list number.
fn parse_file_number(raw: &str) -> Result<usize, &'static str> {
    match raw.trim().parse::<i64>() {
        Ok(n) if n >= 1 => Ok(n as usize),
        Ok(_) => Err("❌ <b>Invalid file number</b>\n\nFile numbers start from 1"),
        Err(_) => Err("❌ <b>Invalid file number</b>\n\nPlease provide a valid number"),
    }
}

fn not_found(number: usize, total: usize) -> String {
    format!("❌ <b>File number {number} not found</b>\n\nTotal files: {total}")
}

fn external_error(action: &str, e: &relay_core::Error) -> String {
    format!(
        "❌ <b>Error {action}</b>\n\n{}",
        escape_html(&e.to_string())
    )
}

pub async fn handle_command(
    chat: ChatId,
    user: UserId,
    text: &str,
    state: &AppState,
) -> ResponseResult<()> {
    let (cmd, args) = parse_command(text);
    let is_admin = state.cfg.is_admin(user);
    tracing::debug!(user_id = user.0, %cmd, "command received");

    let reply = match cmd.as_str() {
        "start" => start_text(is_admin),
        "help" => help_text(
            is_admin,
            &state.cfg.github_repo,
            &state.cfg.github_release_tag,
            state.cfg.max_file_size,
        ),
        "status" => {
            let queue = state.service.queue();
            let active = queue.active(user).await;
            status_text(active.as_ref(), queue.pending_len(user).await)
        }
        "queue" => {
            let queue = state.service.queue();
            let active = queue.active(user).await;
            render_queue(&queue.pending(user).await, active.as_ref())
        }
        "list" | "search" | "delete" | "rename" | "stop" | "restart" if !is_admin => {
            tracing::info!(user_id = user.0, %cmd, "admin command refused");
            ACCESS_DENIED.to_string()
        }
        "list" => return send_list(chat, state).await,
        "search" => search(&args, state).await,
        "delete" => delete(&args, state).await,
        "rename" => return rename(chat, &args, state).await,
        "stop" => {
            let dropped = state.service.queue().stop_all().await;
            tracing::warn!(user_id = user.0, dropped, "all uploads stopped");
            format!(
                "🛑 <b>All processes stopped</b>\n\nAll uploads, queues, and active processes have been halted.\n🗑️ Cleared {dropped} queued items.\n\nUse /restart to resume operations."
            )
        }
        "restart" => {
            state.service.queue().restart();
            tracing::info!(user_id = user.0, "uploads resumed");
            "✅ <b>Bot restarted successfully</b>\n\nAll processes are now running normally."
                .to_string()
        }
        _ => "❓ Unknown command. Use /help to see what I can do.".to_string(),
    };

    let _ = state.messenger.send_html(chat, &reply).await;
    Ok(())
}

async fn send_list(chat: ChatId, state: &AppState) -> ResponseResult<()> {
    let assets = match state.store().list_assets().await {
        Ok(assets) => assets,
        Err(e) => {
            let _ = state
                .messenger
                .send_html(chat, &external_error("listing files", &e))
                .await;
            return Ok(());
        }
    };

    let (text, keyboard) = list_view(&assets, 1, state.cfg.list_page_size);
    let _ = match keyboard {
        Some(kb) => state
            .messenger
            .send_inline_keyboard(chat, &text, kb)
            .await
            .map(|_| ()),
        None => state.messenger.send_html(chat, &text).await.map(|_| ()),
    };
    Ok(())
}

async fn search(args: &str, state: &AppState) -> String {
    if args.is_empty() {
        return "❌ <b>Usage:</b> <code>/search &lt;filename&gt;</code>".to_string();
    }
    match state.store().list_assets().await {
        Ok(assets) if assets.is_empty() => NO_FILES.to_string(),
        Ok(assets) => render_search(&assets, args),
        Err(e) => external_error("searching files", &e),
    }
}

async fn delete(args: &str, state: &AppState) -> String {
    if args.is_empty() {
        return "❌ <b>Usage:</b> <code>/delete &lt;number&gt;</code>".to_string();
    }
    let number = match parse_file_number(args) {
        Ok(n) => n,
        Err(msg) => return msg.to_string(),
    };

    let assets = match state.store().list_assets().await {
        Ok(assets) => assets,
        Err(e) => return external_error("deleting file", &e),
    };
    if assets.is_empty() {
        return NO_FILES.to_string();
    }
    let Some(target) = assets.get(number - 1) else {
        return not_found(number, assets.len());
    };

    match state.store().delete_asset_by_name(&target.name).await {
        Ok(true) => format!(
            "✅ <b>File deleted successfully</b>\n\n🗑️ <b>File #{number}:</b> <code>{}</code>",
            escape_html(&target.name)
        ),
        Ok(false) => format!(
            "❌ <b>Failed to delete file</b>\n\n📁 <b>File:</b> <code>{}</code>",
            escape_html(&target.name)
        ),
        Err(e) => external_error("deleting file", &e),
    }
}

async fn rename(chat: ChatId, args: &str, state: &AppState) -> ResponseResult<()> {
    let reply = rename_reply(chat, args, state).await;
    let _ = state.messenger.send_html(chat, &reply).await;
    Ok(())
}

async fn rename_reply(chat: ChatId, args: &str, state: &AppState) -> String {
    let Some((raw_number, new_name)) = args.split_once(char::is_whitespace) else {
        return "❌ <b>Usage:</b> <code>/rename &lt;number&gt; &lt;new_name&gt;</code>".to_string();
    };
    let number = match parse_file_number(raw_number) {
        Ok(n) => n,
        Err(msg) => return msg.to_string(),
    };
    let new_name = new_name.trim();
    if new_name.is_empty() {
        return "❌ <b>Invalid filename</b>\n\nPlease provide a valid new filename".to_string();
    }

    let sanitized = sanitize_filename(new_name);
    if sanitized != new_name {
        let _ = state
            .messenger
            .send_html(
                chat,
                &format!(
                    "ℹ️ <b>Filename sanitized:</b> <code>{}</code> -&gt; <code>{}</code>",
                    escape_html(new_name),
                    escape_html(&sanitized)
                ),
            )
            .await;
    }

    let assets = match state.store().list_assets().await {
        Ok(assets) => assets,
        Err(e) => return external_error("renaming file", &e),
    };
    if assets.is_empty() {
        return NO_FILES.to_string();
    }
    let Some(target) = assets.get(number - 1) else {
        return not_found(number, assets.len());
    };
    if assets.iter().any(|a| a.name == sanitized) {
        return format!(
            "❌ <b>Filename already exists</b>\n\n📁 <b>File:</b> <code>{}</code>",
            escape_html(&sanitized)
        );
    }

    match state.store().rename_asset(&target.name, &sanitized).await {
        Ok(true) => {
            let mut out = format!(
                "✅ <b>File renamed successfully</b>\n\n📁 <b>File #{number}</b>\n🔄 <b>From:</b> <code>{}</code>\n🔄 <b>To:</b> <code>{}</code>",
                escape_html(&target.name),
                escape_html(&sanitized)
            );
            if let Ok(Some(url)) = state.store().download_url(&sanitized).await {
                out.push_str(&format!("\n🔗 <a href=\"{}\">Download</a>", escape_html(&url)));
            }
            out
        }
        Ok(false) => format!(
            "❌ <b>Failed to rename file</b>\n\n📁 <b>File:</b> <code>{}</code>",
            escape_html(&target.name)
        ),
        Err(e) => external_error("renaming file", &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(id: u64, name: &str) -> ReleaseAsset {
        ReleaseAsset {
            id,
            name: name.to_string(),
            size: 1024 * 1024,
            browser_download_url: format!("https://github.com/o/r/releases/download/t/{name}"),
        }
    }

    #[test]
    fn parses_commands_with_bot_suffix() {
        assert_eq!(
            parse_command("/rename@relay_bot 3 new name.mp4"),
            ("rename".to_string(), "3 new name.mp4".to_string())
        );
        assert_eq!(parse_command("/LIST"), ("list".to_string(), String::new()));
    }

    #[test]
    fn file_numbers_start_at_one() {
        assert_eq!(parse_file_number(" 4 "), Ok(4));
        assert!(parse_file_number("0").unwrap_err().contains("start from 1"));
        assert!(parse_file_number("abc").unwrap_err().contains("valid number"));
    }

    #[test]
    fn admin_commands_only_in_admin_start_text() {
        assert!(start_text(true).contains("/delete"));
        assert!(!start_text(false).contains("/delete"));
        assert!(help_text(true, "o/r", "t", 1024).contains("Admin Commands"));
        assert!(help_text(false, "o/r", "t", 1024).contains("<code>o/r</code>"));
    }

    #[test]
    fn list_keyboard_navigation() {
        let assets: Vec<_> = (0..45).map(|i| asset(i, &format!("f{i}.bin"))).collect();

        let (text, kb) = list_view(&assets, 1, 20);
        assert!(text.contains("Page 1/3"));
        let data: Vec<_> = kb.unwrap().buttons().map(|b| b.callback_data.clone()).collect();
        assert_eq!(data, vec!["list_page_2", "close_list"]);

        let (_, kb) = list_view(&assets, 2, 20);
        let data: Vec<_> = kb.unwrap().buttons().map(|b| b.callback_data.clone()).collect();
        assert_eq!(data, vec!["list_page_1", "list_page_3", "close_list"]);

        let (text, kb) = list_view(&assets, 9, 20);
        assert!(text.contains("Page 9 not found"));
        assert!(kb.is_none());

        let (text, _) = list_view(&[], 1, 20);
        assert_eq!(text, NO_FILES);
    }

    #[test]
    fn search_keeps_list_numbers() {
        let assets = vec![asset(1, "Alpha.mp4"), asset(2, "beta.zip"), asset(3, "ALPHA-2.mkv")];
        let out = render_search(&assets, "alpha");
        assert!(out.contains("<b>1.</b> <code>Alpha.mp4</code>"));
        assert!(out.contains("<b>3.</b> <code>ALPHA-2.mkv</code>"));
        assert!(!out.contains("beta.zip"));
        assert!(out.contains("<b>Found:</b> 2 files"));

        assert!(render_search(&assets, "gamma").contains("No files found matching"));
    }

    #[test]
    fn search_caps_results() {
        let assets: Vec<_> = (0..25).map(|i| asset(i, &format!("clip{i}.mp4"))).collect();
        let out = render_search(&assets, "clip");
        assert!(out.contains("... and 5 more results"));
        assert!(out.contains("<b>Found:</b> 25 files"));
    }

    #[test]
    fn status_without_active_upload() {
        assert_eq!(status_text(None, 0), "📊 <b>No active uploads</b>");
        let active = ActiveUpload {
            file_name: "a.zip".to_string(),
            index: 2,
            total: 3,
            remaining: 1,
        };
        let out = status_text(Some(&active), 1);
        assert!(out.contains("<b>Progress:</b> 2/3"));
        assert!(out.contains("<b>Remaining:</b> 1 files"));
    }
}
