use teloxide::prelude::*;

use relay_core::{
    batch::{parse_batch, render_batch_accepted, BATCH_HELP},
    domain::{ChatId, UserId},
    formatting::{escape_html, format_bytes, render_file_queued},
    queue::{QueuedUpload, UploadItem},
    utils::sanitize_filename,
};

use crate::{download_to_vec, router::AppState};

use super::STOPPED_NOTICE;

/// Batch lists are plain text; anything larger is not a link list.
const MAX_BATCH_FILE: u64 = 1024 * 1024;

fn is_batch_file(name: &str) -> bool {
    name.to_lowercase().ends_with(".txt")
}

fn too_large(limit: u64) -> String {
    format!(
        "❌ File too large. Maximum size is {}.",
        format_bytes(limit)
    )
}

pub async fn handle_document(
    bot: &Bot,
    msg: &Message,
    user: UserId,
    state: &AppState,
) -> ResponseResult<()> {
    let Some(doc) = msg.document() else {
        return Ok(());
    };
    let chat = ChatId(msg.chat.id.0);
    let file_name = doc
        .file_name
        .clone()
        .unwrap_or_else(|| "unknown_file".to_string());
    let size = u64::from(doc.file.size);
    tracing::info!(user_id = user.0, file = %file_name, size, "received document");

    if size > state.cfg.max_file_size {
        let _ = state
            .messenger
            .send_html(chat, &too_large(state.cfg.max_file_size))
            .await;
        return Ok(());
    }

    if is_batch_file(&file_name) && size <= MAX_BATCH_FILE {
        return handle_batch_file(bot, chat, user, &doc.file.id, file_name, state).await;
    }

    let sanitized = sanitize_filename(&file_name);
    if sanitized != file_name {
        tracing::info!(from = %file_name, to = %sanitized, "sanitized file name");
    }

    let upload = QueuedUpload {
        chat_id: chat,
        user_id: user,
        item: UploadItem::TelegramFile {
            file_id: doc.file.id.clone(),
            file_name: sanitized.clone(),
            size,
        },
    };
    let reply = match state.service.submit(upload).await {
        Some(position) => render_file_queued(&sanitized, size, position),
        None => STOPPED_NOTICE.to_string(),
    };
    let _ = state.messenger.send_html(chat, &reply).await;
    Ok(())
}

async fn handle_batch_file(
    bot: &Bot,
    chat: ChatId,
    user: UserId,
    file_id: &str,
    file_name: String,
    state: &AppState,
) -> ResponseResult<()> {
    let content = match download_to_vec(bot, file_id).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!(file = %file_name, error = %e, "could not read batch file");
            let _ = state
                .messenger
                .send_html(
                    chat,
                    &format!(
                        "❌ <b>Error processing TXT file</b>\n\n{}",
                        escape_html(&e.to_string())
                    ),
                )
                .await;
            return Ok(());
        }
    };

    let entries = parse_batch(&content);
    if entries.is_empty() {
        let _ = state.messenger.send_html(chat, BATCH_HELP).await;
        return Ok(());
    }
    tracing::info!(user_id = user.0, file = %file_name, entries = entries.len(), "batch file parsed");

    let accepted = entries.clone();
    let upload = QueuedUpload {
        chat_id: chat,
        user_id: user,
        item: UploadItem::Batch {
            source_name: file_name.clone(),
            entries,
        },
    };
    let reply = match state.service.submit(upload).await {
        Some(position) => render_batch_accepted(&file_name, &accepted, position),
        None => STOPPED_NOTICE.to_string(),
    };
    let _ = state.messenger.send_html(chat, &reply).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_files_by_extension() {
        assert!(is_batch_file("links.txt"));
        assert!(is_batch_file("LINKS.TXT"));
        assert!(!is_batch_file("movie.mp4"));
        assert!(!is_batch_file("txt"));
    }

    #[test]
    fn oversize_notice_names_the_limit() {
        assert_eq!(
            too_large(4 * 1024 * 1024 * 1024),
            "❌ File too large. Maximum size is 4.0 GB."
        );
    }
}
