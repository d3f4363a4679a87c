use teloxide::prelude::*;

use relay_core::{
    domain::{ChatId, UserId},
    formatting::render_url_queued,
    queue::{QueuedUpload, UploadItem},
    utils::{filename_from_url, is_url, sanitize_filename, unix_timestamp, FileKind},
};

use crate::router::AppState;

use super::{INVALID_INPUT, STOPPED_NOTICE};

/// Asset name for a link sent as plain text.
fn url_asset_name(url: &str, now: u64) -> String {
    let name = filename_from_url(url, &format!("download_{now}"));
    let sanitized = sanitize_filename(&name);
    if sanitized != name {
        tracing::info!(from = %name, to = %sanitized, "sanitized file name");
    }
    sanitized
}

pub async fn handle_text(
    chat: ChatId,
    user: UserId,
    text: &str,
    state: &AppState,
) -> ResponseResult<()> {
    if !is_url(text) {
        if !text.is_empty() {
            let _ = state.messenger.send_html(chat, INVALID_INPUT).await;
        }
        return Ok(());
    }

    let url = text.to_string();
    let file_name = url_asset_name(&url, unix_timestamp());
    let kind = FileKind::from_url(&url);
    tracing::info!(user_id = user.0, %url, %kind, "queuing url");

    let upload = QueuedUpload {
        chat_id: chat,
        user_id: user,
        item: UploadItem::Url {
            url: url.clone(),
            file_name: file_name.clone(),
        },
    };

    let reply = match state.service.submit(upload).await {
        Some(position) => render_url_queued(&url, &file_name, kind, position),
        None => STOPPED_NOTICE.to_string(),
    };
    let _ = state.messenger.send_html(chat, &reply).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_links_after_their_last_segment() {
        assert_eq!(url_asset_name("https://x.io/a/movie.mp4?sig=1", 7), "movie.mp4");
        assert_eq!(url_asset_name("https://x.io/", 7), "download_7.bin");
        assert_eq!(url_asset_name("https://x.io/files/report", 7), "report.bin");
    }
}
