use teloxide::prelude::*;

use relay_core::domain::{ChatId, MessageId, MessageRef, UserId};

use crate::router::AppState;

use super::commands::{list_view, CLOSE_LIST, LIST_PAGE_PREFIX};

#[derive(Debug, PartialEq, Eq)]
enum ListAction {
    Page(usize),
    Close,
}

fn parse_callback(data: &str) -> Option<ListAction> {
    if data == CLOSE_LIST {
        return Some(ListAction::Close);
    }
    data.strip_prefix(LIST_PAGE_PREFIX)?
        .parse::<usize>()
        .ok()
        .filter(|p| *p >= 1)
        .map(ListAction::Page)
}

pub async fn handle_callback(q: CallbackQuery, state: &AppState) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let user = UserId(q.from.id.0 as i64);
    let data = q.data.clone().unwrap_or_default();

    let Some(message) = q.message.as_ref() else {
        let _ = state.messenger.answer_callback_query(&cb_id, None).await;
        return Ok(());
    };
    let target = MessageRef {
        chat_id: ChatId(message.chat.id.0),
        message_id: MessageId(message.id.0),
    };

    if !state.cfg.is_admin(user) {
        let _ = state
            .messenger
            .answer_callback_query(&cb_id, Some("❌ Access Denied"))
            .await;
        return Ok(());
    }

    let Some(action) = parse_callback(&data) else {
        tracing::debug!(user_id = user.0, %data, "unknown callback data");
        let _ = state.messenger.answer_callback_query(&cb_id, None).await;
        return Ok(());
    };

    match action {
        ListAction::Close => {
            let _ = state.messenger.answer_callback_query(&cb_id, None).await;
            if let Err(e) = state.messenger.delete_message(target).await {
                tracing::debug!(error = %e, "could not delete list message");
            }
        }
        ListAction::Page(page) => {
            let assets = match state.store().list_assets().await {
                Ok(assets) => assets,
                Err(e) => {
                    tracing::warn!(error = %e, "listing assets failed");
                    let _ = state
                        .messenger
                        .answer_callback_query(&cb_id, Some("❌ Error loading page"))
                        .await;
                    return Ok(());
                }
            };

            let _ = state.messenger.answer_callback_query(&cb_id, None).await;
            let (text, keyboard) = list_view(&assets, page, state.cfg.list_page_size);
            let edited = match keyboard {
                Some(kb) => state.messenger.edit_inline_keyboard(target, &text, kb).await,
                None => state.messenger.edit_html(target, &text).await,
            };
            if let Err(e) = edited {
                tracing::debug!(error = %e, page, "could not edit list message");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_callbacks() {
        assert_eq!(parse_callback("list_page_3"), Some(ListAction::Page(3)));
        assert_eq!(parse_callback("close_list"), Some(ListAction::Close));
        assert_eq!(parse_callback("list_page_0"), None);
        assert_eq!(parse_callback("list_page_x"), None);
        assert_eq!(parse_callback("askuser:1:2"), None);
    }
}
