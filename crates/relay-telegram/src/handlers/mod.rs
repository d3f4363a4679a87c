//! Telegram update handlers.
//!
//! Each handler is a thin adapter: it reads the update, checks admin rights
//! where needed, and calls into the `relay-core` upload service or the
//! release store. Replies go through the shared `MessagingPort`.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use relay_core::domain::{ChatId, UserId};

use crate::router::AppState;

mod callback;
mod commands;
mod document;
mod text;

const STOPPED_NOTICE: &str = "🛑 <b>Bot is currently stopped</b>\n\nPlease wait for an administrator to restart the bot using /restart command.";

const INVALID_INPUT: &str = "❓ <b>Invalid Input</b>\n\n\
Please send:\n\
• A file (drag &amp; drop or attach)\n\
• A direct download URL\n\
• A TXT file with filename:url pairs for batch upload\n\n\
Use /help for more information.";

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    callback::handle_callback(q, &state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat = ChatId(msg.chat.id.0);
    let Some(user) = msg.from().map(|u| UserId(u.id.0 as i64)) else {
        return Ok(());
    };

    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(chat, user, text, &state).await;
        }
    }

    if state.service.queue().is_stopped() {
        let _ = state.messenger.send_html(chat, STOPPED_NOTICE).await;
        return Ok(());
    }

    if msg.document().is_some() {
        return document::handle_document(&bot, &msg, user, &state).await;
    }

    if let Some(text) = msg.text() {
        return text::handle_text(chat, user, text.trim(), &state).await;
    }

    Ok(())
}
