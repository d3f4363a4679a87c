//! Telegram adapter (teloxide).
//!
//! Implements the `relay-core` MessagingPort over the Telegram Bot API and
//! the SourceOpener for files attached to chat messages.

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use teloxide::{
    net::Download,
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode},
};
use tokio::time::sleep;

pub mod handlers;
pub mod router;

use relay_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    fetch::HttpFetcher,
    messaging::{
        port::MessagingPort,
        types::InlineKeyboard,
    },
    ports::{OpenedSource, Source, SourceOpener},
    Result,
};

/// `MessagingPort` over the Bot API. All text is sent as HTML with link
/// previews off so download URLs do not expand into cards.
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

fn tg_chat(chat: ChatId) -> teloxide::types::ChatId {
    teloxide::types::ChatId(chat.0)
}

fn tg_message(msg: MessageRef) -> (teloxide::types::ChatId, teloxide::types::MessageId) {
    (tg_chat(msg.chat_id), teloxide::types::MessageId(msg.message_id.0))
}

fn sent(chat_id: ChatId, msg: Message) -> MessageRef {
    MessageRef {
        chat_id,
        message_id: MessageId(msg.id.0),
    }
}

fn markup(keyboard: InlineKeyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.into_iter().map(|row| {
        row.into_iter()
            .map(|b| InlineKeyboardButton::callback(b.label, b.callback_data))
    }))
}

fn map_err(e: teloxide::RequestError) -> Error {
    Error::External(format!("telegram error: {e}"))
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Run a request, sleeping through one flood-control answer.
    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        match op().await {
            Err(teloxide::RequestError::RetryAfter(wait)) => {
                tracing::debug!(?wait, "telegram flood control, retrying once");
                sleep(wait).await;
                op().await.map_err(map_err)
            }
            res => res.map_err(map_err),
        }
    }

    async fn send(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                let req = self
                    .bot
                    .send_message(tg_chat(chat_id), html)
                    .parse_mode(ParseMode::Html)
                    .disable_web_page_preview(true);
                match keyboard.clone() {
                    Some(kb) => req.reply_markup(kb),
                    None => req,
                }
            })
            .await?;
        Ok(sent(chat_id, msg))
    }

    async fn edit(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<()> {
        let (chat, id) = tg_message(msg);
        self.with_retry(|| {
            let req = self
                .bot
                .edit_message_text(chat, id, html)
                .parse_mode(ParseMode::Html)
                .disable_web_page_preview(true);
            match keyboard.clone() {
                Some(kb) => req.reply_markup(kb),
                None => req,
            }
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.send(chat_id, html, None).await
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.edit(msg, html, None).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        let (chat, id) = tg_message(msg);
        self.with_retry(|| self.bot.delete_message(chat, id)).await?;
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.send(chat_id, html, Some(markup(keyboard))).await
    }

    async fn edit_inline_keyboard(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()> {
        self.edit(msg, html, Some(markup(keyboard))).await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let req = self.bot.answer_callback_query(callback_id);
            match text {
                Some(t) => req.text(t),
                None => req,
            }
        })
        .await?;
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        contents: Vec<u8>,
        caption_html: &str,
    ) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                let file = InputFile::memory(contents.clone()).file_name(file_name.to_string());
                self.bot
                    .send_document(tg_chat(chat_id), file)
                    .caption(caption_html)
                    .parse_mode(ParseMode::Html)
            })
            .await?;
        Ok(sent(chat_id, msg))
    }
}

/// Opens chat attachments through the Bot API and links through plain HTTP.
#[derive(Clone)]
pub struct TelegramSource {
    bot: Bot,
    http: HttpFetcher,
}

impl TelegramSource {
    pub fn new(bot: Bot, http: HttpFetcher) -> Self {
        Self { bot, http }
    }
}

#[async_trait]
impl SourceOpener for TelegramSource {
    async fn open(&self, source: &Source) -> Result<OpenedSource> {
        match source {
            Source::Url(url) => self.http.open_url(url).await,
            Source::TelegramFile { file_id, size } => {
                let file = self
                    .bot
                    .get_file(file_id.clone())
                    .await
                    .map_err(|e| Error::Download(format!("Failed to download: {e}")))?;

                let body = self
                    .bot
                    .download_file_stream(&file.path)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
                    .boxed();
                Ok(OpenedSource {
                    total: Some(*size),
                    body,
                })
            }
        }
    }
}

/// Read a small attachment (a batch list) fully into memory.
pub async fn download_to_vec(bot: &Bot, file_id: &str) -> Result<Vec<u8>> {
    let file = bot.get_file(file_id.to_string()).await.map_err(map_err)?;
    let mut stream = bot.download_file_stream(&file.path);
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::Download(format!("Failed to download: {e}")))?;
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}
