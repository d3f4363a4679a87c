use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{port::MessagingPort, types::InlineKeyboard},
    Result,
};

const MAX_TRACKED_EDITS: usize = 1024;

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Spacing between any two outbound calls.
    pub global_min_interval: Duration,
    /// Spacing between calls into the same chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40),
            per_chat_min_interval: Duration::from_millis(1050),
        }
    }
}

/// Hands out send slots spaced `interval` apart per key.
#[derive(Debug)]
struct Slots {
    interval: Duration,
    next: HashMap<Option<i64>, Instant>,
}

impl Slots {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: HashMap::new(),
        }
    }

    /// Book the earliest free slot for `key` at or after `now`.
    fn book(&mut self, key: Option<i64>, now: Instant) -> Instant {
        let slot = self.next.get(&key).map_or(now, |n| (*n).max(now));
        self.next.insert(key, slot + self.interval);
        slot
    }
}

#[derive(Debug)]
struct Pacing {
    global: Slots,
    per_chat: Slots,
    /// Last text written to each status message; repeats are skipped.
    last_edit: HashMap<(i64, i32), String>,
}

/// MessagingPort decorator that paces outbound calls.
///
/// Progress reporting edits the same status message for the whole length of
/// a transfer. Calls are spaced per chat and globally to stay under the Bot
/// API flood limits, and an edit that would not change the message text is
/// dropped before it reaches the API.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    pacing: Mutex<Pacing>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            pacing: Mutex::new(Pacing {
                global: Slots::new(cfg.global_min_interval),
                per_chat: Slots::new(cfg.per_chat_min_interval),
                last_edit: HashMap::new(),
            }),
        }
    }

    /// Wait for a slot; `None` paces against the global limit only.
    async fn pace(&self, chat: Option<ChatId>) {
        let at = {
            let mut p = self.pacing.lock().await;
            let now = Instant::now();
            let global = p.global.book(None, now);
            match chat {
                Some(c) => global.max(p.per_chat.book(Some(c.0), now)),
                None => global,
            }
        };
        sleep_until(at).await;
    }

    /// Record `html` as the text of `msg`; false when it is already shown.
    async fn note_edit(&self, msg: MessageRef, html: &str) -> bool {
        let mut p = self.pacing.lock().await;
        let key = (msg.chat_id.0, msg.message_id.0);
        if p.last_edit.get(&key).is_some_and(|t| t == html) {
            return false;
        }
        if p.last_edit.len() >= MAX_TRACKED_EDITS {
            p.last_edit.clear();
        }
        p.last_edit.insert(key, html.to_string());
        true
    }

    async fn forget(&self, msg: MessageRef) {
        self.pacing
            .lock()
            .await
            .last_edit
            .remove(&(msg.chat_id.0, msg.message_id.0));
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.pace(Some(chat_id)).await;
        self.inner.send_html(chat_id, html).await
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        if !self.note_edit(msg, html).await {
            return Ok(());
        }
        self.pace(Some(msg.chat_id)).await;
        let res = self.inner.edit_html(msg, html).await;
        if res.is_err() {
            self.forget(msg).await;
        }
        res
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.forget(msg).await;
        self.pace(Some(msg.chat_id)).await;
        self.inner.delete_message(msg).await
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.pace(Some(chat_id)).await;
        self.inner.send_inline_keyboard(chat_id, html, keyboard).await
    }

    async fn edit_inline_keyboard(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()> {
        self.forget(msg).await;
        self.pace(Some(msg.chat_id)).await;
        self.inner.edit_inline_keyboard(msg, html, keyboard).await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.pace(None).await;
        self.inner.answer_callback_query(callback_id, text).await
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        contents: Vec<u8>,
        caption_html: &str,
    ) -> Result<MessageRef> {
        self.pace(Some(chat_id)).await;
        self.inner
            .send_document(chat_id, file_name, contents, caption_html)
            .await
    }
}
