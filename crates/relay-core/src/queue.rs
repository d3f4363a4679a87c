//! Per-user FIFO upload queues with a global stop switch.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::sync::Mutex;

use crate::{
    batch::BatchEntry,
    domain::{ChatId, UserId},
};

/// Work item submitted by a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadItem {
    TelegramFile {
        file_id: String,
        file_name: String,
        size: u64,
    },
    Url {
        url: String,
        file_name: String,
    },
    Batch {
        source_name: String,
        entries: Vec<BatchEntry>,
    },
}

impl UploadItem {
    pub fn display_name(&self) -> &str {
        match self {
            UploadItem::TelegramFile { file_name, .. } | UploadItem::Url { file_name, .. } => {
                file_name
            }
            UploadItem::Batch { source_name, .. } => source_name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedUpload {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub item: UploadItem,
}

/// What `/status` shows for a user while their queue drains.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveUpload {
    pub file_name: String,
    pub index: usize,
    pub total: usize,
    pub remaining: usize,
}

impl ActiveUpload {
    pub fn status_line(&self) -> String {
        format!(
            "Processing {}/{} - {} remaining",
            self.index, self.total, self.remaining
        )
    }
}

/// Cancellation flag observed by running transfers.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: bool) {
        self.0.store(value, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct UserQueue {
    items: VecDeque<QueuedUpload>,
    processing: bool,
    /// Items taken since the current drain started.
    taken: usize,
    active: Option<ActiveUpload>,
}

#[derive(Debug, Default)]
pub struct UploadQueue {
    users: Mutex<HashMap<UserId, UserQueue>>,
    stopped: StopFlag,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_flag(&self) -> &StopFlag {
        &self.stopped
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_set()
    }

    /// Append an item; returns its 1-based position among waiting items, or
    /// `None` while stopped.
    pub async fn enqueue(&self, upload: QueuedUpload) -> Option<usize> {
        if self.is_stopped() {
            return None;
        }
        let mut users = self.users.lock().await;
        let q = users.entry(upload.user_id).or_default();
        q.items.push_back(upload);
        Some(q.items.len())
    }

    /// Claim the drain loop for `user`. Only one claim is held at a time; it is
    /// released by the `next` call that returns `None`.
    pub async fn try_begin(&self, user: UserId) -> bool {
        if self.is_stopped() {
            return false;
        }
        let mut users = self.users.lock().await;
        let q = users.entry(user).or_default();
        if q.processing || q.items.is_empty() {
            return false;
        }
        q.processing = true;
        q.taken = 0;
        true
    }

    /// Pop the next item for the claimed drain loop and mark it active.
    /// Returns `None` once the queue is empty or stopped, releasing the claim
    /// under the same lock as the emptiness check.
    pub async fn next(&self, user: UserId) -> Option<(QueuedUpload, ActiveUpload)> {
        let mut users = self.users.lock().await;
        let q = users.get_mut(&user)?;
        let upload = match q.items.pop_front() {
            Some(upload) if !self.is_stopped() => upload,
            other => {
                if let Some(upload) = other {
                    q.items.push_front(upload);
                }
                q.processing = false;
                q.taken = 0;
                q.active = None;
                return None;
            }
        };
        q.taken += 1;
        let remaining = q.items.len();
        let active = ActiveUpload {
            file_name: upload.item.display_name().to_string(),
            index: q.taken,
            total: q.taken + remaining,
            remaining,
        };
        q.active = Some(active.clone());
        Some((upload, active))
    }

    /// Drop `user`'s drain claim without touching waiting items, for a drain
    /// loop that died before `next` could release it.
    pub async fn release(&self, user: UserId) {
        if let Some(q) = self.users.lock().await.get_mut(&user) {
            q.processing = false;
            q.taken = 0;
            q.active = None;
        }
    }

    pub async fn active(&self, user: UserId) -> Option<ActiveUpload> {
        self.users.lock().await.get(&user)?.active.clone()
    }

    pub async fn pending(&self, user: UserId) -> Vec<String> {
        self.users
            .lock()
            .await
            .get(&user)
            .map(|q| {
                q.items
                    .iter()
                    .map(|u| u.item.display_name().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn pending_len(&self, user: UserId) -> usize {
        self.users
            .lock()
            .await
            .get(&user)
            .map(|q| q.items.len())
            .unwrap_or(0)
    }

    /// Stop everything: set the flag running transfers observe and drop all
    /// waiting items. Returns how many items were dropped.
    pub async fn stop_all(&self) -> usize {
        self.stopped.set(true);
        let mut users = self.users.lock().await;
        let mut dropped = 0;
        for q in users.values_mut() {
            dropped += q.items.len();
            q.items.clear();
            q.active = None;
        }
        dropped
    }

    pub fn restart(&self) {
        self.stopped.set(false);
    }
}

pub fn render_queue(pending: &[String], active: Option<&ActiveUpload>) -> String {
    const PREVIEW: usize = 5;

    if pending.is_empty() && active.is_none() {
        return "📋 <b>Your queue is empty.</b>".to_string();
    }

    let mut out = String::from("📋 <b>Your Upload Queue</b>\n\n");
    if let Some(a) = active {
        out.push_str(&format!(
            "⏳ <b>Current:</b> <code>{}</code> ({})\n\n",
            crate::formatting::escape_html(&a.file_name),
            a.status_line()
        ));
    }
    if !pending.is_empty() {
        out.push_str(&format!("<b>Waiting:</b> {} files\n", pending.len()));
        for (i, name) in pending.iter().take(PREVIEW).enumerate() {
            out.push_str(&format!(
                "{}. <code>{}</code>\n",
                i + 1,
                crate::formatting::escape_html(name)
            ));
        }
        if pending.len() > PREVIEW {
            out.push_str(&format!("... and {} more\n", pending.len() - PREVIEW));
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url_item(user: i64, name: &str) -> QueuedUpload {
        QueuedUpload {
            chat_id: ChatId(user),
            user_id: UserId(user),
            item: UploadItem::Url {
                url: format!("https://x.io/{name}"),
                file_name: name.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn fifo_order_and_positions() {
        let q = UploadQueue::new();
        assert_eq!(q.enqueue(url_item(1, "a")).await, Some(1));
        assert_eq!(q.enqueue(url_item(1, "b")).await, Some(2));
        assert_eq!(q.enqueue(url_item(2, "other")).await, Some(1));

        assert!(q.try_begin(UserId(1)).await);
        let (first, active) = q.next(UserId(1)).await.unwrap();
        assert_eq!(first.item.display_name(), "a");
        assert_eq!((active.index, active.total, active.remaining), (1, 2, 1));

        let (second, active) = q.next(UserId(1)).await.unwrap();
        assert_eq!(second.item.display_name(), "b");
        assert_eq!((active.index, active.total, active.remaining), (2, 2, 0));
        assert!(q.next(UserId(1)).await.is_none());
    }

    #[tokio::test]
    async fn only_one_drain_per_user() {
        let q = UploadQueue::new();
        q.enqueue(url_item(1, "a")).await;
        assert!(q.try_begin(UserId(1)).await);
        q.enqueue(url_item(1, "b")).await;
        assert!(!q.try_begin(UserId(1)).await);

        q.next(UserId(1)).await.unwrap();
        assert!(q.active(UserId(1)).await.is_some());
        q.next(UserId(1)).await.unwrap();
        assert!(q.next(UserId(1)).await.is_none());
        assert_eq!(q.active(UserId(1)).await, None);

        q.enqueue(url_item(1, "c")).await;
        assert!(q.try_begin(UserId(1)).await);
    }

    #[tokio::test]
    async fn released_claim_can_be_taken_again() {
        let q = UploadQueue::new();
        q.enqueue(url_item(1, "a")).await;
        q.enqueue(url_item(1, "b")).await;
        assert!(q.try_begin(UserId(1)).await);
        q.next(UserId(1)).await.unwrap();

        q.release(UserId(1)).await;
        assert_eq!(q.active(UserId(1)).await, None);
        assert_eq!(q.pending(UserId(1)).await, vec!["b"]);
        assert!(q.try_begin(UserId(1)).await);
    }

    #[tokio::test]
    async fn nothing_to_drain_is_not_claimed() {
        let q = UploadQueue::new();
        assert!(!q.try_begin(UserId(9)).await);
    }

    #[tokio::test]
    async fn stop_all_empties_and_blocks_until_restart() {
        let q = UploadQueue::new();
        q.enqueue(url_item(1, "a")).await;
        q.enqueue(url_item(1, "b")).await;
        q.enqueue(url_item(2, "c")).await;
        assert!(q.try_begin(UserId(1)).await);
        q.next(UserId(1)).await.unwrap();

        let flag = q.stop_flag();
        assert_eq!(q.stop_all().await, 2);
        assert!(flag.is_set());
        assert!(q.pending(UserId(1)).await.is_empty());
        assert!(q.pending(UserId(2)).await.is_empty());
        assert_eq!(q.active(UserId(1)).await, None);
        assert_eq!(q.enqueue(url_item(1, "d")).await, None);

        q.restart();
        assert!(!flag.is_set());
        assert_eq!(q.enqueue(url_item(1, "d")).await, Some(1));
    }

    #[test]
    fn queue_listing_truncates() {
        let pending: Vec<String> = (1..=8).map(|i| format!("f{i}")).collect();
        let text = render_queue(&pending, None);
        assert!(text.contains("<b>Waiting:</b> 8 files"));
        assert!(text.contains("5. <code>f5</code>"));
        assert!(!text.contains("f6"));
        assert!(text.contains("... and 3 more"));
        assert_eq!(render_queue(&[], None), "📋 <b>Your queue is empty.</b>");
    }
}
