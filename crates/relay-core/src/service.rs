//! Upload service: owns the queues and drains each user's items in order.

use std::sync::Arc;

use chrono::Local;

use crate::{
    batch::{
        render_batch_started, render_batch_summary, render_batch_undelivered, render_results,
        results_file_name, BatchEntry, BatchOutcome,
    },
    domain::{ChatId, MessageRef, UserId},
    formatting::{
        escape_html, format_bytes, render_complete, render_failed, render_starting, truncate,
        Phase, Position,
    },
    messaging::port::MessagingPort,
    ports::{ReleaseStore, Source, SourceOpener},
    queue::{QueuedUpload, UploadItem, UploadQueue},
    transfer::{Transfer, TransferOutcome, TransferRequest, TransferSettings},
    utils::{sanitize_filename, unix_timestamp},
    Result,
};

pub struct UploadService {
    messenger: Arc<dyn MessagingPort>,
    store: Arc<dyn ReleaseStore>,
    opener: Arc<dyn SourceOpener>,
    queue: UploadQueue,
    settings: TransferSettings,
}

impl UploadService {
    pub fn new(
        messenger: Arc<dyn MessagingPort>,
        store: Arc<dyn ReleaseStore>,
        opener: Arc<dyn SourceOpener>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            messenger,
            store,
            opener,
            queue: UploadQueue::new(),
            settings,
        }
    }

    pub fn queue(&self) -> &UploadQueue {
        &self.queue
    }

    pub fn store(&self) -> &dyn ReleaseStore {
        self.store.as_ref()
    }

    /// Queue an item and make sure a drain loop runs for its user.
    ///
    /// Returns the queue position, or `None` while uploads are stopped.
    pub async fn submit(self: &Arc<Self>, upload: QueuedUpload) -> Option<usize> {
        let user = upload.user_id;
        let position = self.queue.enqueue(upload).await?;

        if self.queue.try_begin(user).await {
            self.spawn_drain(user);
        }
        Some(position)
    }

    /// Spawn the drain loop for a claimed queue. If the loop dies the claim is
    /// released and a fresh loop picks up whatever is still waiting.
    fn spawn_drain(self: &Arc<Self>, user: UserId) {
        let this = Arc::clone(self);
        let drain = tokio::spawn({
            let this = Arc::clone(&this);
            async move { this.drain(user).await }
        });
        tokio::spawn(async move {
            let Err(e) = drain.await else {
                return;
            };
            tracing::error!(user_id = user.0, error = %e, "queue drain aborted");
            this.queue.release(user).await;
            if this.queue.try_begin(user).await {
                this.spawn_drain(user);
            }
        });
    }

    /// Process `user`'s queue until it is empty or stopped.
    pub async fn drain(&self, user: UserId) {
        tracing::debug!(user_id = user.0, "queue drain started");
        while let Some((upload, active)) = self.queue.next(user).await {
            let position = Position {
                index: active.index,
                total: active.total,
            };
            tracing::info!(
                user_id = user.0,
                item = %upload.item.display_name(),
                position = %position,
                "processing upload"
            );

            if let Err(e) = self.process(upload, position).await {
                tracing::error!(user_id = user.0, error = %e, "could not report upload status");
            }
        }
        tracing::debug!(user_id = user.0, "queue drain finished");
    }

    async fn process(&self, upload: QueuedUpload, position: Position) -> Result<()> {
        let chat = upload.chat_id;
        match upload.item {
            UploadItem::TelegramFile {
                file_id,
                file_name,
                size,
            } => {
                let detail = format!("📊 <b>Size:</b> {}\n", format_bytes(size));
                let status = self
                    .messenger
                    .send_html(
                        chat,
                        &render_starting(Phase::DownloadTelegram, position, &file_name, &detail),
                    )
                    .await?;
                let source = Source::TelegramFile { file_id, size };
                self.relay_single(upload.user_id, source, file_name, status, position)
                    .await
            }
            UploadItem::Url { url, file_name } => {
                let detail = format!(
                    "🔗 <b>URL:</b> <code>{}</code>\n",
                    escape_html(&truncate(&url, 50))
                );
                let status = self
                    .messenger
                    .send_html(
                        chat,
                        &render_starting(Phase::DownloadUrl, position, &file_name, &detail),
                    )
                    .await?;
                self.relay_single(upload.user_id, Source::Url(url), file_name, status, position)
                    .await
            }
            UploadItem::Batch {
                source_name,
                entries,
            } => self.relay_batch(chat, &source_name, &entries).await,
        }
    }

    fn transfer(&self) -> Transfer<'_> {
        Transfer {
            messenger: self.messenger.as_ref(),
            store: self.store.as_ref(),
            opener: self.opener.as_ref(),
            settings: &self.settings,
            stop: self.queue.stop_flag(),
        }
    }

    async fn relay_single(
        &self,
        user: UserId,
        source: Source,
        file_name: String,
        status: MessageRef,
        position: Position,
    ) -> Result<()> {
        let req = TransferRequest {
            source,
            asset_name: file_name,
            status,
            position,
        };

        let text = match self.transfer().run(&req).await {
            Ok(TransferOutcome { asset, bytes }) => {
                let queued = self.queue.pending_len(user).await;
                render_complete(position, &asset.name, bytes, &asset.browser_download_url, queued)
            }
            Err(e) => {
                if e.is_cancelled() {
                    tracing::info!(user_id = user.0, asset = %req.asset_name, "upload stopped");
                } else {
                    tracing::warn!(user_id = user.0, asset = %req.asset_name, error = %e, "upload failed");
                }
                render_failed(position, &e.to_string())
            }
        };
        self.messenger.edit_html(status, &text).await
    }

    async fn relay_batch(&self, chat: ChatId, source_name: &str, entries: &[BatchEntry]) -> Result<()> {
        let total = entries.len();
        let status = self
            .messenger
            .send_html(chat, &render_batch_started(source_name, total))
            .await?;

        let mut outcomes = Vec::with_capacity(total);
        for (i, entry) in entries.iter().enumerate() {
            if self.queue.is_stopped() {
                break;
            }

            let asset_name = sanitize_filename(&entry.file_name);
            let req = TransferRequest {
                source: Source::Url(entry.url.clone()),
                asset_name,
                status,
                position: Position {
                    index: i + 1,
                    total,
                },
            };

            outcomes.push(match self.transfer().run(&req).await {
                Ok(out) => BatchOutcome::success(out.asset.name, out.asset.browser_download_url),
                Err(e) => {
                    tracing::warn!(
                        entry = %entry.file_name,
                        line = entry.line_number,
                        error = %e,
                        "batch entry failed"
                    );
                    BatchOutcome::failure(&entry.file_name, e.to_string())
                }
            });
        }

        let results = render_results(&outcomes, source_name, Local::now());
        let results_name = results_file_name(source_name, unix_timestamp());
        let caption = render_batch_summary(source_name, total, &outcomes);

        match self
            .messenger
            .send_document(chat, &results_name, results.into_bytes(), &caption)
            .await
        {
            Ok(_) => {
                if let Err(e) = self.messenger.delete_message(status).await {
                    tracing::debug!(error = %e, "could not delete batch status message");
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "could not send batch results");
                let text = render_batch_undelivered(
                    source_name,
                    total,
                    outcomes.len(),
                    &truncate(&e.to_string(), 200),
                );
                self.messenger.edit_html(status, &text).await
            }
        }
    }
}
