//! Relay of one item: source → temp file → release asset, with progress edits.
//!
//! Each phase runs as a future joined with a ticking reporter. The stream
//! moving the bytes bumps a shared `ProgressCounter`; on every tick the
//! reporter samples it and edits the status message when the tracker says a
//! report is due.

use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use futures_util::StreamExt;
use tokio::{
    fs::File,
    io::{AsyncWriteExt, BufWriter},
    sync::watch,
    time::MissedTickBehavior,
};
use tokio_util::io::ReaderStream;

use crate::{
    config::Config,
    domain::{MessageRef, ReleaseAsset},
    formatting::{render_progress, Phase, Position},
    messaging::port::MessagingPort,
    ports::{ByteStream, ReleaseStore, Source, SourceOpener, UploadBody},
    progress::{ProgressCounter, ProgressSettings, ProgressTracker},
    queue::StopFlag,
    utils::unix_timestamp,
    Error, Result,
};

const UPLOAD_CHUNK: usize = 64 * 1024;

#[derive(Clone, Debug)]
pub struct TransferSettings {
    pub temp_dir: PathBuf,
    pub max_file_size: u64,
    pub progress: ProgressSettings,
    pub tick: Duration,
}

impl TransferSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            temp_dir: cfg.temp_dir.clone(),
            max_file_size: cfg.max_file_size,
            progress: ProgressSettings::from_config(cfg),
            tick: cfg.progress_tick,
        }
    }
}

/// One item to relay.
#[derive(Clone, Debug)]
pub struct TransferRequest {
    pub source: Source,
    pub asset_name: String,
    pub status: MessageRef,
    pub position: Position,
}

#[derive(Clone, Debug)]
pub struct TransferOutcome {
    pub asset: ReleaseAsset,
    pub bytes: u64,
}

/// Borrowed collaborators for running transfers.
pub struct Transfer<'a> {
    pub messenger: &'a dyn MessagingPort,
    pub store: &'a dyn ReleaseStore,
    pub opener: &'a dyn SourceOpener,
    pub settings: &'a TransferSettings,
    pub stop: &'a StopFlag,
}

impl Transfer<'_> {
    pub async fn run(&self, req: &TransferRequest) -> Result<TransferOutcome> {
        if self.stop.is_set() {
            return Err(Error::Cancelled);
        }

        let temp = TempFile::new(&self.settings.temp_dir);
        let outcome = self.relay(req, temp.path()).await?;

        tracing::info!(
            asset = %outcome.asset.name,
            bytes = outcome.bytes,
            "asset uploaded"
        );
        Ok(outcome)
    }

    async fn relay(&self, req: &TransferRequest, temp: &Path) -> Result<TransferOutcome> {
        let opened = self.opener.open(&req.source).await?;
        let total = match &req.source {
            Source::TelegramFile { size, .. } => Some(*size),
            Source::Url(_) => opened.total,
        };

        let limit = self.settings.max_file_size;
        if let Some(size) = total.filter(|s| *s > limit) {
            return Err(Error::TooLarge { size, limit });
        }

        let phase = match &req.source {
            Source::TelegramFile { .. } => Phase::DownloadTelegram,
            Source::Url(_) => Phase::DownloadUrl,
        };
        let counter = ProgressCounter::new();
        let downloaded = self
            .drive(
                phase,
                total,
                &counter,
                req,
                write_to_file(opened.body, temp, &counter, limit, self.stop),
            )
            .await?;

        if let Some(expected) = total {
            if downloaded != expected {
                return Err(Error::SizeMismatch {
                    expected,
                    actual: downloaded,
                });
            }
        }
        tracing::debug!(asset = %req.asset_name, bytes = downloaded, "source staged");

        let counter = ProgressCounter::new();
        let body = file_body(temp, counter.clone(), self.stop.clone()).await?;
        let (store, stop, name) = (self.store, self.stop, req.asset_name.as_str());
        let upload = async move {
            store
                .upload_asset(name, downloaded, body)
                .await
                .map_err(|e| if stop.is_set() { Error::Cancelled } else { e })
        };
        let asset = self
            .drive(Phase::Upload, Some(downloaded), &counter, req, upload)
            .await?;

        let uploaded = counter.get();
        for actual in [uploaded, asset.size] {
            if actual != downloaded {
                return Err(Error::SizeMismatch {
                    expected: downloaded,
                    actual,
                });
            }
        }

        Ok(TransferOutcome {
            asset,
            bytes: downloaded,
        })
    }

    /// Run `work` to completion, reporting progress from `counter` meanwhile.
    ///
    /// The reporter runs alongside `work`; a slow status edit never pauses it.
    async fn drive<T>(
        &self,
        phase: Phase,
        total: Option<u64>,
        counter: &ProgressCounter,
        req: &TransferRequest,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let mut tracker = ProgressTracker::new(total, self.settings.progress, Instant::now());
        let (done_tx, mut done_rx) = watch::channel(false);

        let work = async move {
            let res = work.await;
            let _ = done_tx.send(true);
            res
        };
        let reporter = async {
            let mut ticker = tokio::time::interval(self.settings.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = done_rx.changed() => break,
                    _ = ticker.tick() => {
                        self.sample(phase, req, counter, &mut tracker).await;
                    }
                }
            }
        };

        let (res, ()) = tokio::join!(work, reporter);
        if res.is_ok() {
            self.sample(phase, req, counter, &mut tracker).await;
        }
        res
    }

    async fn sample(
        &self,
        phase: Phase,
        req: &TransferRequest,
        counter: &ProgressCounter,
        tracker: &mut ProgressTracker,
    ) {
        tracker.record(counter.get());
        let now = Instant::now();
        if !tracker.should_report(now) {
            return;
        }

        let text = render_progress(phase, req.position, &req.asset_name, &tracker.snapshot(now));
        if let Err(e) = self.messenger.edit_html(req.status, &text).await {
            tracing::debug!(error = %e, "progress edit failed");
        }
        tracker.mark_reported(now);
    }
}

async fn write_to_file(
    mut body: ByteStream,
    path: &Path,
    counter: &ProgressCounter,
    limit: u64,
    stop: &StopFlag,
) -> Result<u64> {
    let mut out = BufWriter::new(File::create(path).await?);

    while let Some(chunk) = body.next().await {
        if stop.is_set() {
            return Err(Error::Cancelled);
        }
        let chunk = chunk?;
        let written = counter.add(chunk.len() as u64);
        if written > limit {
            return Err(Error::TooLarge {
                size: written,
                limit,
            });
        }
        out.write_all(&chunk).await?;
    }

    out.flush().await?;
    Ok(counter.get())
}

/// The staged file as a counted upload body that aborts once `stop` is set.
async fn file_body(path: &Path, counter: ProgressCounter, stop: StopFlag) -> Result<UploadBody> {
    let file = File::open(path).await?;
    let stream = ReaderStream::with_capacity(file, UPLOAD_CHUNK).map(move |chunk| {
        if stop.is_set() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                "upload stopped",
            ));
        }
        if let Ok(bytes) = &chunk {
            counter.add(bytes.len() as u64);
        }
        chunk
    });
    Ok(Box::pin(stream))
}

/// Staging file removed when dropped, whichever way the transfer ends.
struct TempFile {
    path: PathBuf,
}

impl TempFile {
    fn new(dir: &Path) -> Self {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let n = SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            path: dir.join(format!(
                "relay_{}_{}_{n}.part",
                std::process::id(),
                unix_timestamp()
            )),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "temp file not removed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{
        domain::{ChatId, MessageId},
        testing::{FakeMessenger, FakeOpener, FakeStore},
    };

    const URL: &str = "https://cdn.example.com/movie.mp4";

    fn settings(dir: &Path) -> TransferSettings {
        TransferSettings {
            temp_dir: dir.to_path_buf(),
            max_file_size: 1 << 20,
            progress: ProgressSettings::default(),
            tick: Duration::from_millis(10),
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("relay-transfer-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn is_empty_dir(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    fn request(source: Source) -> TransferRequest {
        TransferRequest {
            source,
            asset_name: "movie.mp4".to_string(),
            status: MessageRef {
                chat_id: ChatId(1),
                message_id: MessageId(99),
            },
            position: Position::single(),
        }
    }

    fn body(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn relays_url_bytes_exactly() {
        let dir = temp_dir("ok");
        let messenger = FakeMessenger::new();
        let store = FakeStore::default();
        let opener = FakeOpener::with(URL, body(10_000));
        let settings = settings(&dir);
        let stop = StopFlag::new();
        let transfer = Transfer {
            messenger: &messenger,
            store: &store,
            opener: &opener,
            settings: &settings,
            stop: &stop,
        };

        let out = transfer.run(&request(Source::Url(URL.to_string()))).await.unwrap();
        assert_eq!(out.bytes, 10_000);
        assert_eq!(out.asset.name, "movie.mp4");
        assert_eq!(store.bodies.lock().unwrap()["movie.mp4"], body(10_000));

        let edits = messenger.edit_texts();
        assert!(edits.iter().any(|t| t.contains("Downloading from URL")));
        assert!(edits.iter().any(|t| t.contains("Uploading to GitHub")));
        assert!(is_empty_dir(&dir));
    }

    #[tokio::test]
    async fn telegram_source_uses_announced_size() {
        let dir = temp_dir("tg");
        let messenger = FakeMessenger::new();
        let store = FakeStore::default();
        let opener = FakeOpener::with("file-1", body(3_000));
        let settings = settings(&dir);
        let stop = StopFlag::new();
        let transfer = Transfer {
            messenger: &messenger,
            store: &store,
            opener: &opener,
            settings: &settings,
            stop: &stop,
        };

        let source = Source::TelegramFile {
            file_id: "file-1".to_string(),
            size: 3_500,
        };
        let err = transfer.run(&request(source)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::SizeMismatch {
                expected: 3_500,
                actual: 3_000
            }
        ));
        assert!(store.names().is_empty());
        assert!(is_empty_dir(&dir));
    }

    #[tokio::test]
    async fn rejects_oversized_sources() {
        let dir = temp_dir("big");
        let messenger = FakeMessenger::new();
        let store = FakeStore::default();
        let settings = settings(&dir);
        let stop = StopFlag::new();

        // Announced too large.
        let mut opener = FakeOpener::with(URL, body(10));
        opener.announced = HashMap::from([(URL.to_string(), Some(2 << 20))]);
        let transfer = Transfer {
            messenger: &messenger,
            store: &store,
            opener: &opener,
            settings: &settings,
            stop: &stop,
        };
        let err = transfer.run(&request(Source::Url(URL.to_string()))).await.unwrap_err();
        assert!(matches!(err, Error::TooLarge { .. }));

        // Unannounced, but the body runs past the limit.
        let mut opener = FakeOpener::with(URL, body((1 << 20) + 1));
        opener.chunk_size = 64 * 1024;
        opener.announced = HashMap::from([(URL.to_string(), None)]);
        let transfer = Transfer {
            opener: &opener,
            ..transfer
        };
        let err = transfer.run(&request(Source::Url(URL.to_string()))).await.unwrap_err();
        assert!(matches!(err, Error::TooLarge { limit, .. } if limit == 1 << 20));
        assert!(store.names().is_empty());
        assert!(is_empty_dir(&dir));
    }

    #[tokio::test]
    async fn stopped_flag_cancels() {
        let dir = temp_dir("stop");
        let messenger = FakeMessenger::new();
        let store = FakeStore::default();
        let opener = FakeOpener::with(URL, body(100));
        let settings = settings(&dir);
        let stop = StopFlag::new();
        stop.set(true);
        let transfer = Transfer {
            messenger: &messenger,
            store: &store,
            opener: &opener,
            settings: &settings,
            stop: &stop,
        };

        let err = transfer.run(&request(Source::Url(URL.to_string()))).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "Upload stopped by admin command");
        assert!(store.names().is_empty());
    }

    #[tokio::test]
    async fn truncated_upload_is_a_size_mismatch() {
        let dir = temp_dir("short");
        let messenger = FakeMessenger::new();
        let store = FakeStore {
            read_limit: Some(1024),
            ..Default::default()
        };
        let opener = FakeOpener::with(URL, body(200_000));
        let settings = settings(&dir);
        let stop = StopFlag::new();
        let transfer = Transfer {
            messenger: &messenger,
            store: &store,
            opener: &opener,
            settings: &settings,
            stop: &stop,
        };

        let err = transfer.run(&request(Source::Url(URL.to_string()))).await.unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { expected: 200_000, .. }));
        assert!(is_empty_dir(&dir));
    }

    #[tokio::test]
    async fn slow_status_edits_do_not_stall_the_download() {
        let dir = temp_dir("slow-edit");
        let messenger = FakeMessenger {
            edit_delay: Duration::from_millis(300),
            ..FakeMessenger::new()
        };
        let store = FakeStore::default();
        let mut opener = FakeOpener::with(URL, body(20 * 512));
        opener.chunk_size = 512;
        opener.chunk_delay = Duration::from_millis(20);
        let settings = settings(&dir);
        let stop = StopFlag::new();
        let transfer = Transfer {
            messenger: &messenger,
            store: &store,
            opener: &opener,
            settings: &settings,
            stop: &stop,
        };

        transfer.run(&request(Source::Url(URL.to_string()))).await.unwrap();

        let reads = opener.reads.lock().unwrap().clone();
        assert_eq!(reads.len(), 20);
        let max_gap = reads
            .windows(2)
            .map(|w| w[1].duration_since(w[0]))
            .max()
            .unwrap();
        assert!(max_gap < Duration::from_millis(200), "download stalled for {max_gap:?}");
        assert!(!messenger.edit_texts().is_empty());
        assert!(is_empty_dir(&dir));
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let dir = temp_dir("fail");
        let messenger = FakeMessenger::new();
        let store = FakeStore {
            fail_status: Some(422),
            ..Default::default()
        };
        let opener = FakeOpener::with(URL, body(500));
        let settings = settings(&dir);
        let stop = StopFlag::new();
        let transfer = Transfer {
            messenger: &messenger,
            store: &store,
            opener: &opener,
            settings: &settings,
            stop: &stop,
        };

        let err = transfer.run(&request(Source::Url(URL.to_string()))).await.unwrap_err();
        assert!(matches!(err, Error::Http { status: 422, .. }));
        assert!(is_empty_dir(&dir));
    }
}
