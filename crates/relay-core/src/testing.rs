//! Hand-written fakes of the ports for unit tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;

use crate::{
    domain::{ChatId, MessageId, MessageRef, Release, ReleaseAsset},
    messaging::{
        port::MessagingPort,
        types::InlineKeyboard,
    },
    ports::{OpenedSource, ReleaseStore, Source, SourceOpener, UploadBody},
    Error, Result,
};

#[derive(Default)]
pub(crate) struct FakeMessenger {
    pub next_id: Mutex<i32>,
    pub sends: Mutex<Vec<(ChatId, String)>>,
    pub edits: Mutex<Vec<(MessageRef, String)>>,
    pub deletes: Mutex<Vec<MessageRef>>,
    pub documents: Mutex<Vec<(ChatId, String, Vec<u8>, String)>>,
    pub fail_documents: bool,
    /// Hold every `edit_html` call this long before recording it.
    pub edit_delay: Duration,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(1),
            ..Default::default()
        }
    }

    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        let id = *guard;
        *guard += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(id),
        }
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sends.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn edit_texts(&self) -> Vec<String> {
        self.edits.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.sends.lock().unwrap().push((chat_id, html.to_string()));
        Ok(self.alloc(chat_id))
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        if !self.edit_delay.is_zero() {
            tokio::time::sleep(self.edit_delay).await;
        }
        self.edits.lock().unwrap().push((msg, html.to_string()));
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.deletes.lock().unwrap().push(msg);
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        _keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.sends.lock().unwrap().push((chat_id, html.to_string()));
        Ok(self.alloc(chat_id))
    }

    async fn edit_inline_keyboard(
        &self,
        msg: MessageRef,
        html: &str,
        _keyboard: InlineKeyboard,
    ) -> Result<()> {
        self.edits.lock().unwrap().push((msg, html.to_string()));
        Ok(())
    }

    async fn answer_callback_query(&self, _callback_id: &str, _text: Option<&str>) -> Result<()> {
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        contents: Vec<u8>,
        caption_html: &str,
    ) -> Result<MessageRef> {
        if self.fail_documents {
            return Err(Error::External("document upload refused".to_string()));
        }
        self.documents.lock().unwrap().push((
            chat_id,
            file_name.to_string(),
            contents,
            caption_html.to_string(),
        ));
        Ok(self.alloc(chat_id))
    }
}

/// In-memory release. Records every uploaded body.
#[derive(Default)]
pub(crate) struct FakeStore {
    pub assets: Mutex<Vec<ReleaseAsset>>,
    pub bodies: Mutex<HashMap<String, Vec<u8>>>,
    /// Fail every upload with this HTTP status.
    pub fail_status: Option<u16>,
    /// Stop reading the body after this many bytes.
    pub read_limit: Option<usize>,
    /// Panic when asked to upload this name.
    pub panic_on: Option<String>,
    pub next_id: Mutex<u64>,
}

impl FakeStore {
    pub fn with_assets(names: &[&str]) -> Self {
        let store = Self::default();
        for name in names {
            store.push(name, 1024);
        }
        store
    }

    fn push(&self, name: &str, size: u64) -> ReleaseAsset {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            *next
        };
        let asset = ReleaseAsset {
            id,
            name: name.to_string(),
            size,
            browser_download_url: format!("https://github.com/o/r/releases/download/t/{name}"),
        };
        self.assets.lock().unwrap().push(asset.clone());
        asset
    }

    pub fn names(&self) -> Vec<String> {
        self.assets.lock().unwrap().iter().map(|a| a.name.clone()).collect()
    }
}

#[async_trait]
impl ReleaseStore for FakeStore {
    fn describe(&self) -> String {
        "o/r@t".to_string()
    }

    async fn release(&self) -> Result<Release> {
        Ok(Release {
            id: 1,
            tag_name: "t".to_string(),
            upload_url: "https://uploads.example.com/assets{?name,label}".to_string(),
        })
    }

    async fn list_assets(&self) -> Result<Vec<ReleaseAsset>> {
        Ok(self.assets.lock().unwrap().clone())
    }

    async fn delete_asset_by_name(&self, name: &str) -> Result<bool> {
        let mut assets = self.assets.lock().unwrap();
        let before = assets.len();
        assets.retain(|a| a.name != name);
        Ok(assets.len() != before)
    }

    async fn rename_asset(&self, old_name: &str, new_name: &str) -> Result<bool> {
        let mut assets = self.assets.lock().unwrap();
        match assets.iter_mut().find(|a| a.name == old_name) {
            Some(asset) => {
                asset.name = new_name.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn upload_asset(&self, name: &str, _size: u64, mut body: UploadBody) -> Result<ReleaseAsset> {
        if self.panic_on.as_deref() == Some(name) {
            panic!("store crashed while uploading {name}");
        }
        if let Some(status) = self.fail_status {
            return Err(Error::Http {
                status,
                body: "upload rejected".to_string(),
            });
        }

        let mut data = Vec::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            data.extend_from_slice(&chunk);
            if self.read_limit.is_some_and(|limit| data.len() >= limit) {
                break;
            }
        }

        self.delete_asset_by_name(name).await?;
        let asset = self.push(name, data.len() as u64);
        self.bodies.lock().unwrap().insert(name.to_string(), data);
        Ok(asset)
    }
}

/// Serves canned bodies keyed by URL or Telegram file id.
#[derive(Default)]
pub(crate) struct FakeOpener {
    pub bodies: HashMap<String, Vec<u8>>,
    /// Announce this length (or none) instead of the real one.
    pub announced: HashMap<String, Option<u64>>,
    pub chunk_size: usize,
    /// Pause before yielding each chunk.
    pub chunk_delay: Duration,
    /// When each chunk was handed to the reader.
    pub reads: Arc<Mutex<Vec<Instant>>>,
}

impl FakeOpener {
    pub fn with(key: &str, body: Vec<u8>) -> Self {
        Self {
            bodies: HashMap::from([(key.to_string(), body)]),
            chunk_size: 1024,
            ..Default::default()
        }
    }
}

#[async_trait]
impl SourceOpener for FakeOpener {
    async fn open(&self, source: &Source) -> Result<OpenedSource> {
        let key = match source {
            Source::Url(url) => url.as_str(),
            Source::TelegramFile { file_id, .. } => file_id.as_str(),
        };
        let Some(body) = self.bodies.get(key) else {
            return Err(Error::Download("Failed to download: HTTP 404".to_string()));
        };

        let total = match self.announced.get(key) {
            Some(announced) => *announced,
            None => Some(body.len() as u64),
        };
        let chunks: Vec<std::io::Result<Bytes>> = body
            .chunks(self.chunk_size.max(1))
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let (delay, reads) = (self.chunk_delay, self.reads.clone());
        let body = futures_util::stream::iter(chunks)
            .then(move |chunk| {
                let reads = reads.clone();
                async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    reads.lock().unwrap().push(Instant::now());
                    chunk
                }
            })
            .boxed();
        Ok(OpenedSource { total, body })
    }
}
