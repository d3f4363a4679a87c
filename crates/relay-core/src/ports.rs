use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream::BoxStream, Stream};

use crate::{
    domain::{Release, ReleaseAsset},
    Result,
};

/// A fallible stream of byte chunks read from a source.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Body of an asset upload. HTTP clients need it `Sync` to stream it.
pub type UploadBody = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static>>;

/// Hexagonal port for the release that stores uploaded files.
///
/// Implemented over the GitHub REST API in `relay-github`.
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Human-readable destination, e.g. `owner/repo@tag`.
    fn describe(&self) -> String;

    async fn release(&self) -> Result<Release>;

    /// All assets of the release, in API order.
    async fn list_assets(&self) -> Result<Vec<ReleaseAsset>>;

    /// Returns `false` when no asset carries `name`.
    async fn delete_asset_by_name(&self, name: &str) -> Result<bool>;

    /// Returns `false` when no asset carries `old_name`.
    async fn rename_asset(&self, old_name: &str, new_name: &str) -> Result<bool>;

    /// Public download URL of the asset named `name`, if present.
    async fn download_url(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .list_assets()
            .await?
            .into_iter()
            .find(|a| a.name == name)
            .map(|a| a.browser_download_url))
    }

    /// Upload `size` bytes from `body` as asset `name`, replacing any asset
    /// with the same name.
    async fn upload_asset(&self, name: &str, size: u64, body: UploadBody) -> Result<ReleaseAsset>;
}

/// Where the bytes of one upload come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// A file attached to a chat message, fetched through the bot API.
    TelegramFile { file_id: String, size: u64 },
    /// A direct HTTP(S) link.
    Url(String),
}

/// An opened source: its announced length (if any) and its body.
pub struct OpenedSource {
    pub total: Option<u64>,
    pub body: ByteStream,
}

/// Port for reading a `Source` as a byte stream.
#[async_trait]
pub trait SourceOpener: Send + Sync {
    async fn open(&self, source: &Source) -> Result<OpenedSource>;
}
