use std::time::Duration;

use futures_util::{StreamExt, TryStreamExt};

use crate::{
    ports::{OpenedSource, Source, SourceOpener},
    Error, Result,
};

const USER_AGENT: &str = concat!("release-relay/", env!("CARGO_PKG_VERSION"));

/// Opens direct HTTP(S) links as byte streams.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::External(format!("http client: {e}")))?;
        Ok(Self { client })
    }

    pub async fn open_url(&self, url: &str) -> Result<OpenedSource> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Download(format!("Failed to download: {e}")))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::Download(format!(
                "Failed to download: HTTP {}",
                status.as_u16()
            )));
        }

        let total = resp.content_length();
        tracing::debug!(url, ?total, "download stream opened");

        let body = resp
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
            .boxed();
        Ok(OpenedSource { total, body })
    }
}

#[async_trait::async_trait]
impl SourceOpener for HttpFetcher {
    async fn open(&self, source: &Source) -> Result<OpenedSource> {
        match source {
            Source::Url(url) => self.open_url(url).await,
            Source::TelegramFile { .. } => Err(Error::InvalidInput(
                "chat attachments are not reachable over plain HTTP".to_string(),
            )),
        }
    }
}
