//! GitHub adapter (release assets).
//!
//! Implements `ReleaseStore` over the REST API: look up the release by tag,
//! page through its assets, delete, rename, and stream-upload assets.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::{
    config::Config,
    domain::{Release, ReleaseAsset},
    errors::Error,
    ports::{ReleaseStore, UploadBody},
    Result,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE},
    Response, StatusCode,
};

const PER_PAGE: usize = 100;
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("release-relay/", env!("CARGO_PKG_VERSION"));
const ERROR_BODY_CHARS: usize = 300;

#[derive(Clone, Debug)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    repo: String,
    tag: String,
}

impl GitHubClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        Self::with_settings(
            &cfg.github_api_url,
            &cfg.github_repo,
            &cfg.github_release_tag,
            &cfg.github_token,
            cfg.connect_timeout,
        )
    }

    pub fn with_settings(
        api_base: &str,
        repo: &str,
        tag: &str,
        token: &str,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| Error::Config("GITHUB_TOKEN contains invalid characters".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::External(format!("github client build: {e}")))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            tag: tag.to_string(),
        })
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{path}", self.api_base, self.repo)
    }

    async fn find_asset(&self, name: &str) -> Result<Option<ReleaseAsset>> {
        Ok(self.list_assets().await?.into_iter().find(|a| a.name == name))
    }

    /// Asset an upload of `name` would collide with. GitHub stores some
    /// names rewritten (`my file.mp4` becomes `my.file.mp4`), so the stored
    /// form is tried when there is no exact match.
    async fn find_upload_target(&self, name: &str) -> Result<Option<ReleaseAsset>> {
        let assets = self.list_assets().await?;
        let stored = stored_asset_name(name);
        let exact = assets.iter().position(|a| a.name == name);
        let index = exact.or_else(|| assets.iter().position(|a| a.name == stored));
        Ok(index.map(|i| assets[i].clone()))
    }

    async fn delete_asset(&self, asset: &ReleaseAsset) -> Result<()> {
        let resp = self
            .http
            .delete(self.repo_url(&format!("releases/assets/{}", asset.id)))
            .send()
            .await
            .map_err(request_error)?;
        check(resp).await?;
        tracing::info!(asset = %asset.name, id = asset.id, "release asset deleted");
        Ok(())
    }
}

#[async_trait]
impl ReleaseStore for GitHubClient {
    fn describe(&self) -> String {
        format!("{}@{}", self.repo, self.tag)
    }

    async fn release(&self) -> Result<Release> {
        let resp = self
            .http
            .get(self.repo_url(&format!("releases/tags/{}", self.tag)))
            .send()
            .await
            .map_err(request_error)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!(
                "release with tag '{}' in {}",
                self.tag, self.repo
            )));
        }
        json(check(resp).await?).await
    }

    async fn list_assets(&self) -> Result<Vec<ReleaseAsset>> {
        let release = self.release().await?;
        let url = self.repo_url(&format!("releases/{}/assets", release.id));

        let mut assets = Vec::new();
        for page in 1.. {
            let resp = self
                .http
                .get(&url)
                .query(&[("per_page", PER_PAGE), ("page", page)])
                .send()
                .await
                .map_err(request_error)?;
            let batch: Vec<ReleaseAsset> = json(check(resp).await?).await?;
            let done = batch.len() < PER_PAGE;
            assets.extend(batch);
            if done {
                break;
            }
        }

        tracing::debug!(count = assets.len(), "listed release assets");
        Ok(assets)
    }

    async fn delete_asset_by_name(&self, name: &str) -> Result<bool> {
        match self.find_asset(name).await? {
            Some(asset) => {
                self.delete_asset(&asset).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn rename_asset(&self, old_name: &str, new_name: &str) -> Result<bool> {
        let Some(asset) = self.find_asset(old_name).await? else {
            return Ok(false);
        };

        let resp = self
            .http
            .patch(self.repo_url(&format!("releases/assets/{}", asset.id)))
            .json(&serde_json::json!({ "name": new_name }))
            .send()
            .await
            .map_err(request_error)?;
        check(resp).await?;

        tracing::info!(from = %old_name, to = %new_name, "release asset renamed");
        Ok(true)
    }

    async fn upload_asset(&self, name: &str, size: u64, body: UploadBody) -> Result<ReleaseAsset> {
        let release = self.release().await?;

        if let Some(existing) = self.find_upload_target(name).await? {
            self.delete_asset(&existing).await?;
        }

        let resp = self
            .http
            .post(upload_endpoint(&release.upload_url))
            .query(&[("name", name)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .map_err(request_error)?;

        let status = resp.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(http_error(resp).await);
        }
        json(resp).await
    }
}

/// Strip the RFC 6570 suffix (`{?name,label}`) from a release's upload URL.
fn upload_endpoint(template: &str) -> &str {
    match template.find('{') {
        Some(i) => &template[..i],
        None => template,
    }
}

/// The name GitHub keeps for an uploaded asset: characters outside
/// `[A-Za-z0-9._-]` become `.`, runs of dots collapse and edge dots go.
fn stored_asset_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            c
        } else {
            '.'
        };
        if c == '.' && out.ends_with('.') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('.').to_string()
}

fn request_error(e: reqwest::Error) -> Error {
    Error::External(format!("github request error: {e}"))
}

async fn check(resp: Response) -> Result<Response> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(http_error(resp).await)
    }
}

async fn http_error(resp: Response) -> Error {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Error::Http {
        status,
        body: truncate_body(&body),
    }
}

async fn json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T> {
    resp.json()
        .await
        .map_err(|e| Error::External(format!("github json error: {e}")))
}

fn truncate_body(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= ERROR_BODY_CHARS {
        body.to_string()
    } else {
        format!("{}...", body.chars().take(ERROR_BODY_CHARS).collect::<String>())
    }
}
