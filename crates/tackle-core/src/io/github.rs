//! GitHub release assets.
//!
//! Assets are fetched from the public `releases/download` URL first. When
//! that fails (private repositories, rate limits on the web host) the REST
//! API is asked for the asset id and the asset is streamed from there.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::download::{Download, FetchError, HttpDownload, error_body};

const GITHUB_URL: &str = "https://github.com";
const GITHUB_API_URL: &str = "https://api.github.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseAssetParam<'a> {
    pub owner: &'a str,
    pub repo: &'a str,
    pub version: &'a str,
    pub asset: &'a str,
}

/// Fetch one asset of a GitHub release.
#[async_trait]
pub trait ReleaseAssetDownload: Send + Sync {
    async fn download_release_asset(
        &self,
        param: &ReleaseAssetParam<'_>,
    ) -> Result<Download, FetchError>;
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    name: String,
    url: String,
}

/// [`ReleaseAssetDownload`] with a REST API fallback.
#[derive(Clone)]
pub struct GitHubReleaseDownloader {
    http: Arc<dyn HttpDownload>,
    client: Client,
    token: Option<String>,
    web_base: String,
    api_base: String,
}

impl std::fmt::Debug for GitHubReleaseDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubReleaseDownloader")
            .field("web_base", &self.web_base)
            .field("api_base", &self.api_base)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

impl GitHubReleaseDownloader {
    pub fn new(http: Arc<dyn HttpDownload>, client: Client, token: Option<String>) -> Self {
        Self {
            http,
            client,
            token,
            web_base: GITHUB_URL.to_string(),
            api_base: GITHUB_API_URL.to_string(),
        }
    }

    /// Point the downloader at other hosts (GitHub Enterprise, tests).
    pub fn with_base_urls(mut self, web_base: &str, api_base: &str) -> Self {
        self.web_base = web_base.trim_end_matches('/').to_string();
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn direct_url(&self, p: &ReleaseAssetParam<'_>) -> String {
        format!(
            "{}/{}/{}/releases/download/{}/{}",
            self.web_base, p.owner, p.repo, p.version, p.asset
        )
    }

    async fn download_via_api(&self, p: &ReleaseAssetParam<'_>) -> Result<Download, FetchError> {
        let release_url = format!(
            "{}/repos/{}/{}/releases/tags/{}",
            self.api_base, p.owner, p.repo, p.version
        );
        let release: GithubRelease = self
            .api_get(&release_url, "application/vnd.github+json")
            .await?
            .json()
            .await
            .map_err(|source| FetchError::Request {
                url: release_url.clone(),
                source,
            })?;

        let asset = release
            .assets
            .into_iter()
            .find(|a| a.name == p.asset)
            .ok_or_else(|| FetchError::AssetNotFound {
                owner: p.owner.to_string(),
                repo: p.repo.to_string(),
                version: p.version.to_string(),
                asset: p.asset.to_string(),
            })?;

        let response = self.api_get(&asset.url, "application/octet-stream").await?;
        let content_length = response.content_length().unwrap_or(0);
        Ok(Download {
            body: response
                .bytes_stream()
                .map_err(std::io::Error::other)
                .boxed(),
            content_length,
        })
    }

    async fn api_get(&self, url: &str, accept: &str) -> Result<reqwest::Response, FetchError> {
        let mut req = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .header(reqwest::header::ACCEPT, accept);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let response = req.send().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
                body: error_body(url, response).await,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ReleaseAssetDownload for GitHubReleaseDownloader {
    async fn download_release_asset(
        &self,
        param: &ReleaseAssetParam<'_>,
    ) -> Result<Download, FetchError> {
        let url = self.direct_url(param);
        match self.http.download(&url).await {
            Ok(download) => Ok(download),
            Err(e) => {
                warn!(download_url = %url, error = %e, "Direct download failed, trying the GitHub API");
                debug!(owner = param.owner, repo = param.repo, version = param.version, asset = param.asset, "Looking up release asset");
                self.download_via_api(param).await
            }
        }
    }
}
