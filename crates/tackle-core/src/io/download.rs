//! HTTP fetching.
//!
//! Bodies are handed back as streams so callers can hash and write them to
//! disk without buffering whole artifacts. There is no retry at this layer.

use std::fmt;
use std::io;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, Url};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// A response body.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a status >= 400. The body is kept so it can
    /// be inspected; the content length of such a response is 0.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16, body: Bytes },

    #[error("Asset {asset} not found in release {version} of {owner}/{repo}")]
    AssetNotFound {
        owner: String,
        repo: String,
        version: String,
        asset: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A successful download: a body stream and its advertised length.
pub struct Download {
    pub body: ByteStream,
    /// Value of `Content-Length`, or 0 when the server did not send one.
    pub content_length: u64,
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Download")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl Download {
    /// Wrap an in-memory body.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        Self {
            content_length: data.len() as u64,
            body: stream::once(async move { Ok::<_, io::Error>(data) }).boxed(),
        }
    }

    /// Read the whole body into memory.
    pub async fn collect(self) -> io::Result<Vec<u8>> {
        self.body
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
    }

    /// Stream the body into `dest`, returning its hex SHA-256 digest.
    pub async fn write_to(mut self, dest: &Path) -> io::Result<String> {
        let mut file = File::create(dest).await?;
        let mut hasher = Sha256::new();

        while let Some(chunk) = self.body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
        }

        file.flush().await?;
        Ok(hex::encode(hasher.finalize()))
    }
}

/// GET a URL.
#[async_trait]
pub trait HttpDownload: Send + Sync {
    async fn download(&self, url: &str) -> Result<Download, FetchError>;
}

/// [`HttpDownload`] over a shared reqwest client.
#[derive(Debug, Clone, Default)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpDownload for HttpDownloader {
    async fn download(&self, url: &str) -> Result<Download, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        debug!(download_url = url, "Downloading");
        let response = self
            .client
            .get(parsed)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = error_body(url, response).await;
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let content_length = response.content_length().unwrap_or(0);
        let body = response.bytes_stream().map_err(io::Error::other).boxed();
        Ok(Download {
            body,
            content_length,
        })
    }
}

/// Body of an error response; empty if it cannot be read.
pub(crate) async fn error_body(url: &str, response: reqwest::Response) -> Bytes {
    match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            debug!(url, error = %e, "Failed to read the error response body");
            Bytes::new()
        }
    }
}
