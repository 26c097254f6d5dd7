//! Checksum acquisition: fetch the checksum file a package declares.

use std::sync::Arc;

use tackle_schema::{Package, Runtime, TemplateError};
use thiserror::Error;
use tracing::debug;

use crate::io::{Download, FetchError, HttpDownload, ReleaseAssetDownload, ReleaseAssetParam};

#[derive(Error, Debug)]
pub enum ChecksumDownloadError {
    #[error("Unknown checksum type '{type_}' for {package}")]
    UnknownType { package: String, type_: String },

    #[error("{package} declares no checksum source")]
    NoSource { package: String },

    #[error("Failed to render checksum template for {package}: {source}")]
    Template {
        package: String,
        #[source]
        source: TemplateError,
    },

    #[error("Failed to download checksum for {package}: {source}")]
    Fetch {
        package: String,
        #[source]
        source: FetchError,
    },
}

/// Dispatches on the checksum source type of a package.
#[derive(Clone)]
pub struct ChecksumDownloader {
    http: Arc<dyn HttpDownload>,
    release: Arc<dyn ReleaseAssetDownload>,
}

impl std::fmt::Debug for ChecksumDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChecksumDownloader").finish_non_exhaustive()
    }
}

impl ChecksumDownloader {
    pub fn new(http: Arc<dyn HttpDownload>, release: Arc<dyn ReleaseAssetDownload>) -> Self {
        Self { http, release }
    }

    pub async fn download_checksum(
        &self,
        pkg: &Package,
        rt: &Runtime,
    ) -> Result<Download, ChecksumDownloadError> {
        let package = pkg.to_string();
        let source = pkg
            .info
            .checksum
            .as_ref()
            .ok_or_else(|| ChecksumDownloadError::NoSource {
                package: package.clone(),
            })?;
        let template_err = |source| ChecksumDownloadError::Template {
            package: package.clone(),
            source,
        };
        let fetch_err = |source| ChecksumDownloadError::Fetch {
            package: package.clone(),
            source,
        };

        match source.type_.as_str() {
            "github_release" => {
                let asset = pkg.render_checksum_file_name(rt).map_err(template_err)?;
                debug!(package = %package, asset = %asset, "Downloading checksum asset");
                self.release
                    .download_release_asset(&ReleaseAssetParam {
                        owner: &pkg.info.repo_owner,
                        repo: &pkg.info.repo_name,
                        version: pkg.version(),
                        asset: &asset,
                    })
                    .await
                    .map_err(fetch_err)
            }
            "http" => {
                let url = pkg.render_checksum_url(rt).map_err(template_err)?;
                debug!(package = %package, download_url = %url, "Downloading checksum file");
                self.http.download(&url).await.map_err(fetch_err)
            }
            other => Err(ChecksumDownloadError::UnknownType {
                package,
                type_: other.to_string(),
            }),
        }
    }
}
