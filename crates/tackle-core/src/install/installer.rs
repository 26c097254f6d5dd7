//! Download, verify and unpack packages into `{root}/pkgs`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tackle_schema::{Package, PackageType, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{InstallError, InstallParam, PackageInstaller};
use crate::checksum::{self, ChecksumDownloader, ChecksumEntry, Checksums, SHA256};
use crate::io::{Download, HttpDownload, ReleaseAssetDownload, ReleaseAssetParam, extract};
use crate::wait;

/// [`PackageInstaller`] that fetches release assets or URLs.
#[derive(Clone)]
pub struct DownloadInstaller {
    root: PathBuf,
    runtime: Runtime,
    http: Arc<dyn HttpDownload>,
    release: Arc<dyn ReleaseAssetDownload>,
    checksum: ChecksumDownloader,
}

impl std::fmt::Debug for DownloadInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadInstaller")
            .field("root", &self.root)
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

impl DownloadInstaller {
    pub fn new(
        root: PathBuf,
        runtime: Runtime,
        http: Arc<dyn HttpDownload>,
        release: Arc<dyn ReleaseAssetDownload>,
    ) -> Self {
        let checksum = ChecksumDownloader::new(Arc::clone(&http), Arc::clone(&release));
        Self {
            root,
            runtime,
            http,
            release,
            checksum,
        }
    }

    async fn download(&self, pkg: &Package, asset: &str) -> Result<Download, InstallError> {
        let name = pkg.to_string();
        let result = match pkg.info.type_ {
            PackageType::GithubRelease => {
                self.release
                    .download_release_asset(&ReleaseAssetParam {
                        owner: &pkg.info.repo_owner,
                        repo: &pkg.info.repo_name,
                        version: pkg.version(),
                        asset,
                    })
                    .await
            }
            PackageType::Http => {
                let url = pkg
                    .render_url(&self.runtime)
                    .map_err(|source| InstallError::Template {
                        package: name.clone(),
                        source,
                    })?;
                self.http.download(&url).await
            }
        };
        result.map_err(|source| InstallError::Download {
            package: name,
            source,
        })
    }

    /// Check `actual` against the store or the package's checksum file and
    /// record it.
    async fn verify(
        &self,
        pkg: &Package,
        asset: &str,
        actual: &str,
        checksums: Option<&mut Checksums>,
        require_checksum: bool,
    ) -> Result<(), InstallError> {
        let Some(checksums) = checksums else {
            return Ok(());
        };
        let package = pkg.to_string();
        let id = pkg.checksum_id(&self.runtime);

        if let Some(entry) = checksums.get(&id) {
            if !entry.checksum.eq_ignore_ascii_case(actual) {
                return Err(InstallError::ChecksumMismatch {
                    package,
                    expected: entry.checksum.clone(),
                    actual: actual.to_string(),
                });
            }
            return Ok(());
        }

        if let Some(source) = &pkg.info.checksum {
            if !source.algorithm.is_empty() && source.algorithm != SHA256 {
                return Err(InstallError::UnsupportedAlgorithm {
                    package,
                    algorithm: source.algorithm.clone(),
                });
            }
            let content = self
                .checksum
                .download_checksum(pkg, &self.runtime)
                .await?
                .collect()
                .await
                .map_err(|source| InstallError::Io {
                    path: PathBuf::from(asset),
                    source,
                })?;
            let content = String::from_utf8_lossy(&content);
            let expected = checksum::find_checksum(&content, asset).ok_or_else(|| {
                InstallError::ChecksumNotFound {
                    package: package.clone(),
                    asset: asset.to_string(),
                }
            })?;
            if !expected.eq_ignore_ascii_case(actual) {
                return Err(InstallError::ChecksumMismatch {
                    package,
                    expected,
                    actual: actual.to_string(),
                });
            }
        } else if require_checksum {
            return Err(InstallError::ChecksumRequired { package });
        } else {
            warn!(package = %package, "No checksum source, recording the downloaded digest");
        }

        checksums.set(ChecksumEntry {
            id,
            checksum: actual.to_string(),
            algorithm: SHA256.to_string(),
        });
        Ok(())
    }
}

fn io_err(path: &Path) -> impl Fn(std::io::Error) -> InstallError + '_ {
    move |source| InstallError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl PackageInstaller for DownloadInstaller {
    async fn install_package(&self, param: InstallParam<'_>) -> Result<(), InstallError> {
        let InstallParam {
            package: pkg,
            checksums,
            require_checksum,
        } = param;
        let name = pkg.to_string();
        let template_err = |source| InstallError::Template {
            package: name.clone(),
            source,
        };

        let pkg_path = pkg.pkg_path(&self.root, &self.runtime).map_err(template_err)?;
        if pkg_path.exists() {
            debug!(package = %name, pkg_path = %pkg_path.display(), "Package is already installed");
            return Ok(());
        }
        let asset = pkg.render_asset(&self.runtime).map_err(template_err)?;
        let format = pkg.format(&self.runtime).map_err(template_err)?;

        let parent = pkg_path.parent().unwrap_or(&self.root);
        tokio::fs::create_dir_all(parent).await.map_err(io_err(parent))?;
        let staging = tempfile::Builder::new()
            .prefix(".tackle-")
            .tempdir_in(parent)
            .map_err(io_err(parent))?;

        info!(package = %name, package_type = %pkg.info.type_, "Downloading package");
        let archive = staging.path().join("download");
        let actual = self
            .download(pkg, &asset)
            .await?
            .write_to(&archive)
            .await
            .map_err(io_err(&archive))?;

        self.verify(pkg, &asset, &actual, checksums, require_checksum)
            .await?;

        let unpacked = staging.path().join("pkg");
        let (archive_path, unpack_dir, file_name) = (archive.clone(), unpacked.clone(), asset.clone());
        tokio::task::spawn_blocking(move || {
            extract::unpack(&archive_path, format, &unpack_dir, &file_name)
        })
        .await
        .map_err(|e| InstallError::Io {
            path: archive.clone(),
            source: std::io::Error::other(e),
        })?
        .map_err(|source| InstallError::Extract {
            package: name.clone(),
            source,
        })?;

        if let Err(e) = tokio::fs::rename(&unpacked, &pkg_path).await {
            if pkg_path.exists() {
                debug!(package = %name, "Package was installed concurrently");
            } else {
                return Err(io_err(&pkg_path)(e));
            }
        }
        info!(package = %name, pkg_path = %pkg_path.display(), "Installed package");
        Ok(())
    }

    async fn wait_exe(&self, exe_path: &Path, cancel: &CancellationToken) -> Result<(), InstallError> {
        if !wait::wait_for_executable(exe_path, cancel).await? {
            warn!(exe_path = %exe_path.display(), "Executable did not appear, spawning anyway");
        }
        Ok(())
    }
}
