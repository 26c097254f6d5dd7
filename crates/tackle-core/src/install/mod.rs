//! Package installation.
//!
//! [`PackageInstaller`] is the capability the execution pipeline installs
//! through; [`DownloadInstaller`] is the production implementation.
//! [`verify_and_install`] owns the checksum side-car lifecycle around it.

pub mod installer;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tackle_schema::{Package, TemplateError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::checksum::{ChecksumDownloadError, ChecksumFileError, Checksums, checksum_file_path};
use crate::io::FetchError;
use crate::io::extract::ExtractError;
use crate::wait::Cancelled;
use crate::which::FindResult;

pub use installer::DownloadInstaller;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Failed to render template for {package}: {source}")]
    Template {
        package: String,
        #[source]
        source: TemplateError,
    },

    #[error("Failed to download {package}: {source}")]
    Download {
        package: String,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    ChecksumDownload(#[from] ChecksumDownloadError),

    #[error(transparent)]
    ChecksumFile(#[from] ChecksumFileError),

    #[error("Checksum for {asset} not found in the checksum file of {package}")]
    ChecksumNotFound { package: String, asset: String },

    #[error("Checksum mismatch for {package}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        package: String,
        expected: String,
        actual: String,
    },

    #[error("Checksum is required but unavailable for {package}")]
    ChecksumRequired { package: String },

    #[error("Unsupported checksum algorithm '{algorithm}' for {package}")]
    UnsupportedAlgorithm { package: String, algorithm: String },

    #[error("Failed to unpack {package}: {source}")]
    Extract {
        package: String,
        #[source]
        source: ExtractError,
    },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Arguments of one install.
#[derive(Debug)]
pub struct InstallParam<'a> {
    pub package: &'a Package,
    /// `None` when checksum verification is disabled.
    pub checksums: Option<&'a mut Checksums>,
    pub require_checksum: bool,
}

/// Installs packages and waits for their executables.
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    async fn install_package(&self, param: InstallParam<'_>) -> Result<(), InstallError>;

    async fn wait_exe(&self, exe_path: &Path, cancel: &CancellationToken) -> Result<(), InstallError>;
}

/// Install the package of `find`, maintaining the checksum side-car file.
///
/// The store is written back whether or not the install succeeded; a write
/// failure is only logged.
pub async fn verify_and_install(
    installer: &dyn PackageInstaller,
    find: &FindResult,
    cancel: &CancellationToken,
) -> Result<(), InstallError> {
    let checksum_path = checksum_file_path(&find.config_file_path);
    let mut checksums = if find.config.checksum_enabled() {
        Some(Checksums::read(&checksum_path)?)
    } else {
        None
    };

    let result = installer
        .install_package(InstallParam {
            package: &find.package,
            checksums: checksums.as_mut(),
            require_checksum: find.config.require_checksum(),
        })
        .await;

    if let Some(checksums) = &checksums {
        if let Err(e) = checksums.update(&checksum_path) {
            warn!(error = %e, path = %checksum_path.display(), "Failed to update the checksum file");
        }
    }
    result?;

    installer.wait_exe(&find.exe_path, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumEntry;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tackle_schema::{Config, File, PackageInfo, PackageRef};
    use tempfile::tempdir;

    struct FakeInstaller {
        fail: bool,
        waited: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl PackageInstaller for FakeInstaller {
        async fn install_package(&self, param: InstallParam<'_>) -> Result<(), InstallError> {
            if let Some(checksums) = param.checksums {
                checksums.set(ChecksumEntry {
                    id: param.package.name().to_string(),
                    checksum: "abc".into(),
                    algorithm: "sha256".into(),
                });
            }
            if self.fail {
                return Err(InstallError::ChecksumRequired {
                    package: param.package.to_string(),
                });
            }
            Ok(())
        }

        async fn wait_exe(&self, exe_path: &Path, _: &CancellationToken) -> Result<(), InstallError> {
            self.waited.lock().unwrap().push(exe_path.to_path_buf());
            Ok(())
        }
    }

    fn find(dir: &Path, checksum: bool) -> FindResult {
        let yaml = format!("checksum:\n  enabled: {checksum}\n");
        FindResult {
            config: Arc::new(Config::from_yaml(&yaml).unwrap()),
            config_file_path: dir.join("tackle.yaml"),
            package: Package::new(PackageRef::new("acme/tool", "v1"), PackageInfo::default()),
            file: File::default(),
            exe_path: dir.join("tool"),
        }
    }

    #[tokio::test]
    async fn test_store_saved_even_when_install_fails() {
        let dir = tempdir().unwrap();
        let installer = FakeInstaller {
            fail: true,
            waited: Mutex::default(),
        };

        let err = verify_and_install(&installer, &find(dir.path(), true), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::ChecksumRequired { .. }));

        let saved = Checksums::read(&dir.path().join("tackle-checksums.json")).unwrap();
        assert_eq!(saved.get("acme/tool").unwrap().checksum, "abc");
        assert!(installer.waited.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_checksum_skips_store() {
        let dir = tempdir().unwrap();
        let installer = FakeInstaller {
            fail: false,
            waited: Mutex::default(),
        };

        verify_and_install(&installer, &find(dir.path(), false), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!dir.path().join("tackle-checksums.json").exists());
        assert_eq!(*installer.waited.lock().unwrap(), vec![dir.path().join("tool")]);
    }

    #[tokio::test]
    async fn test_unwritable_store_does_not_fail_install() {
        let dir = tempdir().unwrap();
        // The staging file cannot be created where a directory sits.
        fs::create_dir(dir.path().join("tackle-checksums.json.tmp")).unwrap();
        let installer = FakeInstaller {
            fail: false,
            waited: Mutex::default(),
        };

        verify_and_install(&installer, &find(dir.path(), true), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!dir.path().join("tackle-checksums.json").exists());
        assert_eq!(*installer.waited.lock().unwrap(), vec![dir.path().join("tool")]);
    }

    #[tokio::test]
    async fn test_malformed_store_aborts() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("tackle-checksums.json"), "[").unwrap();
        let installer = FakeInstaller {
            fail: false,
            waited: Mutex::default(),
        };

        let err = verify_and_install(&installer, &find(dir.path(), true), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::ChecksumFile(_)));
    }
}
