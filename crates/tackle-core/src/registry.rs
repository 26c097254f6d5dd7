//! Registry loading.
//!
//! `local` registries are read relative to the configuration file that
//! declares them. `github_content` registries are downloaded once and kept
//! under `{root}/registries`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tackle_schema::{RegistryContent, RegistryDecl, RegistryType};
use thiserror::Error;
use tracing::{debug, info};

use crate::io::{FetchError, HttpDownload};
use crate::paths;

const RAW_GITHUB_URL: &str = "https://raw.githubusercontent.com";

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry '{name}' has unknown type '{type_}'")]
    UnknownType { name: String, type_: String },

    #[error("Registry '{name}' is missing '{field}'")]
    MissingField { name: String, field: &'static str },

    #[error("Failed to read registry {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse registry {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to download registry '{name}': {source}")]
    Fetch {
        name: String,
        #[source]
        source: FetchError,
    },
}

/// Loads registry documents.
#[derive(Clone)]
pub struct RegistryLoader {
    root: PathBuf,
    http: Arc<dyn HttpDownload>,
    raw_base: String,
}

impl std::fmt::Debug for RegistryLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryLoader")
            .field("root", &self.root)
            .field("raw_base", &self.raw_base)
            .finish_non_exhaustive()
    }
}

impl RegistryLoader {
    pub fn new(root: PathBuf, http: Arc<dyn HttpDownload>) -> Self {
        Self {
            root,
            http,
            raw_base: RAW_GITHUB_URL.to_string(),
        }
    }

    /// Fetch `github_content` registries from another host.
    pub fn with_raw_base(mut self, raw_base: &str) -> Self {
        self.raw_base = raw_base.trim_end_matches('/').to_string();
        self
    }

    /// Load the registry `decl` declared in `config_file_path`.
    pub async fn load(
        &self,
        config_file_path: &Path,
        decl: &RegistryDecl,
    ) -> Result<RegistryContent, RegistryError> {
        let kind = decl.kind().map_err(|_| RegistryError::UnknownType {
            name: decl.name.clone(),
            type_: decl.type_.clone(),
        })?;
        if decl.path.is_empty() {
            return Err(missing(decl, "path"));
        }

        let path = match kind {
            RegistryType::Local => config_file_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(&decl.path),
            RegistryType::GitHubContent => self.fetch_github_content(decl).await?,
        };

        debug!(registry = %decl.name, path = %path.display(), "Reading registry");
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| RegistryError::Read {
                path: path.clone(),
                source,
            })?;
        RegistryContent::from_yaml(&content).map_err(|source| RegistryError::Parse { path, source })
    }

    /// Cache location of a `github_content` registry.
    pub fn cache_path(&self, decl: &RegistryDecl) -> PathBuf {
        paths::registries_path(&self.root)
            .join("github_content")
            .join("github.com")
            .join(&decl.repo_owner)
            .join(&decl.repo_name)
            .join(&decl.git_ref)
            .join(&decl.path)
    }

    async fn fetch_github_content(&self, decl: &RegistryDecl) -> Result<PathBuf, RegistryError> {
        for (field, value) in [
            ("repo_owner", &decl.repo_owner),
            ("repo_name", &decl.repo_name),
            ("ref", &decl.git_ref),
        ] {
            if value.is_empty() {
                return Err(missing(decl, field));
            }
        }

        let cache = self.cache_path(decl);
        if cache.is_file() {
            return Ok(cache);
        }

        let url = format!(
            "{}/{}/{}/{}/{}",
            self.raw_base, decl.repo_owner, decl.repo_name, decl.git_ref, decl.path
        );
        info!(registry = %decl.name, download_url = %url, "Downloading registry");
        let fetch_err = |source| RegistryError::Fetch {
            name: decl.name.clone(),
            source,
        };
        let data = self
            .http
            .download(&url)
            .await
            .map_err(fetch_err)?
            .collect()
            .await
            .map_err(|e| fetch_err(FetchError::Io(e)))?;

        let write_err = |source| RegistryError::Read {
            path: cache.clone(),
            source,
        };
        if let Some(parent) = cache.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let tmp = cache.with_extension("tmp");
        tokio::fs::write(&tmp, &data).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &cache).await.map_err(write_err)?;
        Ok(cache)
    }
}

fn missing(decl: &RegistryDecl, field: &'static str) -> RegistryError {
    RegistryError::MissingField {
        name: decl.name.clone(),
        field,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::HttpDownloader;
    use mockito::Server;
    use std::fs;
    use tempfile::tempdir;

    const REGISTRY: &str = "packages:\n  - repo_owner: acme\n    repo_name: tool\n    asset: tool.tar.gz\n";

    fn decl(type_: &str) -> RegistryDecl {
        RegistryDecl {
            name: "standard".into(),
            type_: type_.into(),
            path: "registry.yaml".into(),
            repo_owner: "acme".into(),
            repo_name: "registry".into(),
            git_ref: "v1".into(),
        }
    }

    #[tokio::test]
    async fn test_local_registry_is_relative_to_config() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("registry.yaml"), REGISTRY).unwrap();
        let loader = RegistryLoader::new(dir.path().join("root"), Arc::new(HttpDownloader::default()));

        let content = loader
            .load(&dir.path().join("tackle.yaml"), &decl("local"))
            .await
            .unwrap();
        assert!(content.find("acme/tool").is_some());
    }

    #[tokio::test]
    async fn test_github_content_is_downloaded_once() {
        let dir = tempdir().unwrap();
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/acme/registry/v1/registry.yaml")
            .with_status(200)
            .with_body(REGISTRY)
            .expect(1)
            .create_async()
            .await;

        let loader = RegistryLoader::new(dir.path().to_path_buf(), Arc::new(HttpDownloader::default()))
            .with_raw_base(&server.url());
        let config = dir.path().join("tackle.yaml");
        let d = decl("github_content");

        for _ in 0..2 {
            let content = loader.load(&config, &d).await.unwrap();
            assert_eq!(content.packages.len(), 1);
        }
        mock.assert_async().await;
        assert!(
            dir.path()
                .join("registries/github_content/github.com/acme/registry/v1/registry.yaml")
                .is_file()
        );
    }

    #[tokio::test]
    async fn test_unknown_type() {
        let dir = tempdir().unwrap();
        let loader = RegistryLoader::new(dir.path().to_path_buf(), Arc::new(HttpDownloader::default()));
        let err = loader
            .load(&dir.path().join("tackle.yaml"), &decl("svn"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownType { ref type_, .. } if type_ == "svn"));
    }

    #[tokio::test]
    async fn test_malformed_registry() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("registry.yaml"), "packages: [").unwrap();
        let loader = RegistryLoader::new(dir.path().to_path_buf(), Arc::new(HttpDownloader::default()));
        let err = loader
            .load(&dir.path().join("tackle.yaml"), &decl("local"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Parse { .. }));
    }
}
