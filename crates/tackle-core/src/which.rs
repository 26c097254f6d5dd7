//! Resolve an executable name to the package that provides it.
//!
//! Configuration files are scanned in priority order and, within a file,
//! packages in import-merged order. The first package whose registry entry
//! declares the executable and whose conditions match the runtime wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tackle_schema::{
    Config, File, Package, PackageInfo, PackageRef, RegistryContent, Runtime, TemplateError,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ConfigError, ConfigLoader};
use crate::paths;
use crate::registry::{RegistryError, RegistryLoader};

#[derive(Error, Debug)]
pub enum WhichError {
    #[error("Command not found: {0}")]
    ExecutableNotFound(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Failed to render template for {package}: {source}")]
    Template {
        package: String,
        #[source]
        source: TemplateError,
    },
}

/// A package that provides the requested executable.
#[derive(Debug, Clone)]
pub struct FindResult {
    pub config: Arc<Config>,
    pub config_file_path: PathBuf,
    pub package: Package,
    pub file: File,
    pub exe_path: PathBuf,
}

/// Outcome of a resolution. `find` is `None` for a system command.
#[derive(Debug, Clone)]
pub struct WhichResult {
    pub find: Option<FindResult>,
    pub exe_path: PathBuf,
}

#[async_trait]
pub trait Which: Send + Sync {
    async fn which(&self, exe_name: &str) -> Result<WhichResult, WhichError>;
}

/// Registry contents of one configuration, keyed by registry name.
pub type Registries = HashMap<String, RegistryContent>;

/// Find the registry entry and file providing `exe_name` for `pkg`.
pub fn find_exec_file_from_pkg(
    registries: &Registries,
    exe_name: &str,
    pkg: &PackageRef,
) -> Option<(PackageInfo, File)> {
    let info = registries.get(pkg.registry_name())?.find(&pkg.name)?;
    let file = info.files().into_iter().find(|f| f.name == exe_name)?;
    Some((info.clone(), file))
}

/// Production [`Which`]: reads configuration and registries from disk.
#[derive(Debug, Clone)]
pub struct Resolver {
    config_files: Vec<PathBuf>,
    root: PathBuf,
    runtime: Runtime,
    loader: ConfigLoader,
    registries: RegistryLoader,
}

impl Resolver {
    pub fn new(
        config_files: Vec<PathBuf>,
        root: PathBuf,
        runtime: Runtime,
        registries: RegistryLoader,
    ) -> Self {
        Self {
            config_files,
            root,
            runtime,
            loader: ConfigLoader::new(),
            registries,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Load the registries the packages of `config` refer to.
    ///
    /// References to undeclared registries are skipped with a warning.
    pub async fn load_registries(
        &self,
        config_file_path: &Path,
        config: &Config,
    ) -> Result<Registries, WhichError> {
        let mut registries = Registries::new();
        for pkg in &config.packages {
            let name = pkg.registry_name();
            if registries.contains_key(name) {
                continue;
            }
            let Some(decl) = config.registry(name) else {
                warn!(registry = name, package = %pkg, config = %config_file_path.display(), "Registry is not declared");
                continue;
            };
            let content = self.registries.load(config_file_path, decl).await?;
            registries.insert(name.to_string(), content);
        }
        Ok(registries)
    }

    /// Every package of one configuration that applies to the runtime,
    /// one result per provided executable.
    pub async fn list_packages(&self, config_file_path: &Path) -> Result<Vec<FindResult>, WhichError> {
        let config = Arc::new(self.loader.load(config_file_path)?);
        let registries = self.load_registries(config_file_path, &config).await?;

        let mut results = Vec::new();
        for pkg_ref in &config.packages {
            let Some(info) = registries
                .get(pkg_ref.registry_name())
                .and_then(|r| r.find(&pkg_ref.name))
            else {
                warn!(package = %pkg_ref, "Package is not found in the registry");
                continue;
            };
            let package = Package::new(pkg_ref.clone(), info.clone());
            if !package.matches(&self.runtime) {
                continue;
            }
            for file in info.files() {
                results.push(self.find_result(&config, config_file_path, package.clone(), file)?);
            }
        }
        Ok(results)
    }

    fn find_result(
        &self,
        config: &Arc<Config>,
        config_file_path: &Path,
        package: Package,
        file: File,
    ) -> Result<FindResult, WhichError> {
        let exe_path = package
            .exe_path(&self.root, &file, &self.runtime)
            .map_err(|source| WhichError::Template {
                package: package.to_string(),
                source,
            })?;
        Ok(FindResult {
            config: Arc::clone(config),
            config_file_path: config_file_path.to_path_buf(),
            package,
            file,
            exe_path,
        })
    }

    async fn find_in_config(
        &self,
        config_file_path: &Path,
        exe_name: &str,
    ) -> Result<Option<FindResult>, WhichError> {
        let config = Arc::new(self.loader.load(config_file_path)?);
        let registries = self.load_registries(config_file_path, &config).await?;

        for pkg_ref in &config.packages {
            let Some((info, file)) = find_exec_file_from_pkg(&registries, exe_name, pkg_ref) else {
                continue;
            };
            let package = Package::new(pkg_ref.clone(), info);
            if !package.matches(&self.runtime) {
                debug!(package = %package, runtime = %self.runtime, "Package does not support this platform");
                continue;
            }
            return self
                .find_result(&config, config_file_path, package, file)
                .map(Some);
        }
        Ok(None)
    }

    /// Look `exe_name` up on `PATH`, skipping tackle's own shim directory.
    fn lookup_path(&self, exe_name: &str) -> Option<PathBuf> {
        let shims = paths::bin_path(&self.root);
        let path = std::env::var_os("PATH")?;
        let dirs: Vec<_> = std::env::split_paths(&path).filter(|d| *d != shims).collect();
        let dirs = std::env::join_paths(dirs).ok()?;
        let cwd = std::env::current_dir().ok()?;
        which::which_in(exe_name, Some(dirs), cwd).ok()
    }
}

#[async_trait]
impl Which for Resolver {
    async fn which(&self, exe_name: &str) -> Result<WhichResult, WhichError> {
        for config_file_path in &self.config_files {
            if let Some(find) = self.find_in_config(config_file_path, exe_name).await? {
                debug!(exe_name, package = %find.package, exe_path = %find.exe_path.display(), "Resolved");
                return Ok(WhichResult {
                    exe_path: find.exe_path.clone(),
                    find: Some(find),
                });
            }
        }

        match self.lookup_path(exe_name) {
            Some(exe_path) => {
                debug!(exe_name, exe_path = %exe_path.display(), "Using system command");
                Ok(WhichResult {
                    find: None,
                    exe_path,
                })
            }
            None => Err(WhichError::ExecutableNotFound(exe_name.to_string())),
        }
    }
}
