//! Configuration loading with recursive import expansion.
//!
//! `import` entries are replaced in place by the packages of every file
//! their glob matches, in lexicographic path order, so two loads of the
//! same tree always produce the same package order.

use std::fs;
use std::path::{Path, PathBuf};

use tackle_schema::Config;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid import pattern '{pattern}' in {path}: {message}")]
    Glob {
        path: PathBuf,
        pattern: String,
        message: String,
    },

    #[error("Failed to import {path}: {source}")]
    Import {
        path: PathBuf,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("Import cycle detected at {0}")]
    ImportCycle(PathBuf),
}

/// Reads configuration files and expands their imports.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load the configuration at `path`, expanding imports recursively.
    ///
    /// After a successful load no package entry is an import directive.
    pub fn load(&self, path: &Path) -> Result<Config, ConfigError> {
        let mut chain = Vec::new();
        self.load_inner(path, &mut chain)
    }

    fn load_inner(&self, path: &Path, chain: &mut Vec<PathBuf>) -> Result<Config, ConfigError> {
        let canonical = fs::canonicalize(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if chain.contains(&canonical) {
            return Err(ConfigError::ImportCycle(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cfg = Config::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if !cfg.packages.iter().any(|p| p.is_import()) {
            return Ok(cfg);
        }

        chain.push(canonical);
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let mut packages = Vec::with_capacity(cfg.packages.len());
        for pkg in std::mem::take(&mut cfg.packages) {
            if !pkg.is_import() {
                packages.push(pkg);
                continue;
            }
            for file in expand_import(path, base, &pkg.import)? {
                debug!(config = %path.display(), import = %file.display(), "Importing configuration");
                let sub = self
                    .load_inner(&file, chain)
                    .map_err(|source| match source {
                        ConfigError::ImportCycle(_) => source,
                        source => ConfigError::Import {
                            path: file.clone(),
                            source: Box::new(source),
                        },
                    })?;
                packages.extend(sub.packages);
            }
        }
        chain.pop();

        cfg.packages = packages;
        Ok(cfg)
    }
}

/// Expand an import glob relative to `base`, sorted lexicographically.
fn expand_import(config: &Path, base: &Path, pattern: &str) -> Result<Vec<PathBuf>, ConfigError> {
    let glob_error = |message: String| ConfigError::Glob {
        path: config.to_path_buf(),
        pattern: pattern.to_string(),
        message,
    };
    let full = base.join(pattern);
    let full = full.to_str().ok_or_else(|| glob_error("non UTF-8 path".to_string()))?;

    let mut files = Vec::new();
    for entry in glob::glob(full).map_err(|e| glob_error(e.to_string()))? {
        let file = entry.map_err(|e| glob_error(e.to_string()))?;
        if file.is_file() {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}
