//! The checksum side-car file kept next to a configuration file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const FILE_NAMES: [&str; 2] = ["tackle-checksums.json", ".tackle-checksums.json"];

#[derive(Error, Debug)]
pub enum ChecksumFileError {
    #[error("Failed to read checksum file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse checksum file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write checksum file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize checksums: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One recorded digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumEntry {
    /// `name/version/os/arch`
    pub id: String,
    pub checksum: String,
    pub algorithm: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChecksumsFile {
    #[serde(default)]
    checksums: Vec<ChecksumEntry>,
}

/// Digests keyed by package identity.
#[derive(Debug, Default, Clone)]
pub struct Checksums {
    entries: BTreeMap<String, ChecksumEntry>,
    changed: bool,
}

impl Checksums {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the side-car file. A missing file yields an empty store.
    pub fn read(path: &Path) -> Result<Self, ChecksumFileError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(ChecksumFileError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let file: ChecksumsFile =
            serde_json::from_str(&content).map_err(|source| ChecksumFileError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            entries: file
                .checksums
                .into_iter()
                .map(|e| (e.id.clone(), e))
                .collect(),
            changed: false,
        })
    }

    pub fn get(&self, id: &str) -> Option<&ChecksumEntry> {
        self.entries.get(id)
    }

    /// Record a digest; marks the store dirty only if something changed.
    pub fn set(&mut self, entry: ChecksumEntry) {
        if self.entries.get(&entry.id) == Some(&entry) {
            return;
        }
        self.entries.insert(entry.id.clone(), entry);
        self.changed = true;
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the store back if it changed, via a temp file and rename.
    pub fn update(&self, path: &Path) -> Result<(), ChecksumFileError> {
        if !self.changed {
            return Ok(());
        }
        let file = ChecksumsFile {
            checksums: self.entries.values().cloned().collect(),
        };
        let mut content = serde_json::to_string_pretty(&file)?;
        content.push('\n');

        let write_err = |source| ChecksumFileError::Write {
            path: path.to_path_buf(),
            source,
        };
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content).map_err(write_err)?;
        fs::rename(&temp_path, path).map_err(write_err)?;
        debug!(path = %path.display(), count = self.entries.len(), "Saved checksums");
        Ok(())
    }
}

/// Side-car path for a configuration file: the first existing of
/// `tackle-checksums.json` and `.tackle-checksums.json` in the same
/// directory, otherwise the former.
pub fn checksum_file_path(config_file_path: &Path) -> PathBuf {
    let dir = config_file_path.parent().unwrap_or_else(|| Path::new("."));
    FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .unwrap_or_else(|| dir.join(FILE_NAMES[0]))
}
