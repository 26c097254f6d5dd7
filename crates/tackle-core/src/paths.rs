use std::path::{Path, PathBuf};

/// Returns the root directory, or None if no data directory can be resolved.
pub fn try_root_dir() -> Option<PathBuf> {
    if let Some(val) = std::env::var_os("TACKLE_ROOT_DIR").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(val));
    }
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
        .map(|d| d.join("tackle"))
}

/// Shim directory: {root}/bin
pub fn bin_path(root: &Path) -> PathBuf {
    root.join("bin")
}

/// Installed packages: {root}/pkgs
pub fn pkgs_path(root: &Path) -> PathBuf {
    root.join("pkgs")
}

/// Cached remote registries: {root}/registries
pub fn registries_path(root: &Path) -> PathBuf {
    root.join("registries")
}

/// File names looked for in every directory while discovering configuration.
pub const CONFIG_FILE_NAMES: &[&str] = &[
    "tackle.yaml",
    "tackle.yml",
    ".tackle.yaml",
    ".tackle.yml",
    ".tackle/tackle.yaml",
];

/// Candidate configuration files from `start` up to the file system root,
/// nearest first.
pub fn find_config_files(start: &Path) -> Vec<PathBuf> {
    start
        .ancestors()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .filter(|path| path.is_file())
        .collect()
}
