//! Process-wide settings read from the environment.

use std::path::{Path, PathBuf};

use tackle_schema::Runtime;
use thiserror::Error;

use crate::paths;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Could not determine a data directory. Set TACKLE_ROOT_DIR to override.")]
    NoRootDir,

    #[error("Could not determine the working directory: {0}")]
    Cwd(#[from] std::io::Error),
}

/// Where tackle keeps its state and which configuration files apply.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root for installed packages, registry cache and shims.
    pub root_dir: PathBuf,
    /// Configuration files in priority order.
    pub config_files: Vec<PathBuf>,
    /// Platform packages are resolved for.
    pub runtime: Runtime,
    /// Token for GitHub API requests.
    pub github_token: Option<String>,
}

impl Settings {
    /// Build settings from the process environment and working directory.
    pub fn from_env() -> Result<Self, SettingsError> {
        let cwd = std::env::current_dir()?;
        let root_dir = paths::try_root_dir().ok_or(SettingsError::NoRootDir)?;
        Ok(Self::resolve(&cwd, root_dir, |key| std::env::var(key).ok()))
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn resolve(
        cwd: &Path,
        root_dir: PathBuf,
        var: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let var = |key: &str| var(key).filter(|v| !v.is_empty());

        let mut config_files = Vec::new();
        if let Some(explicit) = var("TACKLE_CONFIG") {
            config_files.push(cwd.join(explicit));
        }
        for path in paths::find_config_files(cwd) {
            if !config_files.contains(&path) {
                config_files.push(path);
            }
        }
        if let Some(globals) = var("TACKLE_GLOBAL_CONFIG") {
            for path in globals.split(':').filter(|p| !p.is_empty()) {
                let path = PathBuf::from(path);
                if path.is_file() && !config_files.contains(&path) {
                    config_files.push(path);
                }
            }
        }

        let host = Runtime::host();
        let runtime = Runtime::new(
            var("TACKLE_OS").unwrap_or(host.os),
            var("TACKLE_ARCH").unwrap_or(host.arch),
        );

        Self {
            root_dir,
            config_files,
            runtime,
            github_token: var("GITHUB_TOKEN").or_else(|| var("GH_TOKEN")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_priority_and_overrides() {
        let dir = tempdir().unwrap();
        let project = dir.path().join("project");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("tackle.yaml"), "").unwrap();
        fs::write(dir.path().join("explicit.yaml"), "").unwrap();
        let global = dir.path().join("global.yaml");
        fs::write(&global, "").unwrap();

        let env = HashMap::from([
            ("TACKLE_CONFIG", "../explicit.yaml".to_string()),
            (
                "TACKLE_GLOBAL_CONFIG",
                format!("{}:/does/not/exist.yaml", global.display()),
            ),
            ("TACKLE_OS", "windows".to_string()),
            ("TACKLE_ARCH", String::new()),
            ("GH_TOKEN", "secret".to_string()),
        ]);
        let settings = Settings::resolve(&project, dir.path().join("root"), |k| {
            env.get(k).cloned()
        });

        let files: Vec<_> = settings
            .config_files
            .iter()
            .filter(|p| p.starts_with(dir.path()))
            .cloned()
            .collect();
        assert_eq!(
            files,
            vec![
                project.join("../explicit.yaml"),
                project.join("tackle.yaml"),
                global
            ]
        );
        assert_eq!(settings.runtime.os, "windows");
        assert_eq!(settings.runtime.arch, Runtime::host().arch);
        assert_eq!(settings.github_token.as_deref(), Some("secret"));
    }
}
