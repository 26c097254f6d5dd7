//! Command implementations.
//!
//! Each command returns the process exit code to report.

pub mod exec;
pub mod install;
pub mod which;

use std::sync::Arc;

use tackle_core::exec::{EXIT_FAILURE, EXIT_NOT_FOUND, SystemRunner};
use tackle_core::install::DownloadInstaller;
use tackle_core::io::{GitHubReleaseDownloader, HttpDownload, HttpDownloader};
use tackle_core::registry::RegistryLoader;
use tackle_core::which::{Resolver, WhichError};
use tackle_core::{ExecutionController, Settings};

/// Shared state for the commands.
#[derive(Debug, Clone)]
pub struct Context {
    pub settings: Settings,
    pub resolver: Arc<Resolver>,
    pub installer: Arc<DownloadInstaller>,
}

impl Context {
    pub fn new(settings: Settings) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(tackle_core::USER_AGENT)
            .build()
            .unwrap_or_default();
        let http: Arc<dyn HttpDownload> = Arc::new(HttpDownloader::new(client.clone()));
        let release = Arc::new(GitHubReleaseDownloader::new(
            Arc::clone(&http),
            client,
            settings.github_token.clone(),
        ));

        let resolver = Arc::new(Resolver::new(
            settings.config_files.clone(),
            settings.root_dir.clone(),
            settings.runtime.clone(),
            RegistryLoader::new(settings.root_dir.clone(), Arc::clone(&http)),
        ));
        let installer = Arc::new(DownloadInstaller::new(
            settings.root_dir.clone(),
            settings.runtime.clone(),
            http,
            release,
        ));

        Self {
            settings,
            resolver,
            installer,
        }
    }

    pub fn controller(&self) -> ExecutionController {
        ExecutionController::new(
            self.resolver.clone(),
            self.installer.clone(),
            Arc::new(SystemRunner),
        )
    }
}

/// Exit code for a resolution failure.
pub fn which_exit_code(err: &WhichError) -> i32 {
    match err {
        WhichError::ExecutableNotFound(_) => EXIT_NOT_FOUND,
        _ => EXIT_FAILURE,
    }
}
