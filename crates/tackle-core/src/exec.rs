//! The execution pipeline: resolve, install if needed, wait, spawn.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::install::{InstallError, PackageInstaller, verify_and_install};
use crate::wait::{self, Cancelled, RETRY_INTERVAL};
use crate::which::{Which, WhichError};

/// Process start attempts before giving up.
pub const MAX_SPAWN_ATTEMPTS: usize = 10;

/// Exit code for a command that could not be found.
pub const EXIT_NOT_FOUND: i32 = 127;

/// Exit code for every other pipeline failure.
pub const EXIT_FAILURE: i32 = 125;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error(transparent)]
    Which(#[from] WhichError),

    #[error("Failed to install {package}: {source}")]
    Install {
        package: String,
        #[source]
        source: InstallError,
    },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl ExecError {
    /// Process exit code the CLI reports for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Which(WhichError::ExecutableNotFound(_)) => EXIT_NOT_FOUND,
            _ => EXIT_FAILURE,
        }
    }
}

/// Result of a pipeline run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The child exited 0, or the process never started within the attempt
    /// budget.
    Success,
    /// The child exited with a nonzero code.
    ChildExit(i32),
}

impl ExecOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::ChildExit(code) => code,
        }
    }
}

/// Result of one attempt to run a process.
#[derive(Debug)]
pub enum RunOutcome {
    /// The process could not be started.
    NotStarted(std::io::Error),
    /// The process ran and exited with this code.
    Exited(i32),
}

/// Starts a process and waits for it.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, exe_path: &Path, args: &[String], cancel: &CancellationToken) -> RunOutcome;
}

/// Runs processes with inherited stdio and no timeout.
///
/// Cancellation does not kill a running child; the terminal delivers
/// signals to the whole process group.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, exe_path: &Path, args: &[String], _cancel: &CancellationToken) -> RunOutcome {
        let child = tokio::process::Command::new(exe_path)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn();
        let mut child = match child {
            Ok(child) => child,
            Err(e) => return RunOutcome::NotStarted(e),
        };
        match child.wait().await {
            Ok(status) => RunOutcome::Exited(exit_code(status)),
            Err(e) => {
                warn!(error = %e, exe_path = %exe_path.display(), "Failed to wait for the process");
                RunOutcome::Exited(EXIT_FAILURE)
            }
        }
    }
}

/// Exit code of a finished child; a signal `n` maps to `128 + n`.
fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    EXIT_FAILURE
}

/// Orchestrates resolve, install, wait and spawn.
#[derive(Clone)]
pub struct ExecutionController {
    which: Arc<dyn Which>,
    installer: Arc<dyn PackageInstaller>,
    runner: Arc<dyn ProcessRunner>,
}

impl std::fmt::Debug for ExecutionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionController").finish_non_exhaustive()
    }
}

impl ExecutionController {
    pub fn new(
        which: Arc<dyn Which>,
        installer: Arc<dyn PackageInstaller>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            which,
            installer,
            runner,
        }
    }

    /// Run `exe_name` with `args`, installing its package first if needed.
    pub async fn exec(
        &self,
        exe_name: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<ExecOutcome, ExecError> {
        let which = self.which.which(exe_name).await?;

        if let Some(find) = &which.find {
            verify_and_install(self.installer.as_ref(), find, cancel)
                .await
                .map_err(|source| ExecError::Install {
                    package: find.package.to_string(),
                    source,
                })?;
            if !wait::wait_for_executable(&which.exe_path, cancel).await? {
                debug!(exe_path = %which.exe_path.display(), "Executable is not ready, trying anyway");
            }
        }

        self.spawn_with_retry(&which.exe_path, args, cancel).await
    }

    async fn spawn_with_retry(
        &self,
        exe_path: &Path,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<ExecOutcome, ExecError> {
        for retry_count in 0..MAX_SPAWN_ATTEMPTS {
            match self.runner.run(exe_path, args, cancel).await {
                RunOutcome::Exited(0) => return Ok(ExecOutcome::Success),
                RunOutcome::Exited(code) => {
                    debug!(exe_path = %exe_path.display(), exit_code = code, "Process exited");
                    return Ok(ExecOutcome::ChildExit(code));
                }
                RunOutcome::NotStarted(e) => {
                    if cancel.is_cancelled() {
                        return Err(Cancelled.into());
                    }
                    debug!(exe_path = %exe_path.display(), retry_count = retry_count + 1, error = %e, "Failed to start the process, retrying");
                    wait::sleep(cancel, RETRY_INTERVAL).await?;
                }
            }
        }
        warn!(exe_path = %exe_path.display(), attempts = MAX_SPAWN_ATTEMPTS, "The process never started");
        Ok(ExecOutcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::InstallParam;
    use crate::which::{FindResult, WhichResult};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tackle_schema::{Config, File, Package, PackageInfo, PackageRef};
    use tempfile::tempdir;

    struct FakeWhich {
        result: Mutex<Option<Result<WhichResult, WhichError>>>,
    }

    impl FakeWhich {
        fn new(result: Result<WhichResult, WhichError>) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(result)),
            })
        }
    }

    #[async_trait]
    impl Which for FakeWhich {
        async fn which(&self, _exe_name: &str) -> Result<WhichResult, WhichError> {
            self.result
                .lock()
                .unwrap()
                .take()
                .expect("which called once")
        }
    }

    #[derive(Default)]
    struct FakeInstaller {
        installs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PackageInstaller for FakeInstaller {
        async fn install_package(&self, param: InstallParam<'_>) -> Result<(), InstallError> {
            self.installs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(InstallError::ChecksumRequired {
                    package: param.package.to_string(),
                });
            }
            Ok(())
        }

        async fn wait_exe(&self, _: &Path, _: &CancellationToken) -> Result<(), InstallError> {
            Ok(())
        }
    }

    /// Fails to start `failures` times, then exits with `code`.
    struct FakeRunner {
        failures: usize,
        code: i32,
        attempts: AtomicUsize,
    }

    impl FakeRunner {
        fn new(failures: usize, code: i32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                code,
                attempts: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ProcessRunner for FakeRunner {
        async fn run(&self, _: &Path, _: &[String], _: &CancellationToken) -> RunOutcome {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                RunOutcome::NotStarted(std::io::Error::other("text file busy"))
            } else {
                RunOutcome::Exited(self.code)
            }
        }
    }

    fn system(path: &str) -> Result<WhichResult, WhichError> {
        Ok(WhichResult {
            find: None,
            exe_path: PathBuf::from(path),
        })
    }

    fn package(exe_path: PathBuf, config_dir: &Path) -> Result<WhichResult, WhichError> {
        Ok(WhichResult {
            exe_path: exe_path.clone(),
            find: Some(FindResult {
                config: Arc::new(Config::default()),
                config_file_path: config_dir.join("tackle.yaml"),
                package: Package::new(PackageRef::new("acme/tool", "v1"), PackageInfo::default()),
                file: File::default(),
                exe_path,
            }),
        })
    }

    fn controller(
        which: Arc<FakeWhich>,
        installer: Arc<FakeInstaller>,
        runner: Arc<FakeRunner>,
    ) -> ExecutionController {
        ExecutionController::new(which, installer, runner)
    }

    #[tokio::test]
    async fn test_spawn_retried_until_started() {
        let runner = FakeRunner::new(3, 0);
        let ctl = controller(FakeWhich::new(system("/bin/tool")), Arc::default(), runner.clone());

        let outcome = ctl.exec("tool", &[], &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, ExecOutcome::Success);
        assert_eq!(runner.attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_child_exit_code_is_propagated() {
        let runner = FakeRunner::new(0, 3);
        let ctl = controller(FakeWhich::new(system("/bin/tool")), Arc::default(), runner.clone());

        let outcome = ctl.exec("tool", &[], &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, ExecOutcome::ChildExit(3));
        assert_eq!(outcome.exit_code(), 3);
        assert_eq!(runner.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_spawn_budget_is_success() {
        let runner = FakeRunner::new(usize::MAX, 0);
        let ctl = controller(FakeWhich::new(system("/bin/tool")), Arc::default(), runner.clone());

        let outcome = ctl.exec("tool", &[], &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, ExecOutcome::Success);
        assert_eq!(runner.attempts.load(Ordering::SeqCst), MAX_SPAWN_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_install_then_spawn_even_if_never_ready() {
        let dir = tempdir().unwrap();
        let installer = Arc::new(FakeInstaller::default());
        let runner = FakeRunner::new(0, 0);
        let ctl = controller(
            FakeWhich::new(package(dir.path().join("never"), dir.path())),
            installer.clone(),
            runner.clone(),
        );

        let outcome = ctl.exec("tool", &[], &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, ExecOutcome::Success);
        assert_eq!(installer.installs.load(Ordering::SeqCst), 1);
        assert_eq!(runner.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_download_installer_missing_exe_still_spawns() {
        use crate::install::DownloadInstaller;
        use crate::io::{GitHubReleaseDownloader, HttpDownloader};
        use tackle_schema::Runtime;

        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        let runtime = Runtime::new("linux", "amd64");
        let info = PackageInfo {
            repo_owner: "acme".into(),
            repo_name: "tool".into(),
            asset: "tool".into(),
            ..PackageInfo::default()
        };
        let pkg = Package::new(PackageRef::new("acme/tool", "v1"), info);
        // Installed package directory without the executable.
        let pkg_path = pkg.pkg_path(&root, &runtime).unwrap();
        std::fs::create_dir_all(&pkg_path).unwrap();
        let exe_path = pkg_path.join("tool-missing");

        let http = Arc::new(HttpDownloader::default());
        let release = Arc::new(GitHubReleaseDownloader::new(
            http.clone(),
            reqwest::Client::new(),
            None,
        ));
        let installer = Arc::new(DownloadInstaller::new(root, runtime, http, release));
        let which = FakeWhich::new(Ok(WhichResult {
            exe_path: exe_path.clone(),
            find: Some(FindResult {
                config: Arc::new(Config::default()),
                config_file_path: dir.path().join("tackle.yaml"),
                package: pkg,
                file: File::default(),
                exe_path,
            }),
        }));
        let runner = FakeRunner::new(0, 0);
        let ctl = ExecutionController::new(which, installer, runner.clone());

        let outcome = ctl.exec("tool", &[], &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, ExecOutcome::Success);
        assert_eq!(runner.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_install_failure_aborts() {
        let dir = tempdir().unwrap();
        let installer = Arc::new(FakeInstaller {
            fail: true,
            ..FakeInstaller::default()
        });
        let runner = FakeRunner::new(0, 0);
        let ctl = controller(
            FakeWhich::new(package(dir.path().join("tool"), dir.path())),
            installer,
            runner.clone(),
        );

        let err = ctl.exec("tool", &[], &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ExecError::Install { ref package, .. } if package == "standard/acme/tool@v1"));
        assert_eq!(err.exit_code(), EXIT_FAILURE);
        assert_eq!(runner.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_not_found() {
        let ctl = controller(
            FakeWhich::new(Err(WhichError::ExecutableNotFound("tool".into()))),
            Arc::default(),
            FakeRunner::new(0, 0),
        );

        let err = ctl.exec("tool", &[], &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.exit_code(), EXIT_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cancelled_while_waiting() {
        let dir = tempdir().unwrap();
        let runner = FakeRunner::new(0, 0);
        let ctl = controller(
            FakeWhich::new(package(dir.path().join("never"), dir.path())),
            Arc::default(),
            runner.clone(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = ctl.exec("tool", &[], &cancel).await.unwrap_err();
        assert!(matches!(err, ExecError::Cancelled(_)));
        assert_eq!(runner.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_spawn_race_is_not_retried() {
        let runner = FakeRunner::new(usize::MAX, 0);
        let ctl = controller(FakeWhich::new(system("/bin/tool")), Arc::default(), runner.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = ctl.exec("tool", &[], &cancel).await.unwrap_err();
        assert!(matches!(err, ExecError::Cancelled(_)));
        assert_eq!(runner.attempts.load(Ordering::SeqCst), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_exit_code() {
        let runner = SystemRunner;
        let args = vec!["-c".to_string(), "exit 7".to_string()];
        let outcome = runner
            .run(Path::new("/bin/sh"), &args, &CancellationToken::new())
            .await;
        assert!(matches!(outcome, RunOutcome::Exited(7)));

        let outcome = runner
            .run(Path::new("/nonexistent/tool"), &[], &CancellationToken::new())
            .await;
        assert!(matches!(outcome, RunOutcome::NotStarted(_)));
    }
}
