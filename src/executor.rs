use crate::model::ArchiveFormat;
use crate::traits::{Toolchain, ToolchainError};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Runs a package's `setup.py` through a Python interpreter.
///
/// Each invocation is a blocking child process with its working directory set
/// explicitly; stdout and stderr are inherited.
#[derive(Debug, Clone)]
pub struct SetupPyToolchain {
    python: PathBuf,
    script: String,
    timeout: Option<Duration>,
}

impl SetupPyToolchain {
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            script: "setup.py".to_string(),
            timeout: None,
        }
    }

    /// Build script name relative to the working directory (default `setup.py`).
    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = script.into();
        self
    }

    /// Kills any invocation still running after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn sdist_args(&self, formats: &[ArchiveFormat]) -> Vec<OsString> {
        vec![
            self.script.clone().into(),
            "sdist".into(),
            format!("--formats={}", ArchiveFormat::join(formats)).into(),
            "--force-manifest".into(),
        ]
    }

    fn install_args(&self, prefix: &Path) -> Vec<OsString> {
        let mut prefix_arg = OsString::from("--prefix=");
        prefix_arg.push(prefix.as_os_str());
        vec![self.script.clone().into(), "install".into(), prefix_arg]
    }

    fn render(&self, args: &[OsString]) -> String {
        let mut line = self.python.display().to_string();
        for arg in args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    async fn run(&self, cwd: &Path, args: Vec<OsString>) -> Result<(), ToolchainError> {
        let command = self.render(&args);
        debug!(cwd = %cwd.display(), %command, "Spawning toolchain");

        let mut child = Command::new(&self.python)
            .args(&args)
            .current_dir(cwd)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolchainError::Spawn {
                command: command.clone(),
                source,
            })?;

        let status = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait())
                .await
                .map_err(|_| ToolchainError::TimedOut {
                    command: command.clone(),
                    timeout: limit,
                })?,
            None => child.wait().await,
        }
        .map_err(|source| ToolchainError::Spawn {
            command: command.clone(),
            source,
        })?;

        if !status.success() {
            return Err(ToolchainError::Failed {
                command,
                status: status.code(),
            });
        }
        Ok(())
    }
}

impl Default for SetupPyToolchain {
    fn default() -> Self {
        Self::new("python")
    }
}

#[async_trait]
impl Toolchain for SetupPyToolchain {
    #[instrument(skip(self, pkg_dir), fields(pkg_dir = %pkg_dir.display()))]
    async fn build(&self, pkg_dir: &Path, formats: &[ArchiveFormat]) -> Result<(), ToolchainError> {
        info!("Building source distribution");
        self.run(pkg_dir, self.sdist_args(formats)).await
    }

    #[instrument(skip(self, src_dir, prefix), fields(src_dir = %src_dir.display(), prefix = %prefix.display()))]
    async fn install(&self, src_dir: &Path, prefix: &Path) -> Result<(), ToolchainError> {
        info!("Installing unpacked package");
        self.run(src_dir, self.install_args(prefix)).await
    }
}
