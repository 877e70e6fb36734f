//! Installation of a revision through a git clone and `make install`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use plotdiff_core::{EnvironmentHandle, InstallError, Installer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::command::run_streaming;
use crate::git::prepare_clone;

/// Build command run inside the clone, and where it puts the executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Virtual environment directory, relative to the clone.
    pub venv_dir: String,
    /// Name of the plotting executable inside `<venv_dir>/bin`.
    pub executable_name: String,
}

impl Default for InstallCommand {
    fn default() -> Self {
        Self::make("pyflexplot")
    }
}

impl InstallCommand {
    /// `make install CHAIN=1 VENV_DIR=venv` producing `venv/bin/<executable>`.
    pub fn make(executable_name: &str) -> Self {
        let venv_dir = "venv".to_string();
        Self {
            program: "make".to_string(),
            args: vec![
                "install".to_string(),
                "CHAIN=1".to_string(),
                format!("VENV_DIR={venv_dir}"),
            ],
            venv_dir,
            executable_name: executable_name.to_string(),
        }
    }

    pub fn executable_in(&self, install_dir: &Path) -> PathBuf {
        install_dir
            .join(&self.venv_dir)
            .join("bin")
            .join(&self.executable_name)
    }
}

/// [`Installer`] cloning the repository into the install directory and
/// building it there.
#[derive(Debug, Clone, Default)]
pub struct GitMakeInstaller {
    command: InstallCommand,
}

impl GitMakeInstaller {
    pub fn new(command: InstallCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Installer for GitMakeInstaller {
    async fn ensure(
        &self,
        repository: &str,
        revision: &str,
        install_dir: &Path,
        reuse: bool,
    ) -> Result<EnvironmentHandle, InstallError> {
        prepare_clone(repository, revision, install_dir, reuse)
            .await
            .map_err(|e| InstallError::Checkout {
                repository: repository.to_string(),
                revision: revision.to_string(),
                message: e.to_string(),
            })?;

        let executable = self.command.executable_in(install_dir);
        let handle = EnvironmentHandle {
            revision: revision.to_string(),
            root: install_dir.to_path_buf(),
            executable: executable.clone(),
        };
        if reuse && executable.exists() {
            info!(executable = %executable.display(), "reusing existing executable");
            return Ok(handle);
        }

        info!(revision = %revision, dir = %install_dir.display(), "building");
        run_streaming(
            &self.command.program,
            &self.command.args,
            Some(install_dir),
            |line| debug!(target: "plotdiff::build", "{line}"),
        )
        .await
        .map_err(|e| InstallError::Build {
            revision: revision.to_string(),
            install_dir: install_dir.to_path_buf(),
            message: e.to_string(),
        })?;

        if !executable.exists() {
            return Err(InstallError::MissingExecutable {
                revision: revision.to_string(),
                path: executable,
            });
        }
        Ok(handle)
    }
}
