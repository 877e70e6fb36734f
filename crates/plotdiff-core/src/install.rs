//! Installation of revisions, amortized across the jobs of a run.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{EnvironmentHandle, InstallKey, RevisionSpec};
use crate::error::InstallError;
use crate::obs;

/// Checks out and builds one revision of the plotting program.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Make `revision` of `repository` available in `install_dir`.
    ///
    /// With `reuse` set an existing installation at that path may be used
    /// as is; otherwise the installer must start from scratch.
    async fn ensure(
        &self,
        repository: &str,
        revision: &str,
        install_dir: &Path,
        reuse: bool,
    ) -> Result<EnvironmentHandle, InstallError>;
}

/// Run-scoped install cache.
///
/// The first request for an [`InstallKey`] goes to the [`Installer`]; its
/// outcome, success or failure, is recorded and returned for every later
/// request with the same key. Failed installs are never retried.
pub struct InstallState {
    installer: Arc<dyn Installer>,
    records: HashMap<InstallKey, Result<EnvironmentHandle, InstallError>>,
    invocations: usize,
}

impl InstallState {
    pub fn new(installer: Arc<dyn Installer>) -> Self {
        Self {
            installer,
            records: HashMap::new(),
            invocations: 0,
        }
    }

    /// Installed environment for `spec`, installing it on first use.
    pub async fn ensure_installed(
        &mut self,
        spec: &RevisionSpec,
    ) -> Result<EnvironmentHandle, InstallError> {
        let key = spec.install_key();
        if let Some(record) = self.records.get(&key) {
            obs::emit_install_cached(spec.side, &spec.revision);
            return record.clone();
        }

        obs::emit_install_started(spec.side, &spec.revision, spec.reuse_install);
        let outcome = self
            .installer
            .ensure(
                &spec.repository,
                &spec.revision,
                &spec.install_dir,
                spec.reuse_install,
            )
            .await;
        self.invocations += 1;

        match &outcome {
            Ok(handle) => obs::emit_install_finished(&spec.revision, &handle.executable),
            Err(e) => obs::emit_install_failed(&spec.revision, e),
        }
        self.records.insert(key, outcome.clone());
        outcome
    }

    /// Recorded outcome for `spec`, without installing.
    pub fn cached(&self, spec: &RevisionSpec) -> Option<&Result<EnvironmentHandle, InstallError>> {
        self.records.get(&spec.install_key())
    }

    /// Number of times the installer has been invoked in this run.
    pub fn install_count(&self) -> usize {
        self.invocations
    }
}
