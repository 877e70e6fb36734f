//! Revision specifications and the layered reuse flags that decide whether
//! installs and plots may be reused.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{slug, Side};
use crate::error::ConfigProblem;

/// Reuse flags of one kind (installs or plots), one optional value per layer.
///
/// `Some(true)` means reuse, `Some(false)` forces redo, `None` defers to the
/// next less specific layer. With no value anywhere the answer is "redo".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReuseFlags {
    pub undirected: Option<bool>,
    pub old: Option<bool>,
    pub new: Option<bool>,
}

impl ReuseFlags {
    pub fn side(&self, side: Side) -> Option<bool> {
        match side {
            Side::Old => self.old,
            Side::New => self.new,
        }
    }

    /// Effective policy for `side`: the side flag wins over the undirected one.
    pub fn resolve(&self, side: Side) -> bool {
        self.side(side).or(self.undirected).unwrap_or(false)
    }

    /// Build one layer from a reuse switch and its negation.
    ///
    /// `names` are the user-facing flag names, used when both are set.
    pub fn layer(
        reuse: bool,
        redo: bool,
        names: (&str, &str),
    ) -> std::result::Result<Option<bool>, ConfigProblem> {
        match (reuse, redo) {
            (true, true) => Err(ConfigProblem::ConflictingFlags {
                reuse: names.0.to_string(),
                redo: names.1.to_string(),
            }),
            (true, false) => Ok(Some(true)),
            (false, true) => Ok(Some(false)),
            (false, false) => Ok(None),
        }
    }
}

/// Per-job plot reuse override, the most specific layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOverride {
    /// Job index in resolution order.
    pub job: usize,
    /// `None` applies to both sides.
    pub side: Option<Side>,
    pub reuse: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOverrides {
    pub entries: Vec<JobOverride>,
}

impl JobOverrides {
    pub fn get(&self, job: usize, side: Side) -> Option<bool> {
        let matching = || self.entries.iter().filter(move |o| o.job == job);
        matching()
            .filter(|o| o.side == Some(side))
            .map(|o| o.reuse)
            .last()
            .or_else(|| matching().filter(|o| o.side.is_none()).map(|o| o.reuse).last())
    }
}

/// One side of the comparison with its policies already resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionSpec {
    pub side: Side,
    /// Repository locator (URL or local path).
    pub repository: String,
    /// Anything git can check out: tag, branch or commit.
    pub revision: String,
    /// `<install_root>/<revision-derived-name>`.
    pub install_dir: PathBuf,
    pub reuse_install: bool,
    pub reuse_plots: bool,
}

impl RevisionSpec {
    pub fn new(
        side: Side,
        repository: impl Into<String>,
        revision: impl Into<String>,
        install_root: impl Into<PathBuf>,
        install_flags: &ReuseFlags,
        plot_flags: &ReuseFlags,
    ) -> Self {
        let revision = revision.into();
        let install_dir = install_root.into().join(slug(&revision));
        Self {
            side,
            repository: repository.into(),
            revision,
            install_dir,
            reuse_install: install_flags.resolve(side),
            reuse_plots: plot_flags.resolve(side),
        }
    }

    pub fn install_key(&self) -> InstallKey {
        InstallKey {
            repository: self.repository.clone(),
            revision: self.revision.clone(),
            install_dir: self.install_dir.clone(),
        }
    }
}

/// Identity of one installation; installs are amortized per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstallKey {
    pub repository: String,
    pub revision: String,
    pub install_dir: PathBuf,
}

/// Handle to an installed revision of the plotting program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentHandle {
    pub revision: String,
    /// Install directory.
    pub root: PathBuf,
    /// Plotting executable inside the environment.
    pub executable: PathBuf,
}
