//! Plot reuse decisions for the jobs of one run.

use std::fs;
use std::io;
use std::path::PathBuf;

use crate::domain::plot_set::{read_complete, write_manifest};
use crate::domain::{ComparisonJob, JobOverrides, PlotSet, RevisionSpec, Side};

/// Decides per job and side whether existing plots may be reused.
///
/// Precedence, most specific first: per-job override, per-side flag,
/// undirected flag. The side and undirected layers are already folded into
/// each [`RevisionSpec::reuse_plots`].
#[derive(Debug, Clone)]
pub struct RunState {
    reuse_old: bool,
    reuse_new: bool,
    overrides: JobOverrides,
}

impl RunState {
    pub fn new(old: &RevisionSpec, new: &RevisionSpec) -> Self {
        Self {
            reuse_old: old.reuse_plots,
            reuse_new: new.reuse_plots,
            overrides: JobOverrides::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: JobOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Effective reuse policy for one job and side.
    pub fn reuse_policy(&self, job: &ComparisonJob, side: Side) -> bool {
        let side_policy = match side {
            Side::Old => self.reuse_old,
            Side::New => self.reuse_new,
        };
        self.overrides.get(job.index, side).unwrap_or(side_policy)
    }

    pub fn output_dir(&self, job: &ComparisonJob, side: Side) -> PathBuf {
        job.side_dir(side)
    }

    /// `false` only when reuse is allowed and a complete plot set exists.
    pub fn should_regenerate(&self, job: &ComparisonJob, side: Side) -> bool {
        self.load_existing(job, side).is_none()
    }

    /// Previously recorded plots, if reuse is allowed and they are complete.
    pub fn load_existing(&self, job: &ComparisonJob, side: Side) -> Option<PlotSet> {
        if !self.reuse_policy(job, side) {
            return None;
        }
        read_complete(&self.output_dir(job, side))
    }

    /// Empty the output directory ahead of a render.
    pub fn prepare_output(&self, job: &ComparisonJob, side: Side) -> io::Result<PathBuf> {
        let dir = self.output_dir(job, side);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Mark a freshly rendered set as complete.
    pub fn record(&self, job: &ComparisonJob, side: Side, plots: &PlotSet) -> io::Result<()> {
        write_manifest(&self.output_dir(job, side), plots)
    }
}
