//! Comparison jobs and revision sides.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::slug;

/// One of the two revisions under comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Old,
    New,
}

impl Side {
    /// Both sides, old first.
    pub const BOTH: [Side; 2] = [Side::Old, Side::New];

    pub fn name(&self) -> &'static str {
        match self {
            Side::Old => "old",
            Side::New => "new",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fully resolved unit of work: which presets and input files each revision
/// plots, and where the outputs of this job live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonJob {
    /// Position in resolution order.
    pub index: usize,

    pub preset_old: String,
    pub preset_new: String,

    /// `None` means the preset's built-in input file.
    pub infile_old: Option<PathBuf>,
    pub infile_new: Option<PathBuf>,

    /// Directory holding `old/`, `new/` and the diff directory of this job.
    pub work_dir: PathBuf,

    /// Whether `work_dir` was given by the user rather than derived.
    pub work_dir_explicit: bool,
}

impl ComparisonJob {
    pub fn preset(&self, side: Side) -> &str {
        match side {
            Side::Old => &self.preset_old,
            Side::New => &self.preset_new,
        }
    }

    pub fn infile(&self, side: Side) -> Option<&Path> {
        match side {
            Side::Old => self.infile_old.as_deref(),
            Side::New => self.infile_new.as_deref(),
        }
    }

    /// Output directory of the plots rendered by `side`.
    pub fn side_dir(&self, side: Side) -> PathBuf {
        self.work_dir.join(side.name())
    }

    /// Directory receiving per-image diffs and aggregate artifacts.
    pub fn diff_dir(&self, old_revision: &str, new_revision: &str) -> PathBuf {
        self.work_dir
            .join(format!("{}_vs_{}", slug(old_revision), slug(new_revision)))
    }

    /// Short human-readable label, e.g. `opr/all_png` or `a -> b`.
    pub fn label(&self) -> String {
        if self.preset_old == self.preset_new {
            self.preset_old.clone()
        } else {
            format!("{} -> {}", self.preset_old, self.preset_new)
        }
    }
}
