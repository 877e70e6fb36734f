//! Error taxonomy for comparison runs.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::Side;

/// Resolver dimension a configuration problem refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Preset,
    Infile,
    WorkDir,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dimension::Preset => "preset",
            Dimension::Infile => "infile",
            Dimension::WorkDir => "work-dir",
        })
    }
}

/// A single reason why the command line cannot be turned into jobs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigProblem {
    #[error("no presets given; pass --preset or --presets-old-new")]
    MissingPresets,

    #[error("--{single} and --{pair} are mutually exclusive")]
    MutuallyExclusive {
        dimension: Dimension,
        single: &'static str,
        pair: &'static str,
    },

    #[error("{dimension} list has {len} entries, but {expected} jobs were resolved (must be 0, 1 or {expected})")]
    Cardinality {
        dimension: Dimension,
        len: usize,
        expected: usize,
    },

    #[error("jobs {first} and {second} derive the same work dir {path:?}")]
    DuplicateWorkDir {
        path: PathBuf,
        first: usize,
        second: usize,
    },

    #[error("--{reuse} and --{redo} contradict each other")]
    ConflictingFlags { reuse: String, redo: String },
}

/// Invalid run configuration, detected before any external work starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid configuration: {}", join_problems(.problems))]
pub struct ConfigurationError {
    pub problems: Vec<ConfigProblem>,
}

impl ConfigurationError {
    pub fn new(problems: Vec<ConfigProblem>) -> Self {
        Self { problems }
    }

    /// `Err` carrying every problem, or `Ok` if there are none.
    pub fn check(problems: Vec<ConfigProblem>) -> std::result::Result<(), Self> {
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Self::new(problems))
        }
    }
}

impl From<ConfigProblem> for ConfigurationError {
    fn from(problem: ConfigProblem) -> Self {
        Self::new(vec![problem])
    }
}

fn join_problems(problems: &[ConfigProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Checkout or build of a revision failed. Fatal for every dependent job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstallError {
    #[error("checkout of {revision} from {repository} failed: {message}")]
    Checkout {
        repository: String,
        revision: String,
        message: String,
    },

    #[error("build of {revision} in {install_dir:?} failed: {message}")]
    Build {
        revision: String,
        install_dir: PathBuf,
        message: String,
    },

    #[error("installing {revision} produced no executable at {path:?}")]
    MissingExecutable { revision: String, path: PathBuf },
}

/// Rendering plots for one job and side failed.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("renderer failed for preset {preset}: {message}")]
    Command { preset: String, message: String },

    #[error("dry run for preset {preset} announced no plots")]
    NoPlotsExpected { preset: String },

    #[error("renderer produced unexpected plot {name} for preset {preset}")]
    UnexpectedPlot { preset: String, name: String },

    #[error("rendered plot {path:?} is missing")]
    MissingOutput { path: PathBuf },

    #[error("preset {preset} did not produce announced plots: {}", .missing.join(", "))]
    IncompleteRender { preset: String, missing: Vec<String> },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Comparing two plot sets failed (as opposed to finding differences).
#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("cannot read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode {path:?}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("cannot write diff image {path:?}: {message}")]
    Encode { path: PathBuf, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writing the composite image or the animation failed.
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("cannot decode diff artifact {path:?}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("cannot encode {path:?}: {message}")]
    Encode { path: PathBuf, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stage of a job at which it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Install,
    Render,
    Compare,
    Aggregate,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStage::Install => "install",
            JobStage::Render => "render",
            JobStage::Compare => "compare",
            JobStage::Aggregate => "aggregate",
        })
    }
}

/// Failure scoped to a single job.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("{side} revision is not installed: {source}")]
    Install {
        side: Side,
        #[source]
        source: InstallError,
    },

    #[error("rendering {side} plots failed: {source}")]
    Render {
        side: Side,
        #[source]
        source: RenderError,
    },

    #[error("comparison failed: {0}")]
    Compare(#[from] CompareError),

    #[error("aggregation failed: {0}")]
    Aggregate(#[from] AggregationError),
}

impl JobError {
    pub fn stage(&self) -> JobStage {
        match self {
            JobError::Install { .. } => JobStage::Install,
            JobError::Render { .. } => JobStage::Render,
            JobError::Compare(_) => JobStage::Compare,
            JobError::Aggregate(_) => JobStage::Aggregate,
        }
    }
}
