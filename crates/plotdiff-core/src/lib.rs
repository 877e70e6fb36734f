//! plotdiff core library
//!
//! Resolves comparison jobs, decides what may be reused, compares rendered
//! plots of two revisions and summarizes the differences. The external
//! plotting program is reached only through the [`Installer`] and
//! [`Renderer`] traits.

pub mod aggregate;
pub mod compare;
pub mod domain;
pub mod error;
pub mod fakes;
pub mod install;
pub mod obs;
pub mod orchestrator;
pub mod render;
pub mod report;
pub mod resolve;
pub mod run_state;
pub mod telemetry;

pub use aggregate::{aggregate, DiffSummary};
pub use compare::{compare, Comparison, DiffMagnitude, DiffOutcome, ImageDiff, StructuralMismatch};
pub use domain::{
    slug, ComparisonJob, EnvironmentHandle, InstallKey, JobOverride, JobOverrides, PlotEntry, PlotSet,
    ReuseFlags, RevisionSpec, Side, MANIFEST_FILE,
};
pub use error::{
    AggregationError, CompareError, ConfigProblem, ConfigurationError, Dimension, InstallError,
    JobError, JobStage, RenderError,
};
pub use install::{InstallState, Installer};
pub use orchestrator::{Orchestrator, RevisionsConfig};
pub use render::{RenderRequest, Renderer};
pub use report::{
    render_report_md, write_report_json, write_report_md, JobOutcome, JobReport, RevisionPair,
    RunReport,
};
pub use resolve::{derive_work_dir, resolve_jobs, JobsConfig};
pub use run_state::RunState;
pub use telemetry::init_tracing;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
