//! Structured lifecycle events for comparison runs.
//!
//! Every helper logs one event with an `event` field naming it, so JSON logs
//! can be filtered by lifecycle step. Job events are emitted inside the span
//! returned by [`job_span`] and therefore carry the job index and label.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::domain::Side;
use crate::error::JobStage;

/// Span covering one job; attach it with `tracing::Instrument`.
pub fn job_span(index: usize, label: &str) -> tracing::Span {
    tracing::info_span!("plotdiff.job", job = index, preset = %label)
}

pub fn emit_run_started(run_id: &str, jobs: usize, old_revision: &str, new_revision: &str) {
    info!(
        event = "run.started",
        run_id = %run_id,
        jobs = jobs,
        old = %old_revision,
        new = %new_revision,
    );
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, failed_jobs: usize, exit_code: i32) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        failed_jobs = failed_jobs,
        exit_code = exit_code,
    );
}

pub fn emit_job_started(work_dir: &Path) {
    info!(event = "job.started", work_dir = %work_dir.display());
}

/// `outcome` is one of `no_differences`, `differences`, `failed`.
pub fn emit_job_finished(outcome: &str, differing: usize, mismatches: usize, duration_ms: u64) {
    info!(
        event = "job.finished",
        outcome = outcome,
        differing = differing,
        mismatches = mismatches,
        duration_ms = duration_ms,
    );
}

pub fn emit_job_failed(stage: JobStage, error: &dyn std::fmt::Display) {
    warn!(event = "job.failed", stage = %stage, error = %error);
}

pub fn emit_install_started(side: Side, revision: &str, reuse: bool) {
    info!(event = "install.started", side = %side, revision = %revision, reuse = reuse);
}

pub fn emit_install_cached(side: Side, revision: &str) {
    debug!(event = "install.cached", side = %side, revision = %revision);
}

pub fn emit_install_finished(revision: &str, executable: &Path) {
    info!(
        event = "install.finished",
        revision = %revision,
        executable = %executable.display(),
    );
}

pub fn emit_install_failed(revision: &str, error: &dyn std::fmt::Display) {
    warn!(event = "install.failed", revision = %revision, error = %error);
}

pub fn emit_plots_reused(side: Side, count: usize, dir: &Path) {
    info!(event = "plots.reused", side = %side, count = count, dir = %dir.display());
}

pub fn emit_plots_rendered(side: Side, count: usize, duration_ms: u64) {
    info!(
        event = "plots.rendered",
        side = %side,
        count = count,
        duration_ms = duration_ms,
    );
}

pub fn emit_image_compared(name: &str, identical: bool, fraction: f64) {
    debug!(
        event = "image.compared",
        name = %name,
        identical = identical,
        fraction = fraction,
    );
}

pub fn emit_structural_mismatch(name: &str, present_in: Side) {
    warn!(event = "image.unpaired", name = %name, present_in = %present_in);
}

pub fn emit_aggregated(count: usize, composite: &Path, animation: &Path) {
    info!(
        event = "diff.aggregated",
        count = count,
        composite = %composite.display(),
        animation = %animation.display(),
    );
}
