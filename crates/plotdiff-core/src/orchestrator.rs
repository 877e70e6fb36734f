//! Sequencing of a comparison run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use crate::aggregate::{aggregate, DiffSummary};
use crate::compare::{compare, Comparison};
use crate::domain::{ComparisonJob, EnvironmentHandle, JobOverrides, PlotSet, ReuseFlags, RevisionSpec, Side};
use crate::error::{CompareError, ConfigurationError, JobError, RenderError};
use crate::install::{InstallState, Installer};
use crate::obs;
use crate::render::{RenderRequest, Renderer};
use crate::report::{JobOutcome, JobReport, RevisionPair, RunReport};
use crate::resolve::{resolve_jobs, JobsConfig};
use crate::run_state::RunState;

/// Revisions under comparison and the reuse flags applying to them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionsConfig {
    pub repository: String,
    pub old_revision: String,
    pub new_revision: String,
    /// Parent of the per-revision install directories.
    pub install_root: PathBuf,
    pub install_flags: ReuseFlags,
    pub plot_flags: ReuseFlags,
    pub job_overrides: JobOverrides,
}

impl RevisionsConfig {
    /// Resolved specs for the old and new side.
    pub fn specs(&self) -> (RevisionSpec, RevisionSpec) {
        let spec = |side, revision: &str| {
            RevisionSpec::new(
                side,
                self.repository.as_str(),
                revision,
                self.install_root.as_path(),
                &self.install_flags,
                &self.plot_flags,
            )
        };
        (
            spec(Side::Old, &self.old_revision),
            spec(Side::New, &self.new_revision),
        )
    }
}

/// Drives jobs one at a time through install, render, compare and
/// aggregate.
pub struct Orchestrator {
    installer: Arc<dyn Installer>,
    renderer: Arc<dyn Renderer>,
}

/// Everything one run shares across its jobs.
struct RunContext {
    old: RevisionSpec,
    new: RevisionSpec,
    run_state: RunState,
    installs: InstallState,
}

impl Orchestrator {
    pub fn new(installer: Arc<dyn Installer>, renderer: Arc<dyn Renderer>) -> Self {
        Self { installer, renderer }
    }

    /// Execute a whole run.
    ///
    /// Only configuration problems abort the run, and they do so before any
    /// installer or renderer call. Every other failure is recorded in the
    /// report of the job it hit and the run moves on to the next job.
    pub async fn run(
        &self,
        jobs: &JobsConfig,
        revisions: &RevisionsConfig,
    ) -> Result<RunReport, ConfigurationError> {
        let jobs = resolve_jobs(jobs)?;
        let (old, new) = revisions.specs();
        let run_state = RunState::new(&old, &new).with_overrides(revisions.job_overrides.clone());
        let mut ctx = RunContext {
            old,
            new,
            run_state,
            installs: InstallState::new(self.installer.clone()),
        };

        let run_id = Uuid::new_v4();
        let start = Instant::now();
        obs::emit_run_started(
            &run_id.to_string(),
            jobs.len(),
            &ctx.old.revision,
            &ctx.new.revision,
        );

        let mut reports = Vec::with_capacity(jobs.len());
        for job in jobs {
            let span = obs::job_span(job.index, &job.label());
            let report = self.run_job(job, &mut ctx).instrument(span).await;
            reports.push(report);
        }

        let report = RunReport {
            run_id,
            generated_at: Utc::now(),
            revisions: RevisionPair {
                repository: revisions.repository.clone(),
                old: ctx.old.revision.clone(),
                new: ctx.new.revision.clone(),
            },
            installs: ctx.installs.install_count(),
            jobs: reports,
        };
        obs::emit_run_finished(
            &run_id.to_string(),
            start.elapsed().as_millis() as u64,
            report.failed_jobs(),
            report.exit_code(),
        );
        Ok(report)
    }

    async fn run_job(&self, job: ComparisonJob, ctx: &mut RunContext) -> JobReport {
        let start = Instant::now();
        obs::emit_job_started(&job.work_dir);

        let report = match self.process(&job, ctx).await {
            Ok((comparison, summary)) => {
                let compared = comparison.diffs.len();
                let identical = comparison.identical_count();
                JobReport {
                    job,
                    outcome: match summary {
                        Some(summary) => JobOutcome::Differences(summary),
                        None => JobOutcome::NoDifferences,
                    },
                    mismatches: comparison.mismatches,
                    compared,
                    identical,
                }
            }
            Err(e) => {
                obs::emit_job_failed(e.stage(), &e);
                JobReport::failed(job, e.stage(), &e)
            }
        };

        obs::emit_job_finished(
            report.outcome.label(),
            report.differing(),
            report.mismatches.len(),
            start.elapsed().as_millis() as u64,
        );
        report
    }

    async fn process(
        &self,
        job: &ComparisonJob,
        ctx: &mut RunContext,
    ) -> Result<(Comparison, Option<DiffSummary>), JobError> {
        let old_env = ctx
            .installs
            .ensure_installed(&ctx.old)
            .await
            .map_err(|source| JobError::Install {
                side: Side::Old,
                source,
            })?;
        let new_env = ctx
            .installs
            .ensure_installed(&ctx.new)
            .await
            .map_err(|source| JobError::Install {
                side: Side::New,
                source,
            })?;

        let old_plots = self.plots(job, Side::Old, &old_env, &ctx.run_state).await?;
        let new_plots = self.plots(job, Side::New, &new_env, &ctx.run_state).await?;

        let diff_dir = job.diff_dir(&ctx.old.revision, &ctx.new.revision);
        clear_dir(&diff_dir).map_err(CompareError::Io)?;
        let comparison = compare(&old_plots, &new_plots, &diff_dir)?;
        let summary = aggregate(&comparison.diffs, &diff_dir)?;
        Ok((comparison, summary))
    }

    /// Reuse the recorded plots of `side` or render them anew.
    async fn plots(
        &self,
        job: &ComparisonJob,
        side: Side,
        env: &EnvironmentHandle,
        run_state: &RunState,
    ) -> Result<PlotSet, JobError> {
        if let Some(existing) = run_state.load_existing(job, side) {
            obs::emit_plots_reused(side, existing.len(), &run_state.output_dir(job, side));
            return Ok(existing);
        }

        let render_err = |source| JobError::Render { side, source };
        let start = Instant::now();
        let output_dir = run_state
            .prepare_output(job, side)
            .map_err(|e| render_err(RenderError::Io(e)))?;
        let request = RenderRequest::for_job(job, side, output_dir);
        let plots = self
            .renderer
            .render(env, &request)
            .await
            .map_err(render_err)?;
        run_state
            .record(job, side, &plots)
            .map_err(|e| render_err(RenderError::Io(e)))?;

        obs::emit_plots_rendered(side, plots.len(), start.elapsed().as_millis() as u64);
        Ok(plots)
    }
}

/// Remove artifacts of an earlier run so stale diffs never linger.
fn clear_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
