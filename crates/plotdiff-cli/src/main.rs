//! plotdiff - visual regression comparison of two plotting program revisions
//!
//! Installs an old and a new revision of the plotting program, renders the
//! same presets with both and compares the resulting images.
//!
//! ## Exit codes
//!
//! - `0`: all jobs ran, plots may differ
//! - `1`: a job failed or the plot sets did not match
//! - `2`: invalid configuration

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use plotdiff_core::{
    render_report_md, write_report_json, write_report_md, ConfigProblem, ConfigurationError,
    JobOutcome, JobOverride, JobOverrides, JobsConfig, Orchestrator, ReuseFlags,
    RevisionsConfig, RunReport, Side,
};
use plotdiff_exec::{
    latest_remote_tag, CommandRenderer, GitMakeInstaller, InstallCommand, RenderOptions,
};
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "plotdiff")]
#[command(author = "plotdiff developers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compare the plots of two revisions of a plotting program", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Repository of the plotting program (URL or local path)
    #[arg(long, env = "PLOTDIFF_REPO")]
    repo: String,

    /// Old revision (default: latest tag of the repository)
    #[arg(long)]
    old_rev: Option<String>,

    /// New revision
    #[arg(long, default_value = "dev")]
    new_rev: String,

    /// Preset used by both revisions; one job per preset
    #[arg(long = "preset", value_name = "PRESET")]
    presets: Vec<String>,

    /// Distinct presets for the old and the new revision
    #[arg(long, num_args = 2, value_names = ["OLD", "NEW"], action = ArgAction::Append)]
    presets_old_new: Vec<String>,

    /// Input file used by both revisions
    #[arg(long = "infile", value_name = "PATH")]
    infiles: Vec<PathBuf>,

    /// Distinct input files for the old and the new revision
    #[arg(long, num_args = 2, value_names = ["OLD", "NEW"], action = ArgAction::Append)]
    infiles_old_new: Vec<PathBuf>,

    /// Work directory of a job (default: derived from the presets)
    #[arg(long = "work-dir", value_name = "DIR")]
    work_dirs: Vec<PathBuf>,

    /// Base directory for derived work directories and the run report
    #[arg(long, env = "PLOTDIFF_WORK_ROOT")]
    work_root: Option<PathBuf>,

    /// Directory holding the installed revisions (default: <work-root>/install)
    #[arg(long, env = "PLOTDIFF_INSTALL_DIR")]
    install_dir: Option<PathBuf>,

    /// Data directory linked into every output directory
    #[arg(long)]
    data_path: Option<PathBuf>,

    /// Processes used by the plotting program
    #[arg(long, default_value = "1")]
    num_procs: usize,

    /// Only create the first N plots of each preset
    #[arg(long, value_name = "N")]
    only: Option<usize>,

    /// Name of the plotting executable inside the installed environment
    #[arg(long, default_value = "pyflexplot")]
    exe: String,

    #[command(flatten)]
    reuse: ReuseArgs,
}

#[derive(clap::Args)]
struct ReuseArgs {
    /// Reuse existing installations of both revisions
    #[arg(long)]
    reuse_installs: bool,
    /// Reinstall both revisions
    #[arg(long)]
    reinstall: bool,
    /// Reuse an existing installation of the old revision
    #[arg(long)]
    reuse_old_install: bool,
    /// Reinstall the old revision
    #[arg(long)]
    reinstall_old: bool,
    /// Reuse an existing installation of the new revision
    #[arg(long)]
    reuse_new_install: bool,
    /// Reinstall the new revision
    #[arg(long)]
    reinstall_new: bool,

    /// Reuse complete plot sets of both revisions
    #[arg(long)]
    reuse_plots: bool,
    /// Recreate the plots of both revisions
    #[arg(long)]
    replot: bool,
    /// Reuse complete plot sets of the old revision
    #[arg(long)]
    reuse_old_plots: bool,
    /// Recreate the plots of the old revision
    #[arg(long)]
    replot_old: bool,
    /// Reuse complete plot sets of the new revision
    #[arg(long)]
    reuse_new_plots: bool,
    /// Recreate the plots of the new revision
    #[arg(long)]
    replot_new: bool,

    /// Reuse the plots of one job, e.g. `2` or `2:old`
    #[arg(long, value_name = "JOB[:SIDE]", value_parser = parse_job_side)]
    reuse_job_plots: Vec<(usize, Option<Side>)>,
    /// Recreate the plots of one job, e.g. `0` or `0:new`
    #[arg(long, value_name = "JOB[:SIDE]", value_parser = parse_job_side)]
    replot_job: Vec<(usize, Option<Side>)>,
}

impl ReuseArgs {
    fn install_flags(&self, problems: &mut Vec<ConfigProblem>) -> ReuseFlags {
        ReuseFlags {
            undirected: collect(
                ReuseFlags::layer(self.reuse_installs, self.reinstall, ("reuse-installs", "reinstall")),
                problems,
            ),
            old: collect(
                ReuseFlags::layer(
                    self.reuse_old_install,
                    self.reinstall_old,
                    ("reuse-old-install", "reinstall-old"),
                ),
                problems,
            ),
            new: collect(
                ReuseFlags::layer(
                    self.reuse_new_install,
                    self.reinstall_new,
                    ("reuse-new-install", "reinstall-new"),
                ),
                problems,
            ),
        }
    }

    fn plot_flags(&self, problems: &mut Vec<ConfigProblem>) -> ReuseFlags {
        ReuseFlags {
            undirected: collect(
                ReuseFlags::layer(self.reuse_plots, self.replot, ("reuse-plots", "replot")),
                problems,
            ),
            old: collect(
                ReuseFlags::layer(
                    self.reuse_old_plots,
                    self.replot_old,
                    ("reuse-old-plots", "replot-old"),
                ),
                problems,
            ),
            new: collect(
                ReuseFlags::layer(
                    self.reuse_new_plots,
                    self.replot_new,
                    ("reuse-new-plots", "replot-new"),
                ),
                problems,
            ),
        }
    }

    /// Per-job overrides. Replot entries come after reuse entries, so
    /// `--replot-job` wins over `--reuse-job-plots` for the same job and
    /// side, whatever their order on the command line.
    fn job_overrides(&self) -> JobOverrides {
        let reuse = self.reuse_job_plots.iter().map(|&(job, side)| JobOverride {
            job,
            side,
            reuse: true,
        });
        let redo = self.replot_job.iter().map(|&(job, side)| JobOverride {
            job,
            side,
            reuse: false,
        });
        JobOverrides {
            entries: reuse.chain(redo).collect(),
        }
    }
}

fn collect(
    layer: std::result::Result<Option<bool>, ConfigProblem>,
    problems: &mut Vec<ConfigProblem>,
) -> Option<bool> {
    layer.unwrap_or_else(|problem| {
        problems.push(problem);
        None
    })
}

fn parse_job_side(value: &str) -> std::result::Result<(usize, Option<Side>), String> {
    let (job, side) = match value.split_once(':') {
        Some((job, side)) => (job, Some(side)),
        None => (value, None),
    };
    let job = job
        .parse::<usize>()
        .map_err(|e| format!("invalid job index {job:?}: {e}"))?;
    let side = match side {
        None => None,
        Some("old") => Some(Side::Old),
        Some("new") => Some(Side::New),
        Some(other) => return Err(format!("invalid side {other:?}, expected old or new")),
    };
    Ok((job, side))
}

/// Group a flat `OLD NEW OLD NEW ...` list into pairs.
fn pairs<T: Clone>(flat: &[T]) -> Vec<(T, T)> {
    flat.chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect()
}

impl Cli {
    fn work_root(&self) -> PathBuf {
        self.work_root.clone().unwrap_or_else(|| {
            PathBuf::from(format!("plotdiff-{}", chrono::Utc::now().timestamp()))
        })
    }

    fn jobs_config(&self, work_root: &Path) -> JobsConfig {
        JobsConfig {
            presets: self.presets.clone(),
            presets_old_new: pairs(&self.presets_old_new),
            infiles: self.infiles.clone(),
            infiles_old_new: pairs(&self.infiles_old_new),
            work_dirs: self.work_dirs.clone(),
            work_root: work_root.to_path_buf(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    plotdiff_core::init_tracing(cli.json, level);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            if let Some(config) = err.downcast_ref::<ConfigurationError>() {
                for problem in &config.problems {
                    eprintln!("error: {problem}");
                }
                return ExitCode::from(2);
            }
            error!(error = %format!("{err:#}"), "run aborted");
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let work_root = cli.work_root();
    let jobs = cli.jobs_config(&work_root);

    // Every configuration problem is reported before anything is installed.
    let mut problems = Vec::new();
    let install_flags = cli.reuse.install_flags(&mut problems);
    let plot_flags = cli.reuse.plot_flags(&mut problems);
    if let Err(e) = plotdiff_core::resolve_jobs(&jobs) {
        problems.extend(e.problems);
    }
    ConfigurationError::check(problems)?;

    let old_revision = match &cli.old_rev {
        Some(rev) => rev.clone(),
        None => {
            let tag = latest_remote_tag(&cli.repo)
                .await
                .with_context(|| format!("Failed to determine the latest tag of {}", cli.repo))?;
            info!(tag = %tag, "using latest tag as old revision");
            tag
        }
    };

    let revisions = RevisionsConfig {
        repository: cli.repo.clone(),
        old_revision,
        new_revision: cli.new_rev.clone(),
        install_root: cli
            .install_dir
            .clone()
            .unwrap_or_else(|| work_root.join("install")),
        install_flags,
        plot_flags,
        job_overrides: cli.reuse.job_overrides(),
    };

    let installer = GitMakeInstaller::new(InstallCommand::make(&cli.exe));
    let renderer = CommandRenderer::new(RenderOptions {
        data_path: cli.data_path.clone(),
        num_procs: cli.num_procs,
        only: cli.only,
    });
    let orchestrator = Orchestrator::new(Arc::new(installer), Arc::new(renderer));
    let report = orchestrator.run(&jobs, &revisions).await?;

    std::fs::create_dir_all(&work_root)
        .with_context(|| format!("Failed to create {}", work_root.display()))?;
    write_report_json(&work_root.join("report.json"), &report)?;
    write_report_md(&work_root.join("report.md"), &report)?;

    print_summary(&report);
    println!("Report: {}", work_root.join("report.md").display());
    if cli.verbose {
        println!();
        print!("{}", render_report_md(&report));
    }

    Ok(u8::try_from(report.exit_code()).unwrap_or(1))
}

fn print_summary(report: &RunReport) {
    println!(
        "Compared {} against {} ({} jobs)",
        report.revisions.old,
        report.revisions.new,
        report.jobs.len()
    );
    for job in &report.jobs {
        let detail = match &job.outcome {
            JobOutcome::NoDifferences => format!("{} plots identical", job.identical),
            JobOutcome::Differences(summary) => format!(
                "{} of {} plots differ, composite: {}",
                summary.count,
                job.compared,
                summary.composite_path.display()
            ),
            JobOutcome::Failed { stage, error } => format!("failed during {stage}: {error}"),
        };
        println!("  [{}] {}: {}", job.job.index, job.job.label(), detail);
        for mismatch in &job.mismatches {
            println!(
                "      only in {}: {}",
                mismatch.present_in.name(),
                mismatch.name
            );
        }
    }
    println!(
        "Differing jobs: {}, failed jobs: {}",
        report.differing_jobs(),
        report.failed_jobs()
    );
}
