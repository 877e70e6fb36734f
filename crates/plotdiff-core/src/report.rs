//! Run reports: per-job outcomes, the exit code derived from them, and
//! their JSON and markdown renderings.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::aggregate::DiffSummary;
use crate::compare::StructuralMismatch;
use crate::domain::ComparisonJob;
use crate::error::JobStage;

/// The two revisions a run compared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevisionPair {
    pub repository: String,
    pub old: String,
    pub new: String,
}

/// Final state of one job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOutcome {
    NoDifferences,
    Differences(DiffSummary),
    Failed { stage: JobStage, error: String },
}

impl JobOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::NoDifferences => "no_differences",
            JobOutcome::Differences(_) => "differences",
            JobOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobReport {
    pub job: ComparisonJob,
    pub outcome: JobOutcome,
    pub mismatches: Vec<StructuralMismatch>,
    /// Plots present on both sides.
    pub compared: usize,
    pub identical: usize,
}

impl JobReport {
    pub fn failed(job: ComparisonJob, stage: JobStage, error: impl ToString) -> Self {
        Self {
            job,
            outcome: JobOutcome::Failed {
                stage,
                error: error.to_string(),
            },
            mismatches: Vec::new(),
            compared: 0,
            identical: 0,
        }
    }

    pub fn differing(&self) -> usize {
        match &self.outcome {
            JobOutcome::Differences(summary) => summary.count,
            _ => 0,
        }
    }
}

/// Outcome of a whole run, persisted as `report.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub revisions: RevisionPair,
    /// Installer invocations during the run.
    pub installs: usize,
    pub jobs: Vec<JobReport>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.jobs
            .iter()
            .any(|j| matches!(j.outcome, JobOutcome::Failed { .. }))
    }

    pub fn has_mismatches(&self) -> bool {
        self.jobs.iter().any(|j| !j.mismatches.is_empty())
    }

    pub fn differing_jobs(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| matches!(j.outcome, JobOutcome::Differences(_)))
            .count()
    }

    pub fn failed_jobs(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| matches!(j.outcome, JobOutcome::Failed { .. }))
            .count()
    }

    /// 1 when a job failed or produced unpaired plots, otherwise 0.
    ///
    /// Pixel differences alone do not fail a run.
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() || self.has_mismatches() {
            1
        } else {
            0
        }
    }
}

/// Write report.json in pretty JSON format.
pub fn write_report_json(path: &Path, report: &RunReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize run report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Render the human-readable run summary.
pub fn render_report_md(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str("# Plot Comparison\n\n");
    out.push_str(&format!(
        "- repository: `{}`\n- old: `{}`\n- new: `{}`\n- run: `{}`\n- installs: {}\n\n",
        report.revisions.repository,
        report.revisions.old,
        report.revisions.new,
        report.run_id,
        report.installs
    ));
    out.push_str(&format!(
        "{} jobs: {} with differences, {} failed\n\n",
        report.jobs.len(),
        report.differing_jobs(),
        report.failed_jobs()
    ));

    for entry in &report.jobs {
        out.push_str(&format!("## Job {}: {}\n", entry.job.index, entry.job.label()));
        out.push_str(&format!("- work dir: `{}`\n", entry.job.work_dir.display()));
        match &entry.outcome {
            JobOutcome::NoDifferences => {
                out.push_str(&format!(
                    "- no differences ({} plots identical)\n",
                    entry.identical
                ));
            }
            JobOutcome::Differences(summary) => {
                out.push_str(&format!(
                    "- {} of {} plots differ\n- composite: `{}`\n- animation: `{}`\n",
                    summary.count,
                    entry.compared,
                    summary.composite_path.display(),
                    summary.animation_path.display()
                ));
                for diff in &summary.diffs {
                    let pct = diff.magnitude().map_or(0.0, |m| m.fraction() * 100.0);
                    out.push_str(&format!("  - `{}` ({:.2}% pixels)\n", diff.name, pct));
                }
            }
            JobOutcome::Failed { stage, error } => {
                out.push_str(&format!("- FAILED during {}: {}\n", stage, error));
            }
        }
        for mismatch in &entry.mismatches {
            out.push_str(&format!(
                "- only in {}: `{}`\n",
                mismatch.present_in, mismatch.name
            ));
        }
        out.push('\n');
    }
    out
}

/// Write report.md.
pub fn write_report_md(path: &Path, report: &RunReport) -> Result<()> {
    let md = render_report_md(report);
    std::fs::write(path, md).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::{DiffMagnitude, DiffOutcome, ImageDiff};
    use crate::domain::Side;
    use serde_json::json;
    use std::path::PathBuf;

    fn job(index: usize) -> ComparisonJob {
        ComparisonJob {
            index,
            preset_old: "opr/all_png".to_string(),
            preset_new: "opr/all_png".to_string(),
            infile_old: None,
            infile_new: None,
            work_dir: PathBuf::from(format!("/w/{index}")),
            work_dir_explicit: false,
        }
    }

    fn report(jobs: Vec<JobReport>) -> RunReport {
        RunReport {
            run_id: Uuid::parse_str("11111111-1111-1111-1111-111111111111").expect("valid UUID"),
            generated_at: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .expect("parse RFC3339")
                .with_timezone(&Utc),
            revisions: RevisionPair {
                repository: "repo".to_string(),
                old: "v1.0".to_string(),
                new: "dev".to_string(),
            },
            installs: 2,
            jobs,
        }
    }

    fn clean(index: usize) -> JobReport {
        JobReport {
            job: job(index),
            outcome: JobOutcome::NoDifferences,
            mismatches: Vec::new(),
            compared: 3,
            identical: 3,
        }
    }

    fn differing(index: usize) -> JobReport {
        let diff = ImageDiff {
            name: "a.png".to_string(),
            old_path: PathBuf::from("/w/old/a.png"),
            new_path: PathBuf::from("/w/new/a.png"),
            outcome: DiffOutcome::Differs {
                magnitude: DiffMagnitude {
                    differing_pixels: 1,
                    total_pixels: 4,
                    max_delta: 9,
                },
                diff_path: PathBuf::from("/w/d/diffs/a.png"),
                mask_path: PathBuf::from("/w/d/masks/a.png"),
            },
        };
        JobReport {
            job: job(index),
            outcome: JobOutcome::Differences(DiffSummary {
                diffs: vec![diff],
                composite_path: PathBuf::from("/w/d/composite_diff_1x.png"),
                animation_path: PathBuf::from("/w/d/animated_diff_1x.gif"),
                count: 1,
            }),
            mismatches: Vec::new(),
            compared: 1,
            identical: 0,
        }
    }

    #[test]
    fn differences_alone_exit_zero() {
        let r = report(vec![clean(0), differing(1)]);
        assert_eq!(r.exit_code(), 0);
        assert_eq!(r.differing_jobs(), 1);
    }

    #[test]
    fn failure_or_mismatch_exits_one() {
        let r = report(vec![clean(0), JobReport::failed(job(1), JobStage::Install, "boom")]);
        assert!(r.has_failures());
        assert_eq!(r.exit_code(), 1);

        let mut with_mismatch = clean(0);
        with_mismatch.mismatches.push(StructuralMismatch {
            name: "x.png".to_string(),
            present_in: Side::New,
        });
        let r = report(vec![with_mismatch]);
        assert!(r.has_mismatches());
        assert_eq!(r.exit_code(), 1);
    }

    #[test]
    fn report_json_has_expected_keys() {
        let r = report(vec![clean(0), JobReport::failed(job(1), JobStage::Render, "no plots")]);
        let raw = serde_json::to_value(&r).expect("serialize report");
        assert_eq!(raw["revisions"]["old"], json!("v1.0"));
        assert_eq!(raw["jobs"][0]["outcome"]["kind"], json!("no_differences"));
        assert_eq!(raw["jobs"][1]["outcome"]["kind"], json!("failed"));
        assert_eq!(raw["jobs"][1]["outcome"]["stage"], json!("render"));
    }

    #[test]
    fn markdown_separates_clean_from_failed() {
        let r = report(vec![
            clean(0),
            differing(1),
            JobReport::failed(job(2), JobStage::Install, "make failed"),
        ]);
        let md = render_report_md(&r);
        assert!(md.contains("3 jobs: 1 with differences, 1 failed"));
        assert!(md.contains("## Job 0: opr/all_png\n- work dir: `/w/0`\n- no differences (3 plots identical)\n"));
        assert!(md.contains("- 1 of 1 plots differ\n"));
        assert!(md.contains("  - `a.png` (25.00% pixels)\n"));
        assert!(md.contains("- FAILED during install: make failed\n"));
    }

    #[test]
    fn write_report_files() {
        let dir = tempfile::tempdir().unwrap();
        let r = report(vec![clean(0)]);
        write_report_json(&dir.path().join("report.json"), &r).unwrap();
        write_report_md(&dir.path().join("report.md"), &r).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("report.json")).unwrap();
        let back: RunReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, r);
        assert!(dir.path().join("report.md").exists());
    }
}
