//! Job resolution.
//!
//! Presets, input files and work directories are given as independent lists
//! that may each be empty, a single value or one value per job. Resolution
//! broadcasts single values, pairs lists positionally and derives defaults,
//! yielding one fully specified [`ComparisonJob`] per job.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{slug, ComparisonJob};
use crate::error::{ConfigProblem, ConfigurationError, Dimension};

/// Raw job inputs as collected from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Presets shared by both revisions.
    pub presets: Vec<String>,
    /// Distinct (old, new) preset pairs; exclusive with `presets`.
    pub presets_old_new: Vec<(String, String)>,
    /// Input files shared by both revisions.
    pub infiles: Vec<PathBuf>,
    /// Distinct (old, new) input files; exclusive with `infiles`.
    pub infiles_old_new: Vec<(PathBuf, PathBuf)>,
    /// Explicit per-job work directories.
    pub work_dirs: Vec<PathBuf>,
    /// Base directory for derived work directories.
    pub work_root: PathBuf,
}

/// Resolve `config` into jobs, in input order.
///
/// Every problem found is reported in one [`ConfigurationError`].
pub fn resolve_jobs(config: &JobsConfig) -> Result<Vec<ComparisonJob>, ConfigurationError> {
    let mut problems = Vec::new();

    let presets = merge_dimension(
        &config.presets,
        &config.presets_old_new,
        Dimension::Preset,
        ("preset", "presets-old-new"),
        &mut problems,
    );
    let infiles = merge_dimension(
        &config.infiles,
        &config.infiles_old_new,
        Dimension::Infile,
        ("infile", "infiles-old-new"),
        &mut problems,
    );

    let n_jobs = [
        presets.as_ref().map(Vec::len),
        infiles.as_ref().map(Vec::len),
        Some(config.work_dirs.len()),
    ]
    .into_iter()
    .flatten()
    .max()
    .unwrap_or(0);

    if matches!(&presets, Some(p) if p.is_empty()) {
        problems.push(ConfigProblem::MissingPresets);
    }
    let lens = [
        (Dimension::Preset, presets.as_ref().map(Vec::len)),
        (Dimension::Infile, infiles.as_ref().map(Vec::len)),
        (Dimension::WorkDir, Some(config.work_dirs.len())),
    ];
    for (dimension, len) in lens {
        if let Some(len) = len {
            if len > 1 && len != n_jobs {
                problems.push(ConfigProblem::Cardinality {
                    dimension,
                    len,
                    expected: n_jobs,
                });
            }
        }
    }
    ConfigurationError::check(problems)?;

    let presets = presets.unwrap_or_default();
    let infiles = infiles.unwrap_or_default();

    let mut jobs = Vec::with_capacity(n_jobs);
    for index in 0..n_jobs {
        let (preset_old, preset_new) = pick(&presets, index).clone();
        let (infile_old, infile_new) = if infiles.is_empty() {
            (None, None)
        } else {
            let (old, new) = pick(&infiles, index);
            (Some(old.clone()), Some(new.clone()))
        };
        let (work_dir, work_dir_explicit) = if config.work_dirs.is_empty() {
            let derived = derive_work_dir(
                &config.work_root,
                &preset_old,
                &preset_new,
                infile_old.as_deref(),
                infile_new.as_deref(),
            );
            (derived, false)
        } else {
            (pick(&config.work_dirs, index).clone(), true)
        };
        jobs.push(ComparisonJob {
            index,
            preset_old,
            preset_new,
            infile_old,
            infile_new,
            work_dir,
            work_dir_explicit,
        });
    }

    check_derived_collisions(&jobs)?;
    Ok(jobs)
}

/// Combine the single-value and old/new-pair lists of one dimension.
///
/// Returns `None` (and records a problem) when both are given.
fn merge_dimension<T: Clone>(
    single: &[T],
    pairs: &[(T, T)],
    dimension: Dimension,
    names: (&'static str, &'static str),
    problems: &mut Vec<ConfigProblem>,
) -> Option<Vec<(T, T)>> {
    match (single.is_empty(), pairs.is_empty()) {
        (false, false) => {
            problems.push(ConfigProblem::MutuallyExclusive {
                dimension,
                single: names.0,
                pair: names.1,
            });
            None
        }
        (false, true) => Some(single.iter().map(|v| (v.clone(), v.clone())).collect()),
        (true, _) => Some(pairs.to_vec()),
    }
}

/// Broadcast a single value, otherwise pair positionally.
fn pick<T>(values: &[T], index: usize) -> &T {
    if values.len() == 1 {
        &values[0]
    } else {
        &values[index]
    }
}

/// Deterministic work directory for a job without an explicit one.
///
/// The readable part comes from the preset name(s); the digest covers presets
/// and input files so different jobs never share a directory.
pub fn derive_work_dir(
    root: &Path,
    preset_old: &str,
    preset_new: &str,
    infile_old: Option<&Path>,
    infile_new: Option<&Path>,
) -> PathBuf {
    let mut hasher = Sha256::new();
    for part in [preset_old, preset_new] {
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    }
    for infile in [infile_old, infile_new] {
        if let Some(path) = infile {
            hasher.update(path.to_string_lossy().as_bytes());
        }
        hasher.update(b"\0");
    }
    let digest = hex::encode(hasher.finalize());

    let name = if preset_old == preset_new {
        slug(preset_old)
    } else {
        format!("{}~{}", slug(preset_old), slug(preset_new))
    };
    root.join(format!("{}-{}", name, &digest[..8]))
}

fn check_derived_collisions(jobs: &[ComparisonJob]) -> Result<(), ConfigurationError> {
    let mut seen: HashMap<&Path, usize> = HashMap::new();
    let mut problems = Vec::new();
    for job in jobs.iter().filter(|j| !j.work_dir_explicit) {
        if let Some(first) = seen.insert(job.work_dir.as_path(), job.index) {
            problems.push(ConfigProblem::DuplicateWorkDir {
                path: job.work_dir.clone(),
                first,
                second: job.index,
            });
        }
    }
    ConfigurationError::check(problems)
}
