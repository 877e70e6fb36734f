//! Cardinality rules of job resolution over a grid of list lengths.

use plotdiff_core::{resolve_jobs, ConfigProblem, Dimension, JobsConfig};
use std::collections::HashSet;
use std::path::PathBuf;

fn config(n_presets: usize, n_infiles: usize) -> JobsConfig {
    JobsConfig {
        presets: (0..n_presets).map(|i| format!("preset-{i}")).collect(),
        infiles: (0..n_infiles)
            .map(|i| PathBuf::from(format!("in-{i}.nc")))
            .collect(),
        work_root: PathBuf::from("/work"),
        ..Default::default()
    }
}

/// Test: M in {0, 1, N} infiles over N presets yields exactly N jobs
#[test]
fn test_valid_infile_counts_yield_one_job_per_preset() {
    for n in 1..=5 {
        let mut valid = vec![0, 1, n];
        valid.dedup();
        for m in valid {
            let jobs = resolve_jobs(&config(n, m))
                .unwrap_or_else(|e| panic!("N={n} M={m}: {e}"));
            assert_eq!(jobs.len(), n, "N={n} M={m}");

            let dirs: HashSet<_> = jobs.iter().map(|j| j.work_dir.clone()).collect();
            assert_eq!(dirs.len(), n, "N={n} M={m}: work dirs must be distinct");
            for (i, job) in jobs.iter().enumerate() {
                assert_eq!(job.index, i);
                assert_eq!(job.preset_old, format!("preset-{i}"));
            }
        }
    }
}

/// Test: any other infile count is a configuration error
#[test]
fn test_other_infile_counts_are_rejected() {
    for n in 3..=5 {
        for m in 2..n {
            let err = resolve_jobs(&config(n, m)).expect_err("cardinality error");
            assert_eq!(
                err.problems,
                vec![ConfigProblem::Cardinality {
                    dimension: Dimension::Infile,
                    len: m,
                    expected: n,
                }],
                "N={n} M={m}"
            );
        }
    }
}

/// Test: more infiles than presets broadcasts a single preset
#[test]
fn test_single_preset_over_many_infiles() {
    let jobs = resolve_jobs(&config(1, 4)).expect("resolve");
    assert_eq!(jobs.len(), 4);
    assert!(jobs.iter().all(|j| j.preset_new == "preset-0"));
}

/// Test: single-value and old/new-pair options exclude each other
#[test]
fn test_single_and_pair_options_are_exclusive() {
    let presets = JobsConfig {
        presets_old_new: vec![("a".to_string(), "b".to_string())],
        ..config(1, 0)
    };
    let err = resolve_jobs(&presets).expect_err("presets clash");
    assert!(err.problems.iter().any(|p| matches!(
        p,
        ConfigProblem::MutuallyExclusive {
            dimension: Dimension::Preset,
            ..
        }
    )));

    let infiles = JobsConfig {
        infiles_old_new: vec![(PathBuf::from("o"), PathBuf::from("n"))],
        ..config(1, 1)
    };
    let err = resolve_jobs(&infiles).expect_err("infiles clash");
    assert!(err.problems.iter().any(|p| matches!(
        p,
        ConfigProblem::MutuallyExclusive {
            dimension: Dimension::Infile,
            ..
        }
    )));
}

/// Test: work dirs follow the same cardinality rules
#[test]
fn test_work_dir_cardinality() {
    let bad = JobsConfig {
        work_dirs: vec![PathBuf::from("w1"), PathBuf::from("w2")],
        ..config(3, 0)
    };
    let err = resolve_jobs(&bad).expect_err("work dir cardinality");
    assert_eq!(
        err.problems,
        vec![ConfigProblem::Cardinality {
            dimension: Dimension::WorkDir,
            len: 2,
            expected: 3,
        }]
    );

    let good = JobsConfig {
        work_dirs: vec![PathBuf::from("w1"), PathBuf::from("w2"), PathBuf::from("w3")],
        ..config(3, 0)
    };
    let jobs = resolve_jobs(&good).expect("resolve");
    assert_eq!(jobs[2].work_dir, PathBuf::from("w3"));
}
