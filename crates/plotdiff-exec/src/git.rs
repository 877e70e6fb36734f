//! Git operations on remote repositories and local clones.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::command::{args, run};
use crate::error::{CommandError, GitError};

/// Tags of `repository`, sorted as version numbers (oldest first).
pub async fn remote_tags(repository: &str) -> Result<Vec<String>, GitError> {
    let lines = run(
        "git",
        &args(["ls-remote", "--tags", "--sort=version:refname", repository]),
        None,
    )
    .await?;
    let tags = parse_tags(&lines);
    if tags.is_empty() {
        return Err(GitError::NoTags {
            repository: repository.to_string(),
        });
    }
    Ok(tags)
}

/// Most recent version tag of `repository`.
pub async fn latest_remote_tag(repository: &str) -> Result<String, GitError> {
    let mut tags = remote_tags(repository).await?;
    tags.pop().ok_or_else(|| GitError::NoTags {
        repository: repository.to_string(),
    })
}

/// Tag names from `git ls-remote --tags` output, skipping peeled `^{}` refs.
pub fn parse_tags(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.split_once("\trefs/tags/").map(|(_, tag)| tag))
        .filter(|tag| !tag.ends_with("^{}"))
        .map(str::to_string)
        .collect()
}

/// Make `path` a clone of `repository` with `revision` checked out.
///
/// An existing clone is kept as is when `reuse` is set, its origin is
/// `repository` and it has no local modifications. Anything else at `path`
/// is removed and cloned afresh.
pub async fn prepare_clone(
    repository: &str,
    revision: &str,
    path: &Path,
    reuse: bool,
) -> Result<(), GitError> {
    if path.exists() {
        if reuse && is_reusable_clone(repository, path).await {
            info!(path = %path.display(), "reusing existing clone");
            return Ok(());
        }
        debug!(path = %path.display(), "removing existing install directory");
        let removed = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        removed.map_err(|source| io_error(path, source))?;
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }
    info!(repository = %repository, path = %path.display(), "cloning");
    let target = path.to_string_lossy().into_owned();
    run("git", &args(["clone", "--quiet", repository, target.as_str()]), None).await?;

    git(path, &["fetch", "--all", "--quiet"]).await?;
    git(path, &["checkout", "--quiet", revision]).await?;
    if !is_detached(path).await {
        git(path, &["pull", "--quiet"]).await?;
    }
    Ok(())
}

/// Whether `path` is a clean clone whose origin is `repository`.
pub async fn is_reusable_clone(repository: &str, path: &Path) -> bool {
    if !path.join(".git").exists() {
        debug!(path = %path.display(), "not a git clone");
        return false;
    }
    match git(path, &["remote", "get-url", "origin"]).await {
        Ok(lines) if lines.first().map(String::as_str) == Some(repository) => {}
        Ok(lines) => {
            debug!(path = %path.display(), origin = ?lines.first(), "origin does not match");
            return false;
        }
        Err(_) => return false,
    }
    match git(path, &["status", "--porcelain", "--untracked-files=no"]).await {
        Ok(lines) if lines.iter().all(|l| l.is_empty()) => true,
        Ok(_) => {
            debug!(path = %path.display(), "clone has local modifications");
            false
        }
        Err(_) => false,
    }
}

async fn is_detached(path: &Path) -> bool {
    git(path, &["symbolic-ref", "--quiet", "HEAD"]).await.is_err()
}

async fn git(path: &Path, git_args: &[&str]) -> Result<Vec<String>, CommandError> {
    run("git", &args(git_args.iter().copied()), Some(path)).await
}

fn io_error(path: &Path, source: std::io::Error) -> GitError {
    GitError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tags_skips_peeled_refs_and_noise() {
        let lines = args([
            "aaa\trefs/tags/v0.9",
            "bbb\trefs/tags/v0.9^{}",
            "warning: something",
            "ccc\trefs/tags/v1.0",
        ]);
        assert_eq!(parse_tags(&lines), vec!["v0.9", "v1.0"]);
    }

    #[test]
    fn parse_tags_of_empty_output_is_empty() {
        assert!(parse_tags(&[]).is_empty());
    }
}
