//! Errors raised while driving external programs.

use std::path::PathBuf;

/// A subprocess could not be run or exited unsuccessfully.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}: {stderr}", exit_status(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("io error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "a signal".to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("no tags found in {repository}")]
    NoTags { repository: String },

    #[error("cannot prepare clone at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
