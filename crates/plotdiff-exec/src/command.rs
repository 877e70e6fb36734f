//! Subprocess execution with line-by-line stdout streaming.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::error::CommandError;

/// Run `program` with `args` and return its trimmed stdout lines.
///
/// Every line is handed to `on_line` as soon as it is read. Stderr is
/// collected and included in the error if the program exits unsuccessfully.
pub async fn run_streaming<F>(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    mut on_line: F,
) -> Result<Vec<String>, CommandError>
where
    F: FnMut(&str),
{
    let command = display_command(program, args);
    let io_err = |source| CommandError::Io {
        command: command.clone(),
        source,
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
        command: command.clone(),
        source,
    })?;

    let stderr_task = child.stderr.take().map(|mut stderr| {
        tokio::spawn(async move {
            let mut buf = String::new();
            stderr.read_to_string(&mut buf).await.map(|_| buf)
        })
    });

    let mut lines = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        let mut reader = BufReader::new(stdout).lines();
        while let Some(line) = reader.next_line().await.map_err(io_err)? {
            let line = line.trim().to_string();
            on_line(&line);
            lines.push(line);
        }
    }

    let status = child.wait().await.map_err(io_err)?;
    let stderr = match stderr_task {
        Some(task) => task.await.ok().and_then(Result::ok).unwrap_or_default(),
        None => String::new(),
    };

    if !status.success() {
        return Err(CommandError::Failed {
            command,
            code: status.code(),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(lines)
}

/// Run `program` and return its stdout lines.
pub async fn run(program: &str, args: &[String], cwd: Option<&Path>) -> Result<Vec<String>, CommandError> {
    run_streaming(program, args, cwd, |_| {}).await
}

/// Build an argument vector from string slices.
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

fn display_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
