//! Rendering through the installed plotting executable.
//!
//! Every render is done twice: a dry run announces the plots a preset will
//! produce, the real run must then produce exactly those. A real run that
//! leaves announced plots out is an error, so a truncated set is never
//! recorded as complete.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use plotdiff_core::{EnvironmentHandle, PlotSet, RenderError, RenderRequest, Renderer};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::command::run_streaming;

/// Options shared by every render of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Directory linked as `data` into every output directory; relative
    /// input files are resolved against it.
    pub data_path: Option<PathBuf>,
    pub num_procs: usize,
    /// Restrict each preset to its first `only` plots.
    pub only: Option<usize>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            data_path: None,
            num_procs: 1,
            only: None,
        }
    }
}

/// [`Renderer`] invoking the plotting executable of an installed revision.
#[derive(Debug, Clone, Default)]
pub struct CommandRenderer {
    options: RenderOptions,
}

impl CommandRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    /// Arguments common to the dry and the real run.
    fn base_args(&self, request: &RenderRequest) -> Result<Vec<String>, RenderError> {
        let mut args = vec![
            "--no-show-version".to_string(),
            format!("--preset={}", request.preset),
        ];
        if let Some(infile) = &request.infile {
            let infile = match &self.options.data_path {
                Some(data) if infile.is_relative() => data.join(infile),
                _ => infile.clone(),
            };
            args.push("--setup".to_string());
            args.push("infile".to_string());
            args.push(absolute(&infile)?.to_string_lossy().into_owned());
        }
        if let Some(only) = self.options.only {
            args.push(format!("--only={only}"));
        }
        Ok(args)
    }

    fn link_data(&self, output_dir: &Path) -> Result<(), RenderError> {
        let Some(data) = &self.options.data_path else {
            return Ok(());
        };
        let target = absolute(data)?;
        if !target.exists() {
            return Err(RenderError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("data path not found: {}", target.display()),
            )));
        }
        let link = output_dir.join("data");
        match fs::symlink_metadata(&link) {
            Ok(meta) if meta.file_type().is_symlink() => fs::remove_file(&link)?,
            Ok(_) => {
                return Err(RenderError::Io(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} exists and is not a symlink", link.display()),
                )))
            }
            Err(_) => {}
        }
        symlink_dir(&target, &link)?;
        Ok(())
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(
        &self,
        env: &EnvironmentHandle,
        request: &RenderRequest,
    ) -> Result<PlotSet, RenderError> {
        let output_dir = &request.output_dir;
        fs::create_dir_all(output_dir)?;
        self.link_data(output_dir)?;

        let exe = absolute(&env.executable)?;
        let exe = exe.to_string_lossy();
        let command_err = |e: crate::error::CommandError| RenderError::Command {
            preset: request.preset.clone(),
            message: e.to_string(),
        };

        let mut dry_args = self.base_args(request)?;
        let mut real_args = dry_args.clone();
        dry_args.push("--dry-run".to_string());
        real_args.push(format!("--num-procs={}", self.options.num_procs));

        let expected: Vec<String> = run_streaming(&exe, &dry_args, Some(output_dir), |_| {})
            .await
            .map_err(command_err)?
            .iter()
            .filter_map(|line| parse_plot_name(line))
            .collect();
        if expected.is_empty() {
            return Err(RenderError::NoPlotsExpected {
                preset: request.preset.clone(),
            });
        }
        info!(preset = %request.preset, expected = expected.len(), "rendering");

        let total = expected.len();
        let mut produced = 0usize;
        let lines = run_streaming(&exe, &real_args, Some(output_dir), |line| {
            if parse_plot_name(line).is_some() {
                produced += 1;
                debug!(progress = %format!("{produced}/{total}"), "{line}");
            }
        })
        .await
        .map_err(command_err)?;

        let mut plots = PlotSet::new();
        for name in lines.iter().filter_map(|line| parse_plot_name(line)) {
            if !expected.contains(&name) {
                return Err(RenderError::UnexpectedPlot {
                    preset: request.preset.clone(),
                    name,
                });
            }
            let path = output_dir.join(&name);
            if !path.exists() {
                return Err(RenderError::MissingOutput { path });
            }
            plots.push(name, path);
        }

        let missing: Vec<String> = expected
            .into_iter()
            .filter(|name| !plots.contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(RenderError::IncompleteRender {
                preset: request.preset.clone(),
                missing,
            });
        }
        Ok(plots)
    }
}

/// Plot name announced by a line such as `<input> -> <plot>`.
pub fn parse_plot_name(line: &str) -> Option<String> {
    static PLOT_LINE: OnceLock<Regex> = OnceLock::new();
    let re = PLOT_LINE.get_or_init(|| Regex::new(r"^[^ ]+ -> ([^ ]+)$").expect("plot line regex compiles"));
    re.captures(line).map(|c| c[1].to_string())
}

fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(infile: Option<&str>) -> RenderRequest {
        RenderRequest {
            preset: "opr/all_png".to_string(),
            infile: infile.map(PathBuf::from),
            output_dir: PathBuf::from("/out"),
        }
    }

    #[test]
    fn parses_plot_announcements_only() {
        assert_eq!(
            parse_plot_name("in.nc -> plots/a_001.png"),
            Some("plots/a_001.png".to_string())
        );
        assert_eq!(parse_plot_name("creating 3 plots"), None);
        assert_eq!(parse_plot_name("a -> b c"), None);
    }

    #[test]
    fn base_args_without_infile() {
        let renderer = CommandRenderer::default();
        let args = renderer.base_args(&request(None)).unwrap();
        assert_eq!(args, vec!["--no-show-version", "--preset=opr/all_png"]);
    }

    #[test]
    fn relative_infile_resolves_against_data_path() {
        let renderer = CommandRenderer::new(RenderOptions {
            data_path: Some(PathBuf::from("/data")),
            num_procs: 4,
            only: Some(2),
        });
        let args = renderer.base_args(&request(Some("cosmo/x.nc"))).unwrap();
        assert_eq!(
            args,
            vec![
                "--no-show-version",
                "--preset=opr/all_png",
                "--setup",
                "infile",
                "/data/cosmo/x.nc",
                "--only=2",
            ]
        );
    }

    #[test]
    fn absolute_infile_is_kept() {
        let renderer = CommandRenderer::new(RenderOptions {
            data_path: Some(PathBuf::from("/data")),
            ..Default::default()
        });
        let args = renderer.base_args(&request(Some("/elsewhere/x.nc"))).unwrap();
        assert_eq!(args[4], "/elsewhere/x.nc");
    }
}
