//! In-process fakes for the installer and renderer boundaries (testing only)
//!
//! Provides `FakeInstaller` and `FakeRenderer` that satisfy the trait
//! contracts without git, make or a plotting program.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use crate::compare::codec;
use crate::domain::{EnvironmentHandle, PlotSet};
use crate::error::{InstallError, RenderError};
use crate::install::Installer;
use crate::render::{RenderRequest, Renderer};

// ---------------------------------------------------------------------------
// FakeInstaller
// ---------------------------------------------------------------------------

/// One recorded `Installer::ensure` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallCall {
    pub repository: String,
    pub revision: String,
    pub install_dir: PathBuf,
    pub reuse: bool,
}

/// Installer that records calls and "installs" instantly.
#[derive(Debug, Default)]
pub struct FakeInstaller {
    failing: HashSet<String>,
    calls: Mutex<Vec<InstallCall>>,
}

impl FakeInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every install of `revision` fail.
    pub fn failing_on(mut self, revision: &str) -> Self {
        self.failing.insert(revision.to_string());
        self
    }

    pub fn calls(&self) -> Vec<InstallCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Installer for FakeInstaller {
    async fn ensure(
        &self,
        repository: &str,
        revision: &str,
        install_dir: &Path,
        reuse: bool,
    ) -> Result<EnvironmentHandle, InstallError> {
        self.calls.lock().unwrap().push(InstallCall {
            repository: repository.to_string(),
            revision: revision.to_string(),
            install_dir: install_dir.to_path_buf(),
            reuse,
        });

        if self.failing.contains(revision) {
            return Err(InstallError::Build {
                revision: revision.to_string(),
                install_dir: install_dir.to_path_buf(),
                message: "scripted failure".to_string(),
            });
        }
        Ok(EnvironmentHandle {
            revision: revision.to_string(),
            root: install_dir.to_path_buf(),
            executable: install_dir.join("venv/bin/fake-plot"),
        })
    }
}

// ---------------------------------------------------------------------------
// FakeRenderer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ScriptedPlot {
    preset: String,
    /// `None` renders the plot for every revision.
    revision: Option<String>,
    name: String,
    width: u32,
    height: u32,
    value: u8,
}

/// One recorded `Renderer::render` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderCall {
    pub revision: String,
    pub request: RenderRequest,
}

/// Renderer writing solid gray PNGs according to a script.
///
/// A plot scripted for a specific revision replaces the revision-agnostic
/// plot of the same preset and name.
#[derive(Debug, Default)]
pub struct FakeRenderer {
    plots: Vec<ScriptedPlot>,
    /// (revision, preset) pairs whose last scripted plot is never written.
    truncated: Vec<(String, String)>,
    calls: Mutex<Vec<RenderCall>>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render `name` for `preset` with every revision.
    pub fn with_plot(self, preset: &str, name: &str, width: u32, height: u32, value: u8) -> Self {
        self.script(preset, None, name, width, height, value)
    }

    /// Render `name` for `preset` only with `revision`.
    pub fn with_revision_plot(
        self,
        revision: &str,
        preset: &str,
        name: &str,
        width: u32,
        height: u32,
        value: u8,
    ) -> Self {
        self.script(preset, Some(revision), name, width, height, value)
    }

    /// Leave out the last plot of `preset` when rendering `revision`,
    /// failing like an interrupted plotting program.
    pub fn truncating(mut self, revision: &str, preset: &str) -> Self {
        self.truncated.push((revision.to_string(), preset.to_string()));
        self
    }

    fn script(
        mut self,
        preset: &str,
        revision: Option<&str>,
        name: &str,
        width: u32,
        height: u32,
        value: u8,
    ) -> Self {
        self.plots.push(ScriptedPlot {
            preset: preset.to_string(),
            revision: revision.map(str::to_string),
            name: name.to_string(),
            width,
            height,
            value,
        });
        self
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Plots for one preset and revision, in script order.
    fn resolve(&self, preset: &str, revision: &str) -> Vec<&ScriptedPlot> {
        let applies = |p: &&ScriptedPlot| {
            p.preset == preset && p.revision.as_deref().map_or(true, |r| r == revision)
        };
        let mut out: Vec<&ScriptedPlot> = Vec::new();
        for plot in self.plots.iter().filter(applies) {
            match out.iter().position(|p| p.name == plot.name) {
                Some(i) if plot.revision.is_some() => out[i] = plot,
                Some(_) => {}
                None => out.push(plot),
            }
        }
        out
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(
        &self,
        env: &EnvironmentHandle,
        request: &RenderRequest,
    ) -> Result<PlotSet, RenderError> {
        self.calls.lock().unwrap().push(RenderCall {
            revision: env.revision.clone(),
            request: request.clone(),
        });

        let mut plots = self.resolve(&request.preset, &env.revision);
        if plots.is_empty() {
            return Err(RenderError::NoPlotsExpected {
                preset: request.preset.clone(),
            });
        }
        let truncated = self
            .truncated
            .iter()
            .any(|(rev, preset)| *rev == env.revision && *preset == request.preset);
        let missing = if truncated { plots.pop() } else { None };

        let mut set = PlotSet::new();
        for plot in plots {
            let path = request.output_dir.join(&plot.name);
            let v = plot.value;
            let image = RgbaImage::from_pixel(plot.width, plot.height, Rgba([v, v, v, 255]));
            codec::encode_png(&image, &path).map_err(|e| RenderError::Command {
                preset: request.preset.clone(),
                message: e.to_string(),
            })?;
            set.push(plot.name.clone(), path);
        }
        if let Some(plot) = missing {
            return Err(RenderError::IncompleteRender {
                preset: request.preset.clone(),
                missing: vec![plot.name.clone()],
            });
        }
        Ok(set)
    }
}
