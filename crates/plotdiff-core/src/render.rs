//! Boundary to the external plotting program.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ComparisonJob, EnvironmentHandle, PlotSet, Side};
use crate::error::RenderError;

/// What to plot and where to put it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub preset: String,
    /// `None` selects the preset's built-in input file.
    pub infile: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl RenderRequest {
    pub fn for_job(job: &ComparisonJob, side: Side, output_dir: PathBuf) -> Self {
        Self {
            preset: job.preset(side).to_string(),
            infile: job.infile(side).map(PathBuf::from),
            output_dir,
        }
    }
}

/// Produces plots with an installed revision.
///
/// Implementations write into `request.output_dir` only and return the
/// images in the order they were produced.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        env: &EnvironmentHandle,
        request: &RenderRequest,
    ) -> Result<PlotSet, RenderError>;
}
