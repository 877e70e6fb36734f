//! External collaborators for plotdiff.
//!
//! Implements the core's [`plotdiff_core::Installer`] and
//! [`plotdiff_core::Renderer`] traits with git, a build command and the
//! installed plotting executable.

pub mod command;
pub mod error;
pub mod git;
pub mod installer;
pub mod renderer;

pub use command::{run, run_streaming};
pub use error::{CommandError, GitError};
pub use git::{latest_remote_tag, prepare_clone, remote_tags};
pub use installer::{GitMakeInstaller, InstallCommand};
pub use renderer::{parse_plot_name, CommandRenderer, RenderOptions};
