//! Log setup for the `plotdiff` binary.
//!
//! Logs go to stderr, leaving stdout to the run summary. Without `RUST_LOG`
//! only the plotdiff crates log at the requested level; everything else
//! (image codecs, the async runtime) is limited to warnings.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Targets that log at the level chosen on the command line.
///
/// `plotdiff::build` carries the output of install commands.
const OWN_TARGETS: [&str; 3] = ["plotdiff_core", "plotdiff_exec", "plotdiff"];

/// Install the global subscriber; `json` selects newline-delimited JSON.
///
/// Only the first call in a process has an effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(layer.json()).try_init().ok();
    } else {
        registry.with(layer).try_init().ok();
    }
}

/// Filter directives used when `RUST_LOG` is not set.
fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    std::iter::once("warn".to_string())
        .chain(OWN_TARGETS.iter().map(|target| format!("{target}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}
