//! Domain types shared by every stage of a comparison run.

pub mod job;
pub mod plot_set;
pub mod revision;

pub use job::{ComparisonJob, Side};
pub use plot_set::{PlotEntry, PlotSet, MANIFEST_FILE};
pub use revision::{EnvironmentHandle, InstallKey, JobOverride, JobOverrides, ReuseFlags, RevisionSpec};

/// Turn an arbitrary name (preset, revision) into a single path component.
///
/// Characters outside `[A-Za-z0-9._-]` become `+`; runs of `+` collapse into
/// one and leading/trailing `+` are dropped.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let keep = c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
        if keep {
            out.push(c);
        } else if !out.ends_with('+') {
            out.push('+');
        }
    }
    let trimmed = out.trim_matches('+');
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}
