//! Rendered plot sets and their on-disk manifest.
//!
//! A side's output directory is only considered complete once the manifest
//! has been written; it lists every plot in production order together with
//! the SHA-256 of its content.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;

/// Name of the manifest file inside a side's output directory.
pub const MANIFEST_FILE: &str = ".plotset.json";

/// One rendered image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotEntry {
    /// Path relative to the output directory; the pairing key between sides.
    pub name: String,
    pub path: PathBuf,
}

/// Ordered images produced by one render of one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotSet {
    entries: Vec<PlotEntry>,
}

impl PlotSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from names relative to `root`, keeping their order.
    pub fn from_names<I, S>(root: &Path, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for name in names {
            let name = name.into();
            let path = root.join(&name);
            set.push(name, path);
        }
        set
    }

    /// Append an entry; a name that is already present is ignored.
    pub fn push(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> bool {
        let name = name.into();
        if self.get(&name).is_some() {
            return false;
        }
        self.entries.push(PlotEntry {
            name,
            path: path.into(),
        });
        true
    }

    pub fn get(&self, name: &str) -> Option<&PlotEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlotEntry> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    plots: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestEntry {
    name: String,
    sha256: String,
}

/// SHA-256 of a file's content, hex encoded.
pub fn file_digest(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Record `set` as the complete content of `dir`.
///
/// Written atomically so an interrupted run never leaves a manifest behind
/// for a directory that was not fully rendered.
pub fn write_manifest(dir: &Path, set: &PlotSet) -> io::Result<()> {
    let mut plots = Vec::with_capacity(set.len());
    for entry in set.iter() {
        plots.push(ManifestEntry {
            name: entry.name.clone(),
            sha256: file_digest(&entry.path)?,
        });
    }
    let json = serde_json::to_vec_pretty(&Manifest { plots }).map_err(io::Error::other)?;

    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.persist(dir.join(MANIFEST_FILE)).map_err(|e| e.error)?;
    Ok(())
}

/// Load the plot set recorded in `dir`, if it is complete.
///
/// Returns `None` when the manifest is missing, unreadable or empty, or when
/// any listed plot is missing or its content changed since it was recorded.
pub fn read_complete(dir: &Path) -> Option<PlotSet> {
    let raw = fs::read(dir.join(MANIFEST_FILE)).ok()?;
    let manifest: Manifest = match serde_json::from_slice(&raw) {
        Ok(m) => m,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "unreadable plot set manifest");
            return None;
        }
    };
    if manifest.plots.is_empty() {
        return None;
    }

    let mut set = PlotSet::new();
    for entry in manifest.plots {
        let path = dir.join(&entry.name);
        match file_digest(&path) {
            Ok(digest) if digest == entry.sha256 => {
                set.push(entry.name, path);
            }
            Ok(_) => {
                debug!(path = %path.display(), "plot changed since it was recorded");
                return None;
            }
            Err(_) => {
                debug!(path = %path.display(), "recorded plot is missing");
                return None;
            }
        }
    }
    Some(set)
}
