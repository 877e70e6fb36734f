//! Image-by-image comparison of two plot sets.

pub mod codec;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{PlotEntry, PlotSet, Side};
use crate::error::CompareError;
use crate::obs;

/// Subdirectory of a diff dir holding the highlighted diff images.
pub const DIFFS_DIR: &str = "diffs";

/// Subdirectory of a diff dir holding the raw magnitude masks.
pub const MASKS_DIR: &str = "masks";

/// How much two images differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffMagnitude {
    pub differing_pixels: u64,
    pub total_pixels: u64,
    /// Largest channel delta over all pixels.
    pub max_delta: u8,
}

impl DiffMagnitude {
    pub fn from_mask(mask: &image::GrayImage) -> Self {
        let mut differing_pixels = 0;
        let mut max_delta = 0;
        for px in mask.pixels() {
            let v = px.0[0];
            if v > 0 {
                differing_pixels += 1;
                max_delta = max_delta.max(v);
            }
        }
        Self {
            differing_pixels,
            total_pixels: u64::from(mask.width()) * u64::from(mask.height()),
            max_delta,
        }
    }

    /// Share of differing pixels, in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total_pixels == 0 {
            0.0
        } else {
            self.differing_pixels as f64 / self.total_pixels as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DiffOutcome {
    Identical,
    Differs {
        magnitude: DiffMagnitude,
        /// Highlighted diff image.
        diff_path: PathBuf,
        /// Grayscale per-pixel magnitude.
        mask_path: PathBuf,
    },
}

/// Result of comparing one plot present on both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDiff {
    pub name: String,
    pub old_path: PathBuf,
    pub new_path: PathBuf,
    pub outcome: DiffOutcome,
}

impl ImageDiff {
    pub fn differs(&self) -> bool {
        matches!(self.outcome, DiffOutcome::Differs { .. })
    }

    pub fn magnitude(&self) -> Option<&DiffMagnitude> {
        match &self.outcome {
            DiffOutcome::Differs { magnitude, .. } => Some(magnitude),
            DiffOutcome::Identical => None,
        }
    }
}

/// A plot produced by only one of the two revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralMismatch {
    pub name: String,
    pub present_in: Side,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub diffs: Vec<ImageDiff>,
    pub mismatches: Vec<StructuralMismatch>,
}

impl Comparison {
    pub fn differing(&self) -> impl Iterator<Item = &ImageDiff> {
        self.diffs.iter().filter(|d| d.differs())
    }

    pub fn identical_count(&self) -> usize {
        self.diffs.iter().filter(|d| !d.differs()).count()
    }
}

/// Compare `old` and `new` by name, writing diff artifacts into `diff_dir`.
///
/// Names are visited in `old`'s order, followed by names that only `new`
/// has. An image is identical if its bytes or its decoded pixels are equal;
/// images of different dimensions always differ. Highlighted diffs go to
/// `<diff_dir>/diffs/<name>`, masks to `<diff_dir>/masks/<name>`, which
/// leaves the top level of `diff_dir` to the aggregates.
pub fn compare(old: &PlotSet, new: &PlotSet, diff_dir: &Path) -> Result<Comparison, CompareError> {
    let mut comparison = Comparison::default();

    for entry in old.iter() {
        match new.get(&entry.name) {
            Some(other) => {
                let diff = compare_pair(entry, other, diff_dir)?;
                obs::emit_image_compared(
                    &diff.name,
                    !diff.differs(),
                    diff.magnitude().map_or(0.0, DiffMagnitude::fraction),
                );
                comparison.diffs.push(diff);
            }
            None => {
                obs::emit_structural_mismatch(&entry.name, Side::Old);
                comparison.mismatches.push(StructuralMismatch {
                    name: entry.name.clone(),
                    present_in: Side::Old,
                });
            }
        }
    }
    for entry in new.iter().filter(|e| !old.contains(&e.name)) {
        obs::emit_structural_mismatch(&entry.name, Side::New);
        comparison.mismatches.push(StructuralMismatch {
            name: entry.name.clone(),
            present_in: Side::New,
        });
    }

    Ok(comparison)
}

fn compare_pair(old: &PlotEntry, new: &PlotEntry, diff_dir: &Path) -> Result<ImageDiff, CompareError> {
    let result = |outcome| ImageDiff {
        name: old.name.clone(),
        old_path: old.path.clone(),
        new_path: new.path.clone(),
        outcome,
    };

    if same_bytes(&old.path, &new.path)? {
        return Ok(result(DiffOutcome::Identical));
    }

    let old_img = codec::decode(&old.path)?;
    let new_img = codec::decode(&new.path)?;
    if old_img == new_img {
        return Ok(result(DiffOutcome::Identical));
    }

    let mask = codec::pixel_diff(&old_img, &new_img);
    let magnitude = DiffMagnitude::from_mask(&mask);
    if magnitude.differing_pixels == 0 {
        return Ok(result(DiffOutcome::Identical));
    }

    let (diff_path, mask_path) = artifact_paths(diff_dir, &old.name);
    codec::encode_png(&codec::highlight(&old_img, &mask), &diff_path)?;
    codec::encode_png(&mask, &mask_path)?;

    Ok(result(DiffOutcome::Differs {
        magnitude,
        diff_path,
        mask_path,
    }))
}

/// Highlighted diff and raw mask locations for plot `name`.
///
/// Both keep the full plot name, so no two plots of a set share a path.
pub fn artifact_paths(diff_dir: &Path, name: &str) -> (PathBuf, PathBuf) {
    (
        diff_dir.join(DIFFS_DIR).join(name),
        diff_dir.join(MASKS_DIR).join(name),
    )
}

fn same_bytes(a: &Path, b: &Path) -> Result<bool, CompareError> {
    let len_a = fs::metadata(a).map_err(read_err(a))?.len();
    let len_b = fs::metadata(b).map_err(read_err(b))?.len();
    if len_a != len_b {
        return Ok(false);
    }
    let bytes_a = fs::read(a).map_err(read_err(a))?;
    let bytes_b = fs::read(b).map_err(read_err(b))?;
    Ok(bytes_a == bytes_b)
}

fn read_err(path: &Path) -> impl FnOnce(std::io::Error) -> CompareError {
    let path = path.to_path_buf();
    move |source| CompareError::Read { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn plot(dir: &Path, name: &str, img: &RgbaImage) -> PathBuf {
        let path = dir.join(name);
        codec::encode_png(img, &path).unwrap();
        path
    }

    fn solid(w: u32, h: u32, v: u8) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([v, v, v, 255]))
    }

    #[test]
    fn identical_sets_have_no_differences() {
        let tmp = tempfile::tempdir().unwrap();
        let (old_dir, new_dir) = (tmp.path().join("old"), tmp.path().join("new"));
        for dir in [&old_dir, &new_dir] {
            plot(dir, "a.png", &solid(4, 4, 10));
            plot(dir, "b.png", &solid(4, 4, 200));
        }
        let old = PlotSet::from_names(&old_dir, ["a.png", "b.png"]);
        let new = PlotSet::from_names(&new_dir, ["a.png", "b.png"]);

        let cmp = compare(&old, &new, &tmp.path().join("diff")).unwrap();
        assert_eq!(cmp.differing().count(), 0);
        assert!(cmp.mismatches.is_empty());
        assert_eq!(cmp.identical_count(), 2);
        assert!(!tmp.path().join("diff").exists());
    }

    #[test]
    fn differing_pixels_produce_diff_and_mask() {
        let tmp = tempfile::tempdir().unwrap();
        let mut changed = solid(4, 4, 10);
        changed.put_pixel(1, 1, Rgba([250, 10, 10, 255]));
        let old = PlotSet::from_names(&tmp.path().join("old"), ["a.png"]);
        let new = PlotSet::from_names(&tmp.path().join("new"), ["a.png"]);
        plot(&tmp.path().join("old"), "a.png", &solid(4, 4, 10));
        plot(&tmp.path().join("new"), "a.png", &changed);

        let diff_dir = tmp.path().join("diff");
        let cmp = compare(&old, &new, &diff_dir).unwrap();
        let diff = &cmp.diffs[0];
        match &diff.outcome {
            DiffOutcome::Differs {
                magnitude,
                diff_path,
                mask_path,
            } => {
                assert_eq!(magnitude.differing_pixels, 1);
                assert_eq!(magnitude.total_pixels, 16);
                assert_eq!(magnitude.max_delta, 240);
                assert_eq!(diff_path, &diff_dir.join("diffs/a.png"));
                assert_eq!(mask_path, &diff_dir.join("masks/a.png"));
                assert!(diff_path.exists() && mask_path.exists());
            }
            DiffOutcome::Identical => panic!("expected a difference"),
        }
    }

    #[test]
    fn unpaired_names_become_mismatches_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let (old_dir, new_dir) = (tmp.path().join("old"), tmp.path().join("new"));
        plot(&old_dir, "shared.png", &solid(2, 2, 0));
        plot(&old_dir, "gone.png", &solid(2, 2, 0));
        plot(&new_dir, "shared.png", &solid(2, 2, 0));
        plot(&new_dir, "added.png", &solid(2, 2, 0));
        let old = PlotSet::from_names(&old_dir, ["gone.png", "shared.png"]);
        let new = PlotSet::from_names(&new_dir, ["added.png", "shared.png"]);

        let cmp = compare(&old, &new, &tmp.path().join("diff")).unwrap();
        assert_eq!(cmp.diffs.len(), 1);
        assert_eq!(
            cmp.mismatches,
            vec![
                StructuralMismatch {
                    name: "gone.png".to_string(),
                    present_in: Side::Old
                },
                StructuralMismatch {
                    name: "added.png".to_string(),
                    present_in: Side::New
                },
            ]
        );
    }

    #[test]
    fn different_sizes_always_differ() {
        let tmp = tempfile::tempdir().unwrap();
        plot(&tmp.path().join("old"), "a.png", &solid(100, 80, 255));
        plot(&tmp.path().join("new"), "a.png", &solid(140, 120, 255));
        let old = PlotSet::from_names(&tmp.path().join("old"), ["a.png"]);
        let new = PlotSet::from_names(&tmp.path().join("new"), ["a.png"]);

        let cmp = compare(&old, &new, &tmp.path().join("diff")).unwrap();
        let magnitude = cmp.diffs[0].magnitude().expect("size change must differ");
        assert_eq!(magnitude.total_pixels, 140 * 120);
        assert_eq!(magnitude.differing_pixels, 140 * 120 - 100 * 80);
        assert_eq!(magnitude.max_delta, 255);
    }

    #[test]
    fn similar_names_keep_separate_masks() {
        let tmp = tempfile::tempdir().unwrap();
        let (old_dir, new_dir) = (tmp.path().join("old"), tmp.path().join("new"));
        let mut one_pixel = solid(4, 4, 10);
        one_pixel.put_pixel(1, 1, Rgba([90, 10, 10, 255]));
        let names = ["a.png", "a-raw.png", "a.jpg"];
        for name in names {
            plot(&old_dir, name, &solid(4, 4, 10));
        }
        plot(&new_dir, "a.png", &one_pixel);
        plot(&new_dir, "a-raw.png", &solid(4, 4, 200));
        plot(&new_dir, "a.jpg", &solid(4, 4, 200));
        let old = PlotSet::from_names(&old_dir, names);
        let new = PlotSet::from_names(&new_dir, names);

        let cmp = compare(&old, &new, &tmp.path().join("diff")).unwrap();
        assert_eq!(cmp.differing().count(), 3);
        let mask_path = match &cmp.diffs[0].outcome {
            DiffOutcome::Differs { mask_path, .. } => mask_path.clone(),
            DiffOutcome::Identical => panic!("expected a difference"),
        };
        let mask = codec::decode_gray(&mask_path).unwrap();
        assert_eq!(mask.pixels().filter(|p| p.0[0] > 0).count(), 1);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let tmp = tempfile::tempdir().unwrap();
        plot(&tmp.path().join("old"), "a.png", &solid(2, 2, 0));
        let old = PlotSet::from_names(&tmp.path().join("old"), ["a.png"]);
        let new = PlotSet::from_names(&tmp.path().join("new"), ["a.png"]);

        let err = compare(&old, &new, &tmp.path().join("diff")).unwrap_err();
        assert!(matches!(err, CompareError::Read { .. }));
    }

    #[test]
    fn artifacts_are_split_by_kind() {
        let (diff, mask) = artifact_paths(Path::new("/d"), "sub/plot.png");
        assert_eq!(diff, PathBuf::from("/d/diffs/sub/plot.png"));
        assert_eq!(mask, PathBuf::from("/d/masks/sub/plot.png"));
    }
}
