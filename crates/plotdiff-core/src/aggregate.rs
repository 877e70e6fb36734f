//! Composite image and animation summarizing all differing plots of a job.

use std::fs;
use std::path::{Path, PathBuf};

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, GrayImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::compare::{codec, DiffOutcome, ImageDiff};
use crate::error::{AggregationError, CompareError};
use crate::obs;

/// Display time of every animation frame.
pub const FRAME_DELAY_MS: u32 = 800;

/// GIF quantizer speed, 1 (best) to 30 (fastest).
const GIF_SPEED: i32 = 10;

/// Colour of pixels that differ in every plot of the job.
const PERSISTENT: Rgba<u8> = Rgba([139, 0, 0, 255]);

/// Aggregate artifacts of one job with at least one differing plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffSummary {
    /// Differing plots in comparison order.
    pub diffs: Vec<ImageDiff>,
    pub composite_path: PathBuf,
    pub animation_path: PathBuf,
    pub count: usize,
}

/// Build the composite and animation for the differing entries of `diffs`.
///
/// Returns `Ok(None)` and writes nothing when no entry differs.
pub fn aggregate(diffs: &[ImageDiff], out_dir: &Path) -> Result<Option<DiffSummary>, AggregationError> {
    let differing: Vec<&ImageDiff> = diffs.iter().filter(|d| d.differs()).collect();
    if differing.is_empty() {
        return Ok(None);
    }
    let count = differing.len();
    fs::create_dir_all(out_dir)?;

    let mut masks = Vec::with_capacity(count);
    let mut frames = Vec::with_capacity(count);
    for diff in &differing {
        if let DiffOutcome::Differs {
            diff_path,
            mask_path,
            ..
        } = &diff.outcome
        {
            masks.push(codec::decode_gray(mask_path).map_err(decode_failure)?);
            frames.push(codec::decode(diff_path).map_err(decode_failure)?);
        }
    }

    let composite_path = out_dir.join(format!("composite_diff_{count}x.png"));
    let heat_map = composite(&masks);
    heat_map
        .save_with_format(&composite_path, image::ImageFormat::Png)
        .map_err(|e| AggregationError::Encode {
            path: composite_path.clone(),
            message: e.to_string(),
        })?;

    let animation_path = out_dir.join(format!("animated_diff_{count}x.gif"));
    write_animation(&frames, &animation_path)?;

    obs::emit_aggregated(count, &composite_path, &animation_path);
    Ok(Some(DiffSummary {
        diffs: differing.into_iter().cloned().collect(),
        composite_path,
        animation_path,
        count,
    }))
}

/// Per-pixel heat map of how many masks flag the pixel.
///
/// Zero maps to white, all masks to dark red, linearly in between.
pub fn composite(masks: &[GrayImage]) -> RgbaImage {
    let width = masks.iter().map(GrayImage::width).max().unwrap_or(0);
    let height = masks.iter().map(GrayImage::height).max().unwrap_or(0);
    let n = masks.len().max(1) as u32;

    let mut counts = vec![0u32; width as usize * height as usize];
    for mask in masks {
        for (x, y, px) in mask.enumerate_pixels() {
            if px.0[0] > 0 {
                counts[y as usize * width as usize + x as usize] += 1;
            }
        }
    }

    RgbaImage::from_fn(width, height, |x, y| {
        let hits = counts[y as usize * width as usize + x as usize];
        ramp(hits, n)
    })
}

fn ramp(hits: u32, n: u32) -> Rgba<u8> {
    let Rgba([r, g, b, _]) = PERSISTENT;
    let channel = |target: u8| {
        let drop = u32::from(255 - target) * hits / n;
        (255 - drop) as u8
    };
    Rgba([channel(r), channel(g), channel(b), 255])
}

fn write_animation(images: &[RgbaImage], path: &Path) -> Result<(), AggregationError> {
    let width = images.iter().map(RgbaImage::width).max().unwrap_or(0);
    let height = images.iter().map(RgbaImage::height).max().unwrap_or(0);
    let encode_err = |e: image::ImageError| AggregationError::Encode {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let mut bytes: Vec<u8> = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut bytes, GIF_SPEED);
        encoder.set_repeat(Repeat::Infinite).map_err(encode_err)?;
        for image in images {
            let frame = Frame::from_parts(
                codec::pad_to(image, width, height),
                0,
                0,
                Delay::from_numer_denom_ms(FRAME_DELAY_MS, 1),
            );
            encoder.encode_frame(frame).map_err(encode_err)?;
        }
    }
    fs::write(path, bytes)?;
    Ok(())
}

fn decode_failure(err: CompareError) -> AggregationError {
    match err {
        CompareError::Read { source, .. } => AggregationError::Io(source),
        CompareError::Decode { path, message } | CompareError::Encode { path, message } => {
            AggregationError::Decode { path, message }
        }
        CompareError::Io(e) => AggregationError::Io(e),
    }
}
