//! Raster decode/encode and pixel arithmetic used by comparison and
//! aggregation.

use std::path::Path;

use image::{GrayImage, ImageFormat, ImageReader, Luma, Rgba, RgbaImage};

use crate::error::CompareError;

/// Canvas fill used when padding images of different sizes.
pub const PAD_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Colour of differing pixels in highlighted diff images.
pub const HIGHLIGHT: Rgba<u8> = Rgba([255, 0, 0, 255]);

pub fn decode(path: &Path) -> Result<RgbaImage, CompareError> {
    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|source| CompareError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let image = reader.decode().map_err(|e| CompareError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(image.to_rgba8())
}

pub fn decode_gray(path: &Path) -> Result<GrayImage, CompareError> {
    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|source| CompareError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let image = reader.decode().map_err(|e| CompareError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(image.to_luma8())
}

/// Write `image` as PNG, regardless of the extension of `path`.
pub fn encode_png<P>(image: &image::ImageBuffer<P, Vec<u8>>, path: &Path) -> Result<(), CompareError>
where
    P: image::Pixel<Subpixel = u8> + image::PixelWithColorType,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| CompareError::Encode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Place `image` at the top-left of a `width` x `height` white canvas.
///
/// Images already of that size are returned unchanged.
pub fn pad_to(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    let mut canvas = RgbaImage::from_pixel(width, height, PAD_COLOR);
    image::imageops::replace(&mut canvas, image, 0, 0);
    canvas
}

/// Per-pixel magnitude of the difference between two images.
///
/// Both are padded to their common canvas first. A pixel's magnitude is the
/// largest absolute delta over its four channels; zero means equal. Pixels
/// covered by only one of the two images always have full magnitude, so a
/// change of canvas size never compares equal.
pub fn pixel_diff(old: &RgbaImage, new: &RgbaImage) -> GrayImage {
    let width = old.width().max(new.width());
    let height = old.height().max(new.height());
    let shared_width = old.width().min(new.width());
    let shared_height = old.height().min(new.height());
    let old = pad_to(old, width, height);
    let new = pad_to(new, width, height);

    GrayImage::from_fn(width, height, |x, y| {
        if x >= shared_width || y >= shared_height {
            return Luma([u8::MAX]);
        }
        let a = old.get_pixel(x, y);
        let b = new.get_pixel(x, y);
        let delta = a
            .0
            .iter()
            .zip(b.0.iter())
            .map(|(l, r)| l.abs_diff(*r))
            .max()
            .unwrap_or(0);
        Luma([delta])
    })
}

/// `old` faded towards white, with every pixel set in `mask` painted red.
pub fn highlight(old: &RgbaImage, mask: &GrayImage) -> RgbaImage {
    let (width, height) = mask.dimensions();
    let base = pad_to(old, width, height);
    RgbaImage::from_fn(width, height, |x, y| {
        if mask.get_pixel(x, y).0[0] > 0 {
            return HIGHLIGHT;
        }
        let Rgba([r, g, b, _]) = *base.get_pixel(x, y);
        Rgba([fade(r), fade(g), fade(b), 255])
    })
}

fn fade(channel: u8) -> u8 {
    255 - (255 - channel) / 4
}
