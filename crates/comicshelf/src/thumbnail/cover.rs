use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};

use super::palette::{extract_palette, Palette};
use crate::error::ThumbnailError;

/// Colors kept in a cover palette.
pub const PALETTE_SIZE: usize = 5;

/// Output box and encoder quality for covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverSpec {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: f32,
}

impl Default for CoverSpec {
    fn default() -> Self {
        Self {
            max_width: 320,
            max_height: 455,
            quality: 85.0,
        }
    }
}

/// An encoded cover and the colors taken from it.
#[derive(Debug, Clone)]
pub struct RenderedCover {
    pub webp: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub palette: Palette,
}

/// Decodes a page, flattens it onto white, shrinks it into the box and
/// encodes it as lossy WebP.
pub fn render_cover(bytes: &[u8], spec: &CoverSpec) -> Result<RenderedCover, ThumbnailError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| ThumbnailError::ImageProcessing(e.to_string()))?;

    let flat = flatten_onto_white(&decoded);
    let resized = fit_within(flat, spec.max_width, spec.max_height);
    let palette = extract_palette(&resized, PALETTE_SIZE);
    let (width, height) = resized.dimensions();

    let webp = encode_webp(&DynamicImage::ImageRgb8(resized), spec.quality)?;

    Ok(RenderedCover {
        webp,
        width,
        height,
        palette,
    })
}

/// Composites any alpha channel over an opaque white background.
pub fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = u32::from(a);
        let blend = |c: u8| ((u32::from(c) * a + 255 * (255 - a) + 127) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Shrinks to fit within `max_width` x `max_height`, keeping the aspect
/// ratio. Images already inside the box are returned untouched.
pub fn fit_within(img: RgbImage, max_width: u32, max_height: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    if w <= max_width && h <= max_height {
        return img;
    }

    let scale = f64::min(
        f64::from(max_width) / f64::from(w),
        f64::from(max_height) / f64::from(h),
    );
    let new_w = ((f64::from(w) * scale).round() as u32).clamp(1, max_width);
    let new_h = ((f64::from(h) * scale).round() as u32).clamp(1, max_height);

    image::imageops::resize(&img, new_w, new_h, FilterType::Lanczos3)
}

fn encode_webp(img: &DynamicImage, quality: f32) -> Result<Vec<u8>, ThumbnailError> {
    let encoder = webp::Encoder::from_image(img).map_err(|e| ThumbnailError::Encode(e.to_string()))?;
    Ok(encoder.encode(quality).to_vec())
}
