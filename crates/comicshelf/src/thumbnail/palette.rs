//! Dominant color extraction.

use std::collections::HashMap;

use image::RgbImage;
use serde::Serialize;

/// Pixels sampled per axis at most; palette extraction does not need detail.
const SAMPLE_EDGE: u32 = 64;

/// Bits dropped per channel when bucketing colors.
const QUANT_SHIFT: u8 = 4;

/// Dominant colors of an image, most common first, as `#rrggbb`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Palette {
    pub primary: String,
    pub secondary: String,
    pub colors: Vec<String>,
}

#[derive(Default)]
struct Bucket {
    count: u64,
    r: u64,
    g: u64,
    b: u64,
}

/// Extracts up to `max_colors` dominant colors.
///
/// Colors are bucketed on a coarse RGB grid over a downsampled copy and each
/// bucket is reported as its mean color. `secondary` falls back to the
/// primary color for single-color images.
pub fn extract_palette(img: &RgbImage, max_colors: usize) -> Palette {
    let (w, h) = img.dimensions();
    let sample;
    let img = if w > SAMPLE_EDGE || h > SAMPLE_EDGE {
        sample = image::imageops::thumbnail(img, SAMPLE_EDGE.min(w), SAMPLE_EDGE.min(h));
        &sample
    } else {
        img
    };

    let mut buckets: HashMap<(u8, u8, u8), Bucket> = HashMap::new();
    for px in img.pixels() {
        let [r, g, b] = px.0;
        let bucket = buckets
            .entry((r >> QUANT_SHIFT, g >> QUANT_SHIFT, b >> QUANT_SHIFT))
            .or_default();
        bucket.count += 1;
        bucket.r += u64::from(r);
        bucket.g += u64::from(g);
        bucket.b += u64::from(b);
    }

    let mut ranked: Vec<((u8, u8, u8), Bucket)> = buckets.into_iter().collect();
    ranked.sort_by(|(ka, a), (kb, b)| b.count.cmp(&a.count).then_with(|| ka.cmp(kb)));

    let colors: Vec<String> = ranked
        .iter()
        .take(max_colors.max(1))
        .map(|(_, bucket)| {
            let mean = |sum: u64| (sum / bucket.count) as u8;
            to_hex(mean(bucket.r), mean(bucket.g), mean(bucket.b))
        })
        .collect();

    let primary = colors.first().cloned().unwrap_or_else(|| to_hex(0, 0, 0));
    let secondary = colors.get(1).cloned().unwrap_or_else(|| primary.clone());

    Palette {
        primary,
        secondary,
        colors,
    }
}

fn to_hex(r: u8, g: u8, b: u8) -> String {
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}
