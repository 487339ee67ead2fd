use anyhow::{Context as _, anyhow};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use tracing::{info, warn};

use crate::models::CapturedImage;

const CANVAS_WIDTH: u32 = 300;
const CANVAS_HEIGHT: u32 = 400;
const RING_COUNT: u32 = 20;
const RING_BASE_RADIUS: f32 = 10.0;
const RING_SPACING: f32 = 8.0;
const RING_STROKE: f32 = 2.0;
const BACKGROUND: Rgb<u8> = Rgb([0x00, 0x00, 0x00]);
const RIDGE: Rgb<u8> = Rgb([0x06, 0xb6, 0xd4]);

/// Render the placeholder "scanner frame": concentric cyan rings on black.
///
/// Never fails. If the frame cannot be encoded the returned image is empty,
/// and the analysis downstream reports the failure.
pub fn generate_synthetic_capture() -> CapturedImage {
    let frame = render_rings();
    match encode_png(&DynamicImage::ImageRgb8(frame)) {
        Ok(data) => CapturedImage::from_png(data),
        Err(e) => {
            warn!("Synthetic capture could not be encoded: {}", e);
            CapturedImage::empty()
        }
    }
}

fn render_rings() -> RgbImage {
    let cx = CANVAS_WIDTH as f32 / 2.0;
    let cy = CANVAS_HEIGHT as f32 / 2.0;
    let half_stroke = RING_STROKE / 2.0;

    RgbImage::from_fn(CANVAS_WIDTH, CANVAS_HEIGHT, |x, y| {
        // sample at the pixel centre
        let dx = x as f32 + 0.5 - cx;
        let dy = y as f32 + 0.5 - cy;
        let distance = (dx * dx + dy * dy).sqrt();

        let nearest = ((distance - RING_BASE_RADIUS) / RING_SPACING).round();
        if nearest < 0.0 || nearest >= RING_COUNT as f32 {
            return BACKGROUND;
        }
        let radius = RING_BASE_RADIUS + nearest * RING_SPACING;
        if (distance - radius).abs() <= half_stroke {
            RIDGE
        } else {
            BACKGROUND
        }
    })
}

/// Read a user-supplied scan from disk and normalize it to PNG
pub async fn encode_uploaded_file(path: impl AsRef<Path>) -> anyhow::Result<CapturedImage> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read scan file {}", path.display()))?;
    encode_uploaded_bytes(bytes).await
}

/// Decode an uploaded scan in any format the `image` crate understands and
/// re-encode it as PNG, so every capture carries the same format tag.
pub async fn encode_uploaded_bytes(bytes: Vec<u8>) -> anyhow::Result<CapturedImage> {
    if bytes.is_empty() {
        return Err(anyhow!("Uploaded scan is empty"));
    }

    let data = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
        let image = image::load_from_memory(&bytes)
            .map_err(|e| anyhow!("Failed to decode uploaded scan: {}", e))?;
        encode_png(&image)
    })
    .await??;

    info!("Uploaded scan normalized to PNG ({} bytes)", data.len());
    Ok(CapturedImage::from_png(data))
}

fn encode_png(image: &DynamicImage) -> anyhow::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| anyhow!("Failed to encode image: {}", e))?;
    Ok(buffer)
}
