use rayon::prelude::*;

use super::{Arc, ImageBuffer, ImageFrame, RenderImage, Rgba};
use crate::{
    canvas::Surface, emotion::BrushColor, gesture::DrawingSignal,
    pipeline::rgba_converter::mirror_horizontal, types::Frame,
};

/// Canvas backdrop the painting is composited onto.
pub(super) const CANVAS_BACKGROUND: [u8; 3] = [0x11, 0x16, 0x21];
const RING_WIDTH: f32 = 2.0;

/// Camera frame as shown in the preview, flipped when the cursor is mirrored
/// so both move the same way as the user's hand.
pub(super) fn preview_pixels(frame: &Frame, mirror: bool) -> anyhow::Result<Vec<u8>> {
    let mut rgba = frame.rgba.clone();
    if mirror {
        mirror_horizontal(&mut rgba, frame.width, frame.height)?;
    }
    Ok(rgba)
}

/// Opaque RGBA of the surface over the backdrop, with an outline ring the size
/// of the brush at the cursor.
pub(super) fn compose_canvas(surface: &Surface, signal: &DrawingSignal, ring: BrushColor) -> Vec<u8> {
    let width = surface.width() as usize;
    let ring_rgba = ring.to_rgba();
    let cursor = signal
        .cursor
        .map(|c| (c.x, c.y, signal.brush_size / 2.0))
        .filter(|(x, y, r)| x.is_finite() && y.is_finite() && r.is_finite());

    let mut out = vec![0u8; surface.pixels().len()];
    out.par_chunks_exact_mut(width * 4)
        .zip(surface.pixels().par_chunks_exact(width * 4))
        .enumerate()
        .for_each(|(y, (dst_row, src_row))| {
            for (x, (dst, src)) in dst_row
                .chunks_exact_mut(4)
                .zip(src_row.chunks_exact(4))
                .enumerate()
            {
                let alpha = src[3] as f32 / 255.0;
                for c in 0..3 {
                    let value = src[c] as f32 * alpha + CANVAS_BACKGROUND[c] as f32 * (1.0 - alpha);
                    dst[c] = value.round() as u8;
                }
                dst[3] = 255;

                if let Some((cx, cy, radius)) = cursor {
                    let dist = ((x as f32 + 0.5 - cx).powi(2) + (y as f32 + 0.5 - cy).powi(2)).sqrt();
                    if (dist - radius).abs() <= RING_WIDTH / 2.0 {
                        dst[..3].copy_from_slice(&ring_rgba[..3]);
                    }
                }
            }
        });
    out
}

pub(super) fn rgba_to_image(mut rgba: Vec<u8>, width: u32, height: u32) -> Option<Arc<RenderImage>> {
    // GPUI expects BGRA; convert in place to avoid the async asset pipeline and flicker.
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }

    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(width, height, rgba)?;
    Some(Arc::new(RenderImage::new(vec![ImageFrame::new(buffer)])))
}
