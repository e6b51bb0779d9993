use fast_image_resize as fir;
use thiserror::Error;

use super::StrokeSink;
use crate::{emotion::BrushColor, types::CanvasPoint};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("canvas size must be non-zero, got {width}x{height}")]
    EmptySize { width: u32, height: u32 },
    #[error("failed to rescale canvas content: {0}")]
    Resample(String),
}

/// Straight-alpha RGBA raster that keeps everything painted on it until
/// [`Surface::clear`].
#[derive(Clone, Debug)]
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Result<Self, SurfaceError> {
        if width == 0 || height == 0 {
            return Err(SurfaceError::EmptySize { width, height });
        }
        Ok(Self {
            width,
            height,
            pixels: vec![0; buffer_len(width, height)],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.pixels[idx..idx + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.chunks_exact(4).all(|px| px[3] == 0)
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Changes the pixel size, scaling what is already painted into the new
    /// bounds. Resizing to the current size leaves the content untouched.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        if width == 0 || height == 0 {
            return Err(SurfaceError::EmptySize { width, height });
        }
        if width == self.width && height == self.height {
            return Ok(());
        }

        let resized = if self.is_blank() {
            vec![0; buffer_len(width, height)]
        } else {
            let snapshot = self.pixels.clone();
            let src = fir::images::Image::from_vec_u8(
                self.width,
                self.height,
                snapshot,
                fir::PixelType::U8x4,
            )
            .map_err(|err| SurfaceError::Resample(err.to_string()))?;
            let mut dst = fir::images::Image::new(width, height, fir::PixelType::U8x4);
            let options = fir::ResizeOptions::new()
                .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
            fir::Resizer::new()
                .resize(&src, &mut dst, Some(&options))
                .map_err(|err| SurfaceError::Resample(err.to_string()))?;
            dst.into_vec()
        };

        log::debug!(
            "canvas resized {}x{} -> {}x{}",
            self.width,
            self.height,
            width,
            height
        );
        self.width = width;
        self.height = height;
        self.pixels = resized;
        Ok(())
    }

    /// Paints a capsule: every pixel within `width / 2` of the segment, so the
    /// ends are round and consecutive segments join without seams.
    pub fn stroke_segment(
        &mut self,
        from: CanvasPoint,
        to: CanvasPoint,
        width: f32,
        color: BrushColor,
    ) {
        if !(from.x.is_finite() && from.y.is_finite() && to.x.is_finite() && to.y.is_finite()) {
            return;
        }
        let radius = (width / 2.0).max(0.5);
        let rgba = color.to_rgba();

        let min_x = (from.x.min(to.x) - radius - 1.0).floor().max(0.0) as i64;
        let min_y = (from.y.min(to.y) - radius - 1.0).floor().max(0.0) as i64;
        let max_x = ((from.x.max(to.x) + radius + 1.0).ceil() as i64).min(self.width as i64 - 1);
        let max_y = ((from.y.max(to.y) + radius + 1.0).ceil() as i64).min(self.height as i64 - 1);
        if min_x > max_x || min_y > max_y {
            return;
        }

        let stride = self.width as usize * 4;
        for y in min_y..=max_y {
            let row = &mut self.pixels[y as usize * stride..(y as usize + 1) * stride];
            let cy = y as f32 + 0.5;
            for x in min_x..=max_x {
                let cx = x as f32 + 0.5;
                let dist = distance_to_segment(cx, cy, from, to);
                // One pixel of linear falloff at the rim.
                let coverage = (radius + 0.5 - dist).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    let idx = x as usize * 4;
                    blend_over(&mut row[idx..idx + 4], rgba, coverage);
                }
            }
        }
    }
}

impl StrokeSink for Surface {
    fn draw_segment(&mut self, from: CanvasPoint, to: CanvasPoint, width: f32, color: BrushColor) {
        self.stroke_segment(from, to, width, color);
    }
}

fn buffer_len(width: u32, height: u32) -> usize {
    (width as usize)
        .saturating_mul(height as usize)
        .saturating_mul(4)
}

fn distance_to_segment(px: f32, py: f32, a: CanvasPoint, b: CanvasPoint) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq <= f32::EPSILON {
        0.0
    } else {
        (((px - a.x) * dx + (py - a.y) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (qx, qy) = (a.x + t * dx, a.y + t * dy);
    ((px - qx).powi(2) + (py - qy).powi(2)).sqrt()
}

fn blend_over(dst: &mut [u8], color: [u8; 4], coverage: f32) {
    let src_a = coverage * (color[3] as f32 / 255.0);
    let dst_a = dst[3] as f32 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= 0.0 {
        return;
    }
    for c in 0..3 {
        let value =
            (color[c] as f32 * src_a + dst[c] as f32 * dst_a * (1.0 - src_a)) / out_a;
        dst[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: BrushColor = BrushColor::rgb(255, 0, 0);

    fn painted() -> Surface {
        let mut surface = Surface::new(64, 48).unwrap();
        surface.stroke_segment(
            CanvasPoint::new(10.0, 24.0),
            CanvasPoint::new(54.0, 24.0),
            8.0,
            RED,
        );
        surface
    }

    #[test]
    fn zero_sized_surfaces_are_rejected() {
        assert_eq!(
            Surface::new(0, 10).unwrap_err(),
            SurfaceError::EmptySize {
                width: 0,
                height: 10
            }
        );
        let mut surface = Surface::new(4, 4).unwrap();
        assert!(surface.resize(4, 0).is_err());
        assert_eq!(surface.width(), 4);
    }

    #[test]
    fn segment_paints_along_its_length_with_round_ends() {
        let surface = painted();
        assert_eq!(surface.pixel(32, 24), Some([255, 0, 0, 255]));
        assert_eq!(surface.pixel(10, 24), Some([255, 0, 0, 255]));
        // Round cap reaches past the endpoint by the radius...
        assert_eq!(surface.pixel(56, 24).unwrap()[3], 255);
        // ...but not into the corner a square cap would cover.
        assert_eq!(surface.pixel(57, 20).unwrap()[3], 0);
        // Far from the segment nothing is painted.
        assert_eq!(surface.pixel(32, 5), Some([0, 0, 0, 0]));
    }

    #[test]
    fn off_canvas_segments_are_clipped() {
        let mut surface = Surface::new(16, 16).unwrap();
        surface.stroke_segment(
            CanvasPoint::new(-50.0, -50.0),
            CanvasPoint::new(-40.0, -40.0),
            6.0,
            RED,
        );
        assert!(surface.is_blank());

        surface.stroke_segment(
            CanvasPoint::new(-10.0, 8.0),
            CanvasPoint::new(30.0, 8.0),
            4.0,
            RED,
        );
        assert_eq!(surface.pixel(0, 8).unwrap()[3], 255);
        assert_eq!(surface.pixel(15, 8).unwrap()[3], 255);
    }

    #[test]
    fn non_finite_points_are_ignored() {
        let mut surface = Surface::new(16, 16).unwrap();
        surface.stroke_segment(
            CanvasPoint::new(f32::NAN, 2.0),
            CanvasPoint::new(8.0, 8.0),
            6.0,
            RED,
        );
        assert!(surface.is_blank());
    }

    #[test]
    fn clear_erases_everything() {
        let mut surface = painted();
        assert!(!surface.is_blank());
        surface.clear();
        assert!(surface.is_blank());
    }

    #[test]
    fn resize_to_same_size_keeps_pixels_identical() {
        let mut surface = painted();
        let before = surface.pixels().to_vec();
        surface.resize(64, 48).unwrap();
        surface.resize(64, 48).unwrap();
        assert_eq!(surface.pixels(), before.as_slice());
    }

    #[test]
    fn resize_scales_existing_content() {
        let mut surface = painted();
        surface.resize(128, 96).unwrap();
        assert_eq!((surface.width(), surface.height()), (128, 96));
        assert_eq!(surface.pixels().len(), 128 * 96 * 4);

        let center = surface.pixel(64, 48).unwrap();
        assert!(center[3] > 200, "stroke lost on resize: {center:?}");
        assert!(center[0] > 200);
        assert_eq!(surface.pixel(64, 4).unwrap()[3], 0);
    }

    #[test]
    fn blank_surface_resizes_to_blank() {
        let mut surface = Surface::new(8, 8).unwrap();
        surface.resize(20, 10).unwrap();
        assert!(surface.is_blank());
        assert_eq!(surface.pixels().len(), 20 * 10 * 4);
    }
}
