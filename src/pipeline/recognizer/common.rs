use anyhow::{Result, anyhow};
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, Landmark, LandmarkSet, NUM_LANDMARKS, WRIST};

/// Side of the square RGB input the handpose estimator expects.
pub const HANDPOSE_INPUT_SIZE: u32 = 224;

/// Tracking crops cover the previous hand's bounding box this many times over.
const TRACK_CROP_SCALE: f32 = 2.0;
const MIN_TRACK_CROP_PX: f32 = 48.0;

/// Maps model input pixels of a square crop back into the source frame.
#[derive(Clone, Debug, PartialEq)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub output_size: u32,
    pub frame_w: u32,
    pub frame_h: u32,
}

impl CropTransform {
    /// Square covering the whole frame, padded on the short side.
    pub fn full_frame(frame_w: u32, frame_h: u32, output_size: u32) -> Self {
        Self {
            center: (frame_w as f32 / 2.0, frame_h as f32 / 2.0),
            side: frame_w.max(frame_h) as f32,
            output_size,
            frame_w,
            frame_h,
        }
    }

    /// Square around a previously found hand, used while it stays tracked.
    pub fn around(hand: &LandmarkSet, frame_w: u32, frame_h: u32, output_size: u32) -> Self {
        let [min_x, min_y, max_x, max_y] = hand.bounds();
        let (w, h) = (frame_w as f32, frame_h as f32);
        let center = ((min_x + max_x) / 2.0 * w, (min_y + max_y) / 2.0 * h);
        let span = ((max_x - min_x) * w).max((max_y - min_y) * h);
        Self {
            center,
            side: (span * TRACK_CROP_SCALE)
                .max(MIN_TRACK_CROP_PX)
                .min(w.max(h) * TRACK_CROP_SCALE),
            output_size,
            frame_w,
            frame_h,
        }
    }

    fn scale(&self) -> f32 {
        self.side / self.output_size as f32
    }

    /// Model-input pixel to frame pixel.
    pub fn project(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        (
            self.center.0 + (x - half) * self.scale(),
            self.center.1 + (y - half) * self.scale(),
        )
    }
}

/// Samples `transform`'s square out of the frame as an NHWC tensor with RGB
/// in [0, 1]. Area outside the frame reads as black.
pub fn prepare_crop(frame: &Frame, transform: &CropTransform) -> Result<Array4<f32>> {
    check_frame(frame)?;
    let size = transform.output_size as usize;
    let mut data = vec![0f32; size * size * 3];

    data.par_chunks_exact_mut(size * 3)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(3).enumerate() {
                let (src_x, src_y) = transform.project(x as f32 + 0.5, y as f32 + 0.5);
                px.copy_from_slice(&sample_rgb(frame, src_x - 0.5, src_y - 0.5));
            }
        });

    Array4::from_shape_vec((1, size, size, 3), data)
        .map_err(|err| anyhow!("failed to build crop tensor: {err}"))
}

pub fn check_frame(frame: &Frame) -> Result<()> {
    let expected = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.width == 0 || frame.height == 0 || frame.rgba.len() != expected {
        return Err(anyhow!(
            "frame buffer size mismatch: got {} bytes for {}x{}",
            frame.rgba.len(),
            frame.width,
            frame.height
        ));
    }
    Ok(())
}

/// Turns the estimator's flat `[x, y, z] * 21` output (crop pixels) into
/// frame-normalized landmarks. `z` is made relative to the wrist and scaled
/// like `x`.
pub fn landmarks_from_output(flat: &[f32], transform: &CropTransform) -> Result<LandmarkSet> {
    if flat.len() < NUM_LANDMARKS * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            NUM_LANDMARKS * 3
        ));
    }

    let (w, h) = (transform.frame_w as f32, transform.frame_h as f32);
    let wrist_z = flat[WRIST * 3 + 2];
    let points: Vec<Landmark> = flat
        .chunks_exact(3)
        .take(NUM_LANDMARKS)
        .map(|chunk| {
            let (px, py) = transform.project(chunk[0], chunk[1]);
            Landmark::new(
                (px / w).clamp(0.0, 1.0),
                (py / h).clamp(0.0, 1.0),
                (chunk[2] - wrist_z) * transform.scale() / w,
            )
        })
        .collect();

    Ok(LandmarkSet::from_slice(&points)?)
}

fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if !(x.is_finite() && y.is_finite()) {
        return [0.0; 3];
    }
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (w, h) = (frame.width as i64, frame.height as i64);

    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        let (ix, iy) = (cx as i64, cy as i64);
        if ix < 0 || iy < 0 || ix >= w || iy >= h {
            return [0.0; 3];
        }
        let idx = (iy as usize * frame.width as usize + ix as usize) * 4;
        [
            frame.rgba[idx] as f32 / 255.0,
            frame.rgba[idx + 1] as f32 / 255.0,
            frame.rgba[idx + 2] as f32 / 255.0,
        ]
    };

    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1.0, y0);
    let c01 = fetch(x0, y0 + 1.0);
    let c11 = fetch(x0 + 1.0, y0 + 1.0);
    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    std::array::from_fn(|c| lerp(lerp(c00[c], c10[c], fx), lerp(c01[c], c11[c], fx), fy))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Instant;

    pub(crate) fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        Frame {
            rgba: [rgb[0], rgb[1], rgb[2], 255].repeat((width * height) as usize),
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn full_frame_crop_pads_the_short_side() {
        let frame = solid_frame(8, 4, [255, 0, 0]);
        let transform = CropTransform::full_frame(8, 4, 8);
        assert_eq!(transform.side, 8.0);

        let input = prepare_crop(&frame, &transform).unwrap();
        assert_eq!(input.shape(), &[1, 8, 8, 3]);
        // Rows 2..6 hold the frame, the rest is padding.
        assert_eq!(input[[0, 4, 4, 0]], 1.0);
        assert_eq!(input[[0, 0, 4, 0]], 0.0);
        assert_eq!(input[[0, 7, 4, 0]], 0.0);
    }

    #[test]
    fn projection_round_trips_crop_corners() {
        let transform = CropTransform::full_frame(640, 480, 224);
        let (x, y) = transform.project(0.0, 0.0);
        assert!((x - 0.0).abs() < 1e-3 && (y + 80.0).abs() < 1e-3);
        let (x, y) = transform.project(224.0, 112.0);
        assert!((x - 640.0).abs() < 1e-3 && (y - 240.0).abs() < 1e-3);
    }

    #[test]
    fn mismatched_frame_is_rejected() {
        let mut frame = solid_frame(4, 4, [0, 0, 0]);
        frame.rgba.pop();
        assert!(prepare_crop(&frame, &CropTransform::full_frame(4, 4, 4)).is_err());
    }

    #[test]
    fn model_output_is_normalized_to_the_frame() {
        let transform = CropTransform::full_frame(640, 480, 224);
        let mut flat = vec![0f32; NUM_LANDMARKS * 3];
        for (i, chunk) in flat.chunks_exact_mut(3).enumerate() {
            chunk[0] = 112.0;
            chunk[1] = 112.0;
            chunk[2] = 10.0 + i as f32;
        }
        // Index tip in the top-left of the visible frame area.
        flat[8 * 3] = 0.0;
        flat[8 * 3 + 1] = 28.0;

        let set = landmarks_from_output(&flat, &transform).unwrap();
        assert_eq!(set.points().len(), NUM_LANDMARKS);
        let wrist = set.point(WRIST).unwrap();
        assert_eq!((wrist.x, wrist.y, wrist.z), (0.5, 0.5, 0.0));

        let tip = set.index_tip();
        assert!(tip.x.abs() < 1e-6);
        assert!(tip.y.abs() < 1e-6);
        // 8 crop px * (640 / 224) frame px/crop px / 640 frame px.
        assert!((tip.z - 8.0 / 224.0).abs() < 1e-6);
        assert!(set.points().iter().all(|p| (0.0..=1.0).contains(&p.x)));
    }

    #[test]
    fn short_model_output_is_an_error() {
        let transform = CropTransform::full_frame(10, 10, 224);
        assert!(landmarks_from_output(&[0.0; 62], &transform).is_err());
    }

    #[test]
    fn tracking_crop_follows_the_hand() {
        let mut points = [Landmark::new(0.25, 0.5, 0.0); NUM_LANDMARKS];
        points[0] = Landmark::new(0.2, 0.4, 0.0);
        points[1] = Landmark::new(0.3, 0.6, 0.0);
        let hand = LandmarkSet::new(points);

        let transform = CropTransform::around(&hand, 1000, 500, 224);
        assert!((transform.center.0 - 250.0).abs() < 1e-3);
        assert!((transform.center.1 - 250.0).abs() < 1e-3);
        assert!((transform.side - 200.0).abs() < 1e-3);
    }
}
