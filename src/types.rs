use std::time::Instant;

use thiserror::Error;

use crate::emotion::EmotionScores;

pub const NUM_LANDMARKS: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_FINGER_MCP: usize = 5;
pub const INDEX_FINGER_TIP: usize = 8;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

/// One tracked point. `x`/`y` are fractions of the frame width/height, `z` is
/// depth relative to the wrist (more negative is closer to the camera).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Distance in the image plane; depth is ignored.
    pub fn planar_distance(&self, other: &Landmark) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LandmarkError {
    #[error("hand landmark set needs exactly {NUM_LANDMARKS} points, got {0}")]
    WrongCount(usize),
}

/// A full hand: always exactly [`NUM_LANDMARKS`] points in anatomical order.
#[derive(Clone, Debug, PartialEq)]
pub struct LandmarkSet {
    points: [Landmark; NUM_LANDMARKS],
}

impl LandmarkSet {
    pub fn new(points: [Landmark; NUM_LANDMARKS]) -> Self {
        Self { points }
    }

    pub fn from_slice(points: &[Landmark]) -> Result<Self, LandmarkError> {
        let points: [Landmark; NUM_LANDMARKS] = points
            .try_into()
            .map_err(|_| LandmarkError::WrongCount(points.len()))?;
        Ok(Self { points })
    }

    pub fn point(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }

    pub fn thumb_tip(&self) -> &Landmark {
        &self.points[THUMB_TIP]
    }

    pub fn index_tip(&self) -> &Landmark {
        &self.points[INDEX_FINGER_TIP]
    }

    pub fn index_base(&self) -> &Landmark {
        &self.points[INDEX_FINGER_MCP]
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    /// Normalized bounding box as `[min_x, min_y, max_x, max_y]`.
    pub fn bounds(&self) -> [f32; 4] {
        self.points.iter().fold(
            [f32::MAX, f32::MAX, f32::MIN, f32::MIN],
            |acc, p| [acc[0].min(p.x), acc[1].min(p.y), acc[2].max(p.x), acc[3].max(p.y)],
        )
    }
}

#[derive(Clone, Debug)]
pub struct HandSample {
    pub landmarks: Option<LandmarkSet>,
    pub confidence: f32,
    /// Earlier samples were dropped on a full queue; the stroke must not
    /// bridge over them.
    pub after_dropped: bool,
}

impl HandSample {
    pub fn missing() -> Self {
        Self {
            landmarks: None,
            confidence: 0.0,
            after_dropped: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExpressionSample {
    pub scores: Option<EmotionScores>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasPoint {
    pub x: f32,
    pub y: f32,
}

impl CanvasPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}
