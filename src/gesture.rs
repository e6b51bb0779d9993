use crate::{
    config::{BrushConfig, DepthStrategy, GestureConfig},
    types::{CanvasPoint, Landmark, LandmarkSet},
};

/// Depth reported while no hand is visible.
pub const IDLE_DEPTH: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasSize {
    pub width: f32,
    pub height: f32,
}

impl CanvasSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as f32,
            height: height as f32,
        }
    }
}

/// What the hand asks the canvas to do this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawingSignal {
    pub cursor: Option<CanvasPoint>,
    pub is_drawing: bool,
    pub depth: f32,
    pub brush_size: f32,
}

/// Turns one frame's hand landmarks into a [`DrawingSignal`].
#[derive(Clone, Debug)]
pub struct GestureInterpreter {
    gesture: GestureConfig,
    brush: BrushConfig,
}

impl GestureInterpreter {
    pub fn new(gesture: GestureConfig, brush: BrushConfig) -> Self {
        Self { gesture, brush }
    }

    pub fn interpret(&self, hand: Option<&LandmarkSet>, canvas: CanvasSize) -> DrawingSignal {
        let Some(hand) = hand else {
            return self.idle();
        };

        let is_drawing = self.is_pinching(pinch_distance(hand));
        let depth = self.depth(hand);

        DrawingSignal {
            cursor: Some(self.map_cursor(hand.index_tip(), canvas)),
            is_drawing,
            depth,
            brush_size: self.brush_size(depth),
        }
    }

    pub fn idle(&self) -> DrawingSignal {
        DrawingSignal {
            cursor: None,
            is_drawing: false,
            depth: IDLE_DEPTH,
            brush_size: self.brush_size(IDLE_DEPTH),
        }
    }

    pub fn is_pinching(&self, distance: f32) -> bool {
        distance < self.gesture.pinch_threshold
    }

    /// 0 is closest to the camera, 1 is farthest.
    pub fn depth(&self, hand: &LandmarkSet) -> f32 {
        let raw = match self.gesture.depth {
            DepthStrategy::FingertipZ { bias, scale } => (hand.index_tip().z + bias) * scale,
            DepthStrategy::HandSize { scale } => {
                1.0 - hand.index_tip().planar_distance(hand.index_base()) * scale
            }
        };
        if raw.is_nan() {
            IDLE_DEPTH
        } else {
            raw.clamp(0.0, 1.0)
        }
    }

    pub fn brush_size(&self, depth: f32) -> f32 {
        let depth = if depth.is_nan() { IDLE_DEPTH } else { depth.clamp(0.0, 1.0) };
        (self.brush.max_size * (1.0 - depth)).max(self.brush.min_size)
    }

    pub fn map_cursor(&self, point: &Landmark, canvas: CanvasSize) -> CanvasPoint {
        let x = if self.gesture.mirror { 1.0 - point.x } else { point.x };
        CanvasPoint::new(x * canvas.width, point.y * canvas.height)
    }

    pub fn mirrored(&self) -> bool {
        self.gesture.mirror
    }
}

pub fn pinch_distance(hand: &LandmarkSet) -> f32 {
    hand.index_tip().planar_distance(hand.thumb_tip())
}
