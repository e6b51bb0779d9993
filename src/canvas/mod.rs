mod stroke;
mod surface;

pub use stroke::{StrokePhase, StrokeRenderer};
pub use surface::{Surface, SurfaceError};

use crate::{emotion::BrushColor, types::CanvasPoint};

/// Anything strokes can be painted onto.
pub trait StrokeSink {
    fn draw_segment(&mut self, from: CanvasPoint, to: CanvasPoint, width: f32, color: BrushColor);
}
