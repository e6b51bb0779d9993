use super::StrokeSink;
use crate::{emotion::BrushColor, gesture::DrawingSignal, types::CanvasPoint};

/// Where the renderer is within a stroke after an update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrokePhase {
    Idle,
    /// First sample of a new stroke; nothing drawn yet.
    Started,
    /// A segment from the previous sample was drawn.
    Continued,
}

/// Connects consecutive drawing samples into line segments.
///
/// The previous point is forgotten whenever a sample is not drawing or has no
/// cursor, so a pinch released and re-applied elsewhere starts a new stroke
/// instead of jumping a line across the gap.
#[derive(Clone, Debug, Default)]
pub struct StrokeRenderer {
    previous: Option<CanvasPoint>,
}

impl StrokeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update<S>(&mut self, signal: &DrawingSignal, color: BrushColor, sink: &mut S) -> StrokePhase
    where
        S: StrokeSink + ?Sized,
    {
        let cursor = match (signal.is_drawing, signal.cursor) {
            (true, Some(cursor)) => cursor,
            _ => {
                self.previous = None;
                return StrokePhase::Idle;
            }
        };

        let phase = match self.previous {
            Some(previous) => {
                sink.draw_segment(previous, cursor, signal.brush_size, color);
                StrokePhase::Continued
            }
            None => StrokePhase::Started,
        };
        self.previous = Some(cursor);
        phase
    }

    pub fn previous(&self) -> Option<CanvasPoint> {
        self.previous
    }

    /// Keeps an in-progress stroke attached after the canvas is rescaled.
    pub fn rescale(&mut self, sx: f32, sy: f32) {
        if let Some(point) = self.previous.as_mut() {
            point.x *= sx;
            point.y *= sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        segments: Vec<(CanvasPoint, CanvasPoint)>,
    }

    impl StrokeSink for RecordingSink {
        fn draw_segment(&mut self, from: CanvasPoint, to: CanvasPoint, _: f32, _: BrushColor) {
            self.segments.push((from, to));
        }
    }

    const INK: BrushColor = BrushColor::rgb(10, 20, 30);

    fn drawing(x: f32, y: f32) -> DrawingSignal {
        DrawingSignal {
            cursor: Some(CanvasPoint::new(x, y)),
            is_drawing: true,
            depth: 0.5,
            brush_size: 10.0,
        }
    }

    fn hovering(x: f32, y: f32) -> DrawingSignal {
        DrawingSignal {
            is_drawing: false,
            ..drawing(x, y)
        }
    }

    fn no_hand() -> DrawingSignal {
        DrawingSignal {
            cursor: None,
            is_drawing: false,
            depth: 0.5,
            brush_size: 20.0,
        }
    }

    fn run(signals: &[DrawingSignal]) -> (Vec<StrokePhase>, RecordingSink) {
        let mut renderer = StrokeRenderer::new();
        let mut sink = RecordingSink::default();
        let phases = signals
            .iter()
            .map(|s| renderer.update(s, INK, &mut sink))
            .collect();
        (phases, sink)
    }

    #[test]
    fn n_samples_draw_n_minus_one_segments() {
        let points: Vec<DrawingSignal> = (0..6).map(|i| drawing(i as f32 * 10.0, 5.0)).collect();
        let (phases, sink) = run(&points);

        assert_eq!(sink.segments.len(), 5);
        for (i, (from, to)) in sink.segments.iter().enumerate() {
            assert_eq!(*from, CanvasPoint::new(i as f32 * 10.0, 5.0));
            assert_eq!(*to, CanvasPoint::new((i + 1) as f32 * 10.0, 5.0));
        }
        assert_eq!(phases[0], StrokePhase::Started);
        assert!(phases[1..].iter().all(|p| *p == StrokePhase::Continued));
    }

    #[test]
    fn isolated_sample_draws_nothing() {
        let (phases, sink) = run(&[no_hand(), drawing(3.0, 4.0), no_hand()]);
        assert!(sink.segments.is_empty());
        assert_eq!(
            phases,
            vec![StrokePhase::Idle, StrokePhase::Started, StrokePhase::Idle]
        );
    }

    #[test]
    fn lost_hand_breaks_the_stroke() {
        let (_, sink) = run(&[drawing(1.0, 1.0), no_hand(), drawing(50.0, 50.0)]);
        assert!(sink.segments.is_empty());
    }

    #[test]
    fn released_pinch_breaks_the_stroke() {
        let (phases, sink) = run(&[
            drawing(1.0, 1.0),
            drawing(2.0, 2.0),
            hovering(20.0, 20.0),
            drawing(40.0, 40.0),
            drawing(41.0, 41.0),
        ]);
        assert_eq!(
            sink.segments,
            vec![
                (CanvasPoint::new(1.0, 1.0), CanvasPoint::new(2.0, 2.0)),
                (CanvasPoint::new(40.0, 40.0), CanvasPoint::new(41.0, 41.0)),
            ]
        );
        assert_eq!(phases[2], StrokePhase::Idle);
        assert_eq!(phases[3], StrokePhase::Started);
    }

    #[test]
    fn drawing_without_cursor_is_idle() {
        let signal = DrawingSignal {
            cursor: None,
            ..drawing(0.0, 0.0)
        };
        let (phases, sink) = run(&[drawing(1.0, 1.0), signal, drawing(2.0, 2.0)]);
        assert!(sink.segments.is_empty());
        assert_eq!(phases[1], StrokePhase::Idle);
    }

    #[test]
    fn rescale_moves_previous_point() {
        let mut renderer = StrokeRenderer::new();
        let mut sink = RecordingSink::default();
        renderer.update(&drawing(10.0, 20.0), INK, &mut sink);
        renderer.rescale(2.0, 0.5);
        assert_eq!(renderer.previous(), Some(CanvasPoint::new(20.0, 10.0)));
    }
}
