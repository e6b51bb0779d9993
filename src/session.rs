use crate::{
    canvas::{StrokePhase, StrokeRenderer, Surface, SurfaceError},
    config::AppConfig,
    emotion::{EmotionPalette, EmotionReading, EmotionScores, EmotionSelector, PaletteError},
    gesture::{CanvasSize, DrawingSignal, GestureInterpreter},
    types::{HandSample, LandmarkSet},
};

/// Everything that changes while drawing: the emotion reading, the stroke in
/// progress and the painted surface. Call [`DrawingSession::on_frame`] once per
/// hand sample from whatever drives the frame loop.
pub struct DrawingSession {
    interpreter: GestureInterpreter,
    selector: EmotionSelector,
    renderer: StrokeRenderer,
    surface: Surface,
    last_signal: DrawingSignal,
    last_phase: StrokePhase,
}

impl DrawingSession {
    pub fn new(
        interpreter: GestureInterpreter,
        selector: EmotionSelector,
        surface: Surface,
    ) -> Self {
        let last_signal = interpreter.idle();
        Self {
            interpreter,
            selector,
            renderer: StrokeRenderer::new(),
            surface,
            last_signal,
            last_phase: StrokePhase::Idle,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        width: u32,
        height: u32,
    ) -> Result<Self, SessionSetupError> {
        let palette = match &config.emotion.palette {
            Some(entries) => EmotionPalette::from_hex_map(entries)?,
            None => EmotionPalette::default(),
        };
        Ok(Self::new(
            GestureInterpreter::new(config.gesture.clone(), config.brush.clone()),
            EmotionSelector::new(palette),
            Surface::new(width, height)?,
        ))
    }

    pub fn on_frame(
        &mut self,
        hand: Option<&LandmarkSet>,
        scores: Option<&EmotionScores>,
    ) -> DrawingSignal {
        let reading = self.selector.observe(scores);
        let canvas = CanvasSize::new(self.surface.width(), self.surface.height());
        let signal = self.interpreter.interpret(hand, canvas);

        let phase = self
            .renderer
            .update(&signal, reading.color, &mut self.surface);
        if phase != self.last_phase {
            log::trace!("stroke {:?} -> {:?}", self.last_phase, phase);
        }

        self.last_phase = phase;
        self.last_signal = signal;
        signal
    }

    /// Feeds one hand worker result. When samples were lost before it, the
    /// pen is lifted first as if the hand had left the frame.
    pub fn on_hand_sample(&mut self, sample: &HandSample) -> DrawingSignal {
        if sample.after_dropped {
            self.on_frame(None, None);
        }
        self.on_frame(sample.landmarks.as_ref(), None)
    }

    /// Feeds an expression result that arrived without a hand sample.
    pub fn observe_emotion(&mut self, scores: Option<&EmotionScores>) -> EmotionReading {
        self.selector.observe(scores)
    }

    /// Erases the painting. The stroke in progress, if any, carries on.
    pub fn clear(&mut self) {
        self.surface.clear();
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        let (old_w, old_h) = (self.surface.width(), self.surface.height());
        self.surface.resize(width, height)?;
        if (old_w, old_h) != (width, height) {
            self.renderer
                .rescale(width as f32 / old_w as f32, height as f32 / old_h as f32);
        }
        Ok(())
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn last_signal(&self) -> &DrawingSignal {
        &self.last_signal
    }

    pub fn stroke_phase(&self) -> StrokePhase {
        self.last_phase
    }

    pub fn emotion(&self) -> EmotionReading {
        self.selector.current()
    }

    pub fn mirrored(&self) -> bool {
        self.interpreter.mirrored()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionSetupError {
    #[error(transparent)]
    Palette(#[from] PaletteError),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{emotion::Emotion, gesture::tests::hand, types::Landmark};

    fn session() -> DrawingSession {
        DrawingSession::from_config(&AppConfig::default(), 200, 100).unwrap()
    }

    /// Pinching hand whose index tip sits at the given normalized position.
    pub(crate) fn pinch_at(x: f32, y: f32) -> LandmarkSet {
        hand(Landmark::new(x, y, -0.05), Landmark::new(x + 0.01, y, 0.0))
    }

    fn open_at(x: f32, y: f32) -> LandmarkSet {
        hand(Landmark::new(x, y, -0.05), Landmark::new(x + 0.2, y, 0.0))
    }

    #[test]
    fn consecutive_pinches_paint_a_connected_line() {
        let mut session = session();
        session.on_frame(Some(&pinch_at(0.8, 0.5)), None);
        assert!(session.surface().is_blank());

        let signal = session.on_frame(Some(&pinch_at(0.2, 0.5)), None);
        assert!(signal.is_drawing);
        assert_eq!(session.stroke_phase(), StrokePhase::Continued);

        // Mirrored: x = 0.8 -> 40px, x = 0.2 -> 160px; the line spans between.
        for x in [45, 100, 155] {
            assert_eq!(session.surface().pixel(x, 50).unwrap()[3], 255, "gap at x={x}");
        }
    }

    #[test]
    fn lost_hand_does_not_bridge_the_gap() {
        let mut session = session();
        session.on_frame(Some(&pinch_at(0.8, 0.5)), None);
        let idle = session.on_frame(None, None);
        assert!(!idle.is_drawing);
        assert!(idle.cursor.is_none());
        session.on_frame(Some(&pinch_at(0.2, 0.5)), None);

        assert!(session.surface().is_blank());
    }

    #[test]
    fn sample_after_dropped_ones_starts_a_new_stroke() {
        let mut session = session();
        let sample = |x: f32, after_dropped: bool| HandSample {
            landmarks: Some(pinch_at(x, 0.5)),
            confidence: 0.9,
            after_dropped,
        };
        session.on_hand_sample(&sample(0.8, false));
        session.on_hand_sample(&sample(0.2, true));
        assert_eq!(session.stroke_phase(), StrokePhase::Started);
        assert_eq!(session.surface().pixel(100, 50).unwrap()[3], 0);

        session.on_hand_sample(&sample(0.8, false));
        assert_eq!(session.stroke_phase(), StrokePhase::Continued);
        assert_eq!(session.surface().pixel(100, 50).unwrap()[3], 255);
    }

    #[test]
    fn open_hand_moves_cursor_without_painting() {
        let mut session = session();
        session.on_frame(Some(&open_at(0.3, 0.3)), None);
        let signal = session.on_frame(Some(&open_at(0.4, 0.4)), None);
        assert!(!signal.is_drawing);
        assert!(signal.cursor.is_some());
        assert!(session.surface().is_blank());
    }

    #[test]
    fn strokes_use_the_current_emotion_color() {
        let mut session = session();
        let sad = EmotionScores::new().with(Emotion::Sad, 0.9);
        session.on_frame(Some(&pinch_at(0.8, 0.5)), Some(&sad));
        session.on_frame(Some(&pinch_at(0.2, 0.5)), None);

        let expected = EmotionPalette::default().color(Emotion::Sad).to_rgba();
        assert_eq!(session.surface().pixel(100, 50), Some(expected));
        assert_eq!(session.emotion().emotion, Emotion::Sad);
    }

    #[test]
    fn emotion_and_hand_samples_arrive_independently() {
        let mut session = session();
        let happy = EmotionScores::new().with(Emotion::Happy, 0.6);
        session.observe_emotion(Some(&happy));
        session.on_frame(None, None);
        session.observe_emotion(None);
        session.on_frame(Some(&open_at(0.5, 0.5)), None);
        assert_eq!(session.emotion().emotion, Emotion::Happy);
    }

    #[test]
    fn clear_mid_stroke_keeps_continuity() {
        let mut session = session();
        session.on_frame(Some(&pinch_at(0.8, 0.5)), None);
        session.on_frame(Some(&pinch_at(0.6, 0.5)), None);
        session.clear();
        assert!(session.surface().is_blank());

        session.on_frame(Some(&pinch_at(0.4, 0.5)), None);
        assert_eq!(session.stroke_phase(), StrokePhase::Continued);
        // Only the segment drawn after the clear (80px -> 120px) is visible.
        assert_eq!(session.surface().pixel(100, 50).unwrap()[3], 255);
        assert_eq!(session.surface().pixel(60, 50).unwrap()[3], 0);
    }

    #[test]
    fn resize_keeps_painting_and_stroke_position() {
        let mut session = session();
        session.on_frame(Some(&pinch_at(0.8, 0.5)), None);
        session.on_frame(Some(&pinch_at(0.2, 0.5)), None);

        session.resize(400, 200).unwrap();
        assert_eq!(session.surface().pixel(200, 100).unwrap()[3], 255);

        session.resize(400, 200).unwrap();
        assert_eq!(session.surface().width(), 400);
        assert!(session.resize(0, 200).is_err());
    }

    #[test]
    fn incomplete_palette_is_a_setup_error() {
        let mut config = AppConfig::default();
        config.emotion.palette = Some(
            [("happy".to_string(), "#ffffff".to_string())]
                .into_iter()
                .collect(),
        );
        assert!(matches!(
            DrawingSession::from_config(&config, 10, 10),
            Err(SessionSetupError::Palette(PaletteError::Missing(_)))
        ));
    }
}
