use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    HandposeEngine,
    common::{self, CropTransform, HANDPOSE_INPUT_SIZE},
};
use crate::types::{Frame, LandmarkSet};

/// Presence score needed to pick up a hand from the full frame.
pub const DETECTION_CONFIDENCE: f32 = 0.7;
/// Presence score needed to keep following a hand already found.
pub const TRACKING_CONFIDENCE: f32 = 0.5;

/// Raw estimator output for one crop.
#[derive(Clone, Debug)]
pub struct RawHandpose {
    pub landmarks: Vec<f32>,
    pub presence: f32,
}

/// The network itself, separated so the tracking logic can run without it.
pub trait HandposeModel: Send + 'static {
    fn estimate(&mut self, input: Array4<f32>) -> Result<RawHandpose>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct HandEstimate {
    pub landmarks: Option<LandmarkSet>,
    pub confidence: f32,
}

/// Looks for a hand over the whole frame, then follows it with a tighter crop
/// around its last position until the presence score drops.
pub struct HandTracker<M> {
    model: M,
    tracked: Option<LandmarkSet>,
}

impl<M: HandposeModel> HandTracker<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            tracked: None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracked.is_some()
    }
}

impl<M: HandposeModel> HandposeEngine for HandTracker<M> {
    fn infer(&mut self, frame: &Frame) -> Result<HandEstimate> {
        let (transform, threshold) = match &self.tracked {
            Some(previous) => (
                CropTransform::around(previous, frame.width, frame.height, HANDPOSE_INPUT_SIZE),
                TRACKING_CONFIDENCE,
            ),
            None => (
                CropTransform::full_frame(frame.width, frame.height, HANDPOSE_INPUT_SIZE),
                DETECTION_CONFIDENCE,
            ),
        };

        let input = common::prepare_crop(frame, &transform)?;
        let raw = match self.model.estimate(input) {
            Ok(raw) => raw,
            Err(err) => {
                self.tracked = None;
                return Err(err);
            }
        };

        if !(raw.presence >= threshold) {
            if self.tracked.take().is_some() {
                log::debug!("hand lost (presence {:.2})", raw.presence);
            }
            return Ok(HandEstimate {
                landmarks: None,
                confidence: raw.presence.max(0.0),
            });
        }

        let landmarks = common::landmarks_from_output(&raw.landmarks, &transform)?;
        if !self.is_tracking() {
            log::debug!("hand acquired (presence {:.2})", raw.presence);
        }
        self.tracked = Some(landmarks.clone());
        Ok(HandEstimate {
            landmarks: Some(landmarks),
            confidence: raw.presence.min(1.0),
        })
    }
}

/// MediaPipe hand landmark estimator running on ONNX Runtime.
pub struct OrtHandpose {
    session: Session,
}

impl OrtHandpose {
    pub fn new(model_path: &Path) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load ORT session from {}", model_path.display()))?;
        Ok(Self { session })
    }
}

impl HandposeModel for OrtHandpose {
    fn estimate(&mut self, input: Array4<f32>) -> Result<RawHandpose> {
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run handpose session")?;
        if outputs.len() < 2 {
            return Err(anyhow!(
                "handpose model returned {} outputs, expected landmarks and presence",
                outputs.len()
            ));
        }

        let landmarks: Vec<f32> = outputs[0].try_extract_array::<f32>()?.iter().copied().collect();
        let presence = outputs[1]
            .try_extract_array::<f32>()?
            .iter()
            .next()
            .copied()
            .unwrap_or(0.0);
        Ok(RawHandpose {
            landmarks,
            presence,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::{pipeline::recognizer::common::tests::solid_frame, types::NUM_LANDMARKS};

    /// Replays scripted presences and records the crop size each call saw.
    struct ScriptedModel {
        presences: VecDeque<f32>,
        seen_inputs: Vec<usize>,
    }

    impl ScriptedModel {
        fn new(presences: &[f32]) -> Self {
            Self {
                presences: presences.iter().copied().collect(),
                seen_inputs: Vec::new(),
            }
        }
    }

    impl HandposeModel for ScriptedModel {
        fn estimate(&mut self, input: Array4<f32>) -> Result<RawHandpose> {
            self.seen_inputs.push(input.shape()[1]);
            let presence = self
                .presences
                .pop_front()
                .ok_or_else(|| anyhow!("script exhausted"))?;
            // A small hand in the middle of the crop.
            let landmarks = (0..NUM_LANDMARKS)
                .flat_map(|i| [100.0 + i as f32, 110.0, 0.0])
                .collect();
            Ok(RawHandpose {
                landmarks,
                presence,
            })
        }
    }

    #[test]
    fn weak_detection_reports_no_hand() {
        let mut tracker = HandTracker::new(ScriptedModel::new(&[0.6]));
        let estimate = tracker.infer(&solid_frame(64, 48, [0, 0, 0])).unwrap();
        assert!(estimate.landmarks.is_none());
        assert_eq!(estimate.confidence, 0.6);
        assert!(!tracker.is_tracking());
    }

    #[test]
    fn tracking_uses_the_lower_threshold_until_lost() {
        let frame = solid_frame(64, 48, [0, 0, 0]);
        let mut tracker = HandTracker::new(ScriptedModel::new(&[0.9, 0.6, 0.4, 0.6]));

        assert!(tracker.infer(&frame).unwrap().landmarks.is_some());
        assert!(tracker.is_tracking());
        // 0.6 is enough to keep a tracked hand...
        assert!(tracker.infer(&frame).unwrap().landmarks.is_some());
        // ...0.4 is not...
        assert!(tracker.infer(&frame).unwrap().landmarks.is_none());
        assert!(!tracker.is_tracking());
        // ...and 0.6 cannot re-acquire from the full frame.
        assert!(tracker.infer(&frame).unwrap().landmarks.is_none());
    }

    #[test]
    fn landmarks_are_normalized_to_the_frame() {
        let mut tracker = HandTracker::new(ScriptedModel::new(&[0.95]));
        let estimate = tracker.infer(&solid_frame(640, 480, [9, 9, 9])).unwrap();
        let set = estimate.landmarks.unwrap();
        assert!(set
            .points()
            .iter()
            .all(|p| (0.0..=1.0).contains(&p.x) && (0.0..=1.0).contains(&p.y)));
        assert_eq!(tracker.model.seen_inputs, vec![HANDPOSE_INPUT_SIZE as usize]);
    }

    #[test]
    fn model_failure_drops_tracking() {
        let frame = solid_frame(32, 32, [0, 0, 0]);
        let mut tracker = HandTracker::new(ScriptedModel::new(&[0.9]));
        tracker.infer(&frame).unwrap();
        assert!(tracker.is_tracking());
        assert!(tracker.infer(&frame).is_err());
        assert!(!tracker.is_tracking());
    }
}
