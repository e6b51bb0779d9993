use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_ENV_VAR: &str = "MOOD_CANVAS_CONFIG";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("pinch threshold must be a positive number, got {0}")]
    PinchThreshold(f32),
    #[error("depth {name} must be a positive number, got {value}")]
    DepthParameter { name: &'static str, value: f32 },
    #[error("brush sizes must satisfy 0 < min ({min}) <= max ({max})")]
    BrushRange { min: f32, max: f32 },
    #[error("emotion poll interval must be at least 1 ms")]
    PollInterval,
    #[error("minimum face confidence must be within [0, 1], got {0}")]
    FaceConfidence(f32),
}

/// How the hand's distance to the camera is estimated.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DepthStrategy {
    /// `clamp((z + bias) * scale)` on the index fingertip depth.
    FingertipZ {
        #[serde(default = "default_fingertip_bias")]
        bias: f32,
        #[serde(default = "default_fingertip_scale")]
        scale: f32,
    },
    /// `clamp(1 - |tip - knuckle| * scale)`; a bigger hand on screen is closer.
    HandSize {
        #[serde(default = "default_hand_size_scale")]
        scale: f32,
    },
}

fn default_fingertip_bias() -> f32 {
    0.1
}

fn default_fingertip_scale() -> f32 {
    5.0
}

fn default_hand_size_scale() -> f32 {
    3.0
}

impl Default for DepthStrategy {
    fn default() -> Self {
        DepthStrategy::FingertipZ {
            bias: default_fingertip_bias(),
            scale: default_fingertip_scale(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct GestureConfig {
    pub pinch_threshold: f32,
    pub depth: DepthStrategy,
    /// Mirror the cursor (and the camera preview) horizontally.
    pub mirror: bool,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            pinch_threshold: 0.06,
            depth: DepthStrategy::default(),
            mirror: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrushConfig {
    pub min_size: f32,
    pub max_size: f32,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            min_size: 4.0,
            max_size: 40.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmotionConfig {
    pub poll_interval_ms: u64,
    pub min_face_confidence: f32,
    /// Full replacement palette, label -> `#rrggbb`. Must name all 7 labels.
    pub palette: Option<BTreeMap<String, String>>,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            min_face_confidence: 0.35,
            palette: None,
        }
    }
}

impl EmotionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub dir: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub gesture: GestureConfig,
    pub brush: BrushConfig,
    pub emotion: EmotionConfig,
    pub models: ModelConfig,
}

impl AppConfig {
    /// Reads the file named by [`CONFIG_ENV_VAR`], or returns defaults when the
    /// variable is unset.
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_json(&raw)
            .with_context(|| format!("invalid config {}", path.display()))?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let config: AppConfig = serde_json::from_str(raw).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.gesture.pinch_threshold;
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(ConfigError::PinchThreshold(threshold));
        }

        let positive = |name: &'static str, value: f32| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::DepthParameter { name, value })
            }
        };
        match self.gesture.depth {
            DepthStrategy::FingertipZ { bias, scale } => {
                if !bias.is_finite() {
                    return Err(ConfigError::DepthParameter {
                        name: "bias",
                        value: bias,
                    });
                }
                positive("scale", scale)?;
            }
            DepthStrategy::HandSize { scale } => positive("scale", scale)?,
        }

        let BrushConfig { min_size, max_size } = self.brush;
        if !(min_size > 0.0 && min_size <= max_size && max_size.is_finite()) {
            return Err(ConfigError::BrushRange {
                min: min_size,
                max: max_size,
            });
        }

        if self.emotion.poll_interval_ms == 0 {
            return Err(ConfigError::PollInterval);
        }
        let face = self.emotion.min_face_confidence;
        if !(0.0..=1.0).contains(&face) {
            return Err(ConfigError::FaceConfidence(face));
        }

        Ok(())
    }
}
