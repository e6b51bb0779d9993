use std::{collections::BTreeMap, fmt};

use thiserror::Error;

/// The closed set of expressions the face model reports.
///
/// Declaration order is the tie-break order used by [`EmotionSelector`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Surprised,
    Fearful,
    Disgusted,
    Neutral,
}

impl Emotion {
    pub const COUNT: usize = 7;

    pub const ALL: [Emotion; Emotion::COUNT] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Surprised,
        Emotion::Fearful,
        Emotion::Disgusted,
        Emotion::Neutral,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Surprised => "surprised",
            Emotion::Fearful => "fearful",
            Emotion::Disgusted => "disgusted",
            Emotion::Neutral => "neutral",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Emotion::ALL.into_iter().find(|e| e.label() == label)
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Emotion::Happy => "😊",
            Emotion::Sad => "😢",
            Emotion::Angry => "😠",
            Emotion::Surprised => "😮",
            Emotion::Fearful => "😨",
            Emotion::Disgusted => "🤢",
            Emotion::Neutral => "😐",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-label confidences for one detected face. Unset labels read as 0.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EmotionScores {
    scores: [f32; Emotion::COUNT],
}

impl EmotionScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, emotion: Emotion, confidence: f32) -> Self {
        self.set(emotion, confidence);
        self
    }

    pub fn set(&mut self, emotion: Emotion, confidence: f32) {
        self.scores[emotion.index()] = confidence;
    }

    pub fn get(&self, emotion: Emotion) -> f32 {
        self.scores[emotion.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f32)> + '_ {
        Emotion::ALL.into_iter().map(|e| (e, self.get(e)))
    }

    pub fn total(&self) -> f32 {
        self.scores.iter().sum()
    }

    /// Highest-scoring label; equal scores resolve to the earlier label in
    /// [`Emotion::ALL`]. NaN scores never win.
    pub fn dominant(&self) -> (Emotion, f32) {
        let mut best = (Emotion::Neutral, f32::NEG_INFINITY);
        let mut found = false;
        for (emotion, confidence) in self.iter() {
            if confidence.is_nan() {
                continue;
            }
            if !found || confidence > best.1 {
                best = (emotion, confidence);
                found = true;
            }
        }
        if found { best } else { (Emotion::Neutral, 0.0) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BrushColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl BrushColor {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `hue` in degrees, `saturation`/`lightness` in [0, 1].
    pub fn from_hsl(hue: f32, saturation: f32, lightness: f32) -> Self {
        let h = hue.rem_euclid(360.0) / 60.0;
        let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let m = lightness - c / 2.0;
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let to_u8 = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Self::rgb(to_u8(r), to_u8(g), to_u8(b))
    }

    pub fn parse_hex(raw: &str) -> Option<Self> {
        let hex = raw.strip_prefix('#')?;
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }

    pub fn to_hex(self) -> u32 {
        (u32::from(self.r) << 16) | (u32::from(self.g) << 8) | u32::from(self.b)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaletteError {
    #[error("palette has no color for '{0}'")]
    Missing(Emotion),
    #[error("palette names unknown emotion '{0}'")]
    UnknownLabel(String),
    #[error("palette color for '{label}' is not #rrggbb: '{value}'")]
    BadColor { label: String, value: String },
}

/// Total mapping from every [`Emotion`] to a brush color.
#[derive(Clone, Debug, PartialEq)]
pub struct EmotionPalette {
    colors: [BrushColor; Emotion::COUNT],
}

impl Default for EmotionPalette {
    fn default() -> Self {
        let colors = Emotion::ALL.map(|emotion| match emotion {
            Emotion::Happy => BrushColor::from_hsl(45.0, 1.0, 0.55),
            Emotion::Sad => BrushColor::from_hsl(210.0, 0.8, 0.5),
            Emotion::Angry => BrushColor::from_hsl(0.0, 0.85, 0.55),
            Emotion::Surprised => BrushColor::from_hsl(280.0, 1.0, 0.65),
            Emotion::Fearful => BrushColor::from_hsl(270.0, 0.6, 0.45),
            Emotion::Disgusted => BrushColor::from_hsl(120.0, 0.5, 0.35),
            Emotion::Neutral => BrushColor::from_hsl(220.0, 0.15, 0.4),
        });
        Self { colors }
    }
}

impl EmotionPalette {
    /// Builds a palette from `label -> #rrggbb` entries. Every label must be
    /// present and no other label may appear.
    pub fn from_hex_map(entries: &BTreeMap<String, String>) -> Result<Self, PaletteError> {
        let mut colors: [Option<BrushColor>; Emotion::COUNT] = [None; Emotion::COUNT];
        for (label, value) in entries {
            let emotion = Emotion::from_label(label)
                .ok_or_else(|| PaletteError::UnknownLabel(label.clone()))?;
            let color = BrushColor::parse_hex(value).ok_or_else(|| PaletteError::BadColor {
                label: label.clone(),
                value: value.clone(),
            })?;
            colors[emotion.index()] = Some(color);
        }

        let mut resolved = [BrushColor::rgb(0, 0, 0); Emotion::COUNT];
        for emotion in Emotion::ALL {
            resolved[emotion.index()] =
                colors[emotion.index()].ok_or(PaletteError::Missing(emotion))?;
        }
        Ok(Self { colors: resolved })
    }

    pub fn color(&self, emotion: Emotion) -> BrushColor {
        self.colors[emotion.index()]
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmotionReading {
    pub emotion: Emotion,
    pub confidence: f32,
    pub color: BrushColor,
}

/// Tracks the dominant expression across frames. Frames without a face keep
/// the previous reading.
#[derive(Clone, Debug)]
pub struct EmotionSelector {
    palette: EmotionPalette,
    current: EmotionReading,
}

impl EmotionSelector {
    pub fn new(palette: EmotionPalette) -> Self {
        let current = EmotionReading {
            emotion: Emotion::Neutral,
            confidence: 0.0,
            color: palette.color(Emotion::Neutral),
        };
        Self { palette, current }
    }

    pub fn observe(&mut self, scores: Option<&EmotionScores>) -> EmotionReading {
        if let Some(scores) = scores {
            let (emotion, confidence) = scores.dominant();
            self.current = EmotionReading {
                emotion,
                confidence,
                color: self.palette.color(emotion),
            };
        }
        self.current
    }

    pub fn current(&self) -> EmotionReading {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominant_picks_highest_confidence() {
        let scores = EmotionScores::new()
            .with(Emotion::Sad, 0.2)
            .with(Emotion::Surprised, 0.7)
            .with(Emotion::Neutral, 0.1);
        assert_eq!(scores.dominant(), (Emotion::Surprised, 0.7));
    }

    #[test]
    fn ties_resolve_in_fixed_label_order() {
        let scores = EmotionScores::new()
            .with(Emotion::Neutral, 0.4)
            .with(Emotion::Angry, 0.4)
            .with(Emotion::Sad, 0.2);
        assert_eq!(scores.dominant().0, Emotion::Angry);

        let all_equal = Emotion::ALL
            .into_iter()
            .fold(EmotionScores::new(), |s, e| s.with(e, 1.0 / 7.0));
        assert_eq!(all_equal.dominant().0, Emotion::Happy);
    }

    #[test]
    fn nan_scores_never_win() {
        let scores = EmotionScores::new()
            .with(Emotion::Happy, f32::NAN)
            .with(Emotion::Fearful, 0.3);
        assert_eq!(scores.dominant().0, Emotion::Fearful);
    }

    #[test]
    fn absent_face_keeps_previous_emotion() {
        let mut selector = EmotionSelector::new(EmotionPalette::default());
        let happy = EmotionScores::new().with(Emotion::Happy, 0.9);

        let frames = [Some(&happy), None, None];
        let seen: Vec<Emotion> = frames
            .into_iter()
            .map(|scores| selector.observe(scores).emotion)
            .collect();

        assert_eq!(seen, vec![Emotion::Happy; 3]);
        assert_eq!(selector.current().confidence, 0.9);
    }

    #[test]
    fn selector_starts_neutral() {
        let selector = EmotionSelector::new(EmotionPalette::default());
        let reading = selector.current();
        assert_eq!(reading.emotion, Emotion::Neutral);
        assert_eq!(reading.confidence, 0.0);
        assert_eq!(reading.color, EmotionPalette::default().color(Emotion::Neutral));
    }

    #[test]
    fn reading_color_follows_palette() {
        let palette = EmotionPalette::default();
        let mut selector = EmotionSelector::new(palette.clone());
        let reading = selector.observe(Some(&EmotionScores::new().with(Emotion::Angry, 0.8)));
        assert_eq!(reading.color, palette.color(Emotion::Angry));
    }

    #[test]
    fn default_palette_matches_hsl_values() {
        let palette = EmotionPalette::default();
        assert_eq!(palette.color(Emotion::Happy), BrushColor::rgb(255, 198, 26));
        assert_eq!(palette.color(Emotion::Angry), BrushColor::rgb(238, 43, 43));
    }

    #[test]
    fn every_label_round_trips_through_from_label() {
        for emotion in Emotion::ALL {
            assert_eq!(Emotion::from_label(emotion.label()), Some(emotion));
        }
        assert_eq!(Emotion::from_label("contempt"), None);
    }

    fn full_palette() -> BTreeMap<String, String> {
        Emotion::ALL
            .into_iter()
            .map(|e| (e.label().to_string(), "#102030".to_string()))
            .collect()
    }

    #[test]
    fn palette_override_must_be_total() {
        let mut entries = full_palette();
        let palette = EmotionPalette::from_hex_map(&entries).unwrap();
        assert_eq!(palette.color(Emotion::Sad), BrushColor::rgb(0x10, 0x20, 0x30));

        entries.remove("fearful");
        assert_eq!(
            EmotionPalette::from_hex_map(&entries),
            Err(PaletteError::Missing(Emotion::Fearful))
        );
    }

    #[test]
    fn palette_override_rejects_unknown_labels_and_bad_colors() {
        let mut entries = full_palette();
        entries.insert("contempt".into(), "#000000".into());
        assert_eq!(
            EmotionPalette::from_hex_map(&entries),
            Err(PaletteError::UnknownLabel("contempt".into()))
        );

        let mut entries = full_palette();
        entries.insert("happy".into(), "yellow".into());
        assert!(matches!(
            EmotionPalette::from_hex_map(&entries),
            Err(PaletteError::BadColor { .. })
        ));
    }

    #[test]
    fn hex_parsing() {
        assert_eq!(BrushColor::parse_hex("#ff8000"), Some(BrushColor::rgb(255, 128, 0)));
        assert_eq!(BrushColor::parse_hex("ff8000"), None);
        assert_eq!(BrushColor::parse_hex("#ff80"), None);
        assert_eq!(BrushColor::parse_hex("#gg8000"), None);
        assert_eq!(BrushColor::rgb(255, 128, 0).to_hex(), 0xff8000);
    }
}
