//! The closed expression vocabulary and everything keyed by it.

use std::fmt;
use std::str::FromStr;

use image::Rgba;

use crate::error::VocabularyError;

/// Expression categories the recognizer can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expression {
    Happy,
    Sad,
    Angry,
    Surprised,
    Fearful,
    Disgusted,
    Neutral,
}

impl Expression {
    /// Fixed iteration order. Ties in dominant selection go to the earlier entry.
    pub const ALL: [Expression; 7] = [
        Expression::Happy,
        Expression::Sad,
        Expression::Angry,
        Expression::Surprised,
        Expression::Fearful,
        Expression::Disgusted,
        Expression::Neutral,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Expression::Happy => "happy",
            Expression::Sad => "sad",
            Expression::Angry => "angry",
            Expression::Surprised => "surprised",
            Expression::Fearful => "fearful",
            Expression::Disgusted => "disgusted",
            Expression::Neutral => "neutral",
        }
    }

    /// Stroke and label color on the overlay.
    pub fn color(&self) -> Rgba<u8> {
        match self {
            Expression::Happy => Rgba([0, 255, 0, 255]),      // lime
            Expression::Sad => Rgba([0, 0, 255, 255]),        // blue
            Expression::Angry => Rgba([255, 0, 0, 255]),      // red
            Expression::Surprised => Rgba([255, 165, 0, 255]), // orange
            Expression::Fearful => Rgba([128, 0, 128, 255]),  // purple
            Expression::Disgusted => Rgba([165, 42, 42, 255]), // brown
            Expression::Neutral => FALLBACK_COLOR,
        }
    }

    fn index(&self) -> usize {
        match self {
            Expression::Happy => 0,
            Expression::Sad => 1,
            Expression::Angry => 2,
            Expression::Surprised => 3,
            Expression::Fearful => 4,
            Expression::Disgusted => 5,
            Expression::Neutral => 6,
        }
    }
}

/// Color for labels outside the vocabulary (white).
pub const FALLBACK_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Color lookup by category label, falling back to white for unknown labels.
pub fn color_for_label(label: &str) -> Rgba<u8> {
    label
        .parse::<Expression>()
        .map(|e| e.color())
        .unwrap_or(FALLBACK_COLOR)
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Expression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Expression::ALL
            .iter()
            .copied()
            .find(|e| e.name() == s)
            .ok_or_else(|| format!("unknown expression: {}", s))
    }
}

/// Checks that every label a detector can emit has a color table entry.
pub fn validate_vocabulary<S: AsRef<str>>(labels: &[S]) -> Result<(), VocabularyError> {
    let unknown: Vec<String> = labels
        .iter()
        .map(|l| l.as_ref())
        .filter(|l| l.parse::<Expression>().is_err())
        .map(str::to_string)
        .collect();

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(VocabularyError { unknown })
    }
}

/// Probability per category for one face.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExpressionScores {
    scores: [f32; 7],
}

impl ExpressionScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds scores from `(category, probability)` pairs. Missing categories score 0.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Expression, f32)>,
    {
        let mut scores = Self::new();
        for (expression, p) in pairs {
            scores.set(expression, p);
        }
        scores
    }

    /// Sets one score, clamped to [0, 1]. NaN becomes 0.
    pub fn set(&mut self, expression: Expression, probability: f32) {
        let p = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        self.scores[expression.index()] = p;
    }

    pub fn get(&self, expression: Expression) -> f32 {
        self.scores[expression.index()]
    }

    /// Scores in the fixed category order.
    pub fn iter(&self) -> impl Iterator<Item = (Expression, f32)> + '_ {
        Expression::ALL.iter().map(move |e| (*e, self.get(*e)))
    }

    /// Category with the highest score; the first maximal one in
    /// [`Expression::ALL`] order wins a tie.
    pub fn dominant(&self) -> Expression {
        let mut best = (Expression::ALL[0], self.get(Expression::ALL[0]));
        for (expression, score) in self.iter().skip(1) {
            if score > best.1 {
                best = (expression, score);
            }
        }
        best.0
    }
}
