//! Per-tick expression counts and the text they drive.

use crate::expression::Expression;

/// A face and the category it is labelled with this tick.
pub trait Labelled {
    fn dominant(&self) -> Expression;
}

/// Category counts for one tick, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpressionTally {
    counts: Vec<(Expression, usize)>,
}

impl ExpressionTally {
    pub fn count(&self, expression: Expression) -> usize {
        self.counts
            .iter()
            .find(|(e, _)| *e == expression)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Expression, usize)> + '_ {
        self.counts.iter().copied()
    }

    fn add(&mut self, expression: Expression) {
        match self.counts.iter_mut().find(|(e, _)| *e == expression) {
            Some((_, n)) => *n += 1,
            None => self.counts.push((expression, 1)),
        }
    }
}

/// Counts faces by dominant expression. No state carries over between calls.
pub fn tally<T: Labelled>(faces: &[T]) -> ExpressionTally {
    let mut tally = ExpressionTally::default();
    for face in faces {
        tally.add(face.dominant());
    }
    tally
}

/// What the summary widgets show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryView {
    pub face_count: usize,
    pub tally: ExpressionTally,
}

impl SummaryView {
    pub fn empty() -> Self {
        Self {
            face_count: 0,
            tally: ExpressionTally::default(),
        }
    }

    pub fn from_tally(tally: ExpressionTally) -> Self {
        Self {
            face_count: tally.total(),
            tally,
        }
    }

    pub fn count_label(&self) -> String {
        format!("Faces detected: {}", self.face_count)
    }

    /// The expression panel is hidden when no faces are in view.
    pub fn panel_visible(&self) -> bool {
        self.face_count > 0
    }

    /// `category: count` lines in first-seen order.
    pub fn lines(&self) -> Vec<String> {
        self.tally
            .iter()
            .map(|(expression, count)| format!("{}: {}", expression, count))
            .collect()
    }
}

impl Default for SummaryView {
    fn default() -> Self {
        Self::empty()
    }
}
