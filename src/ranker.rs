use std::fmt;

use serde::Serialize;

use crate::labels::LabelList;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranked {
    pub index: usize,
    pub label: String,
    pub score: f32,
}

/// Top-N (label, score) pairs, best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    /// Length of the raw score vector, before truncation to the label list.
    pub dim: usize,
    entries: Vec<Ranked>,
}

impl RankedResult {
    pub fn top(&self) -> Option<&Ranked> {
        self.entries.first()
    }

    pub fn entries(&self) -> &[Ranked] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pairs(&self) -> Vec<(&str, f32)> {
        self.entries
            .iter()
            .map(|r| (r.label.as_str(), r.score))
            .collect()
    }
}

impl fmt::Display for RankedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scores:{}", self.dim)?;
        for r in &self.entries {
            writeln!(f, "{} : {}", r.label, r.score)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResultRanker {
    top_n: usize,
}

impl ResultRanker {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Pairs scores with labels by position and keeps the `top_n` best.
    /// Equal scores keep their index order; NaN ranks last.
    pub fn rank(&self, scores: &[f32], labels: &LabelList) -> RankedResult {
        let pairs = scores.len().min(labels.len());
        if scores.len() != labels.len() {
            tracing::warn!(
                scores = scores.len(),
                labels = labels.len(),
                kept = pairs,
                "score vector and label list differ in length; ranking the overlap only"
            );
        }

        let mut entries: Vec<Ranked> = scores[..pairs]
            .iter()
            .enumerate()
            .filter_map(|(index, &score)| {
                labels.get(index).map(|label| Ranked {
                    index,
                    label: label.to_string(),
                    score,
                })
            })
            .collect();
        // stable: ties stay in index order
        entries.sort_by(|a, b| sort_key(b.score).total_cmp(&sort_key(a.score)));
        entries.truncate(self.top_n);

        RankedResult {
            dim: scores.len(),
            entries,
        }
    }
}

fn sort_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}
