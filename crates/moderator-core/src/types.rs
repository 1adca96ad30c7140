//! Core types for Moderator

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Text submitted for classification: one string or a list of strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextInput {
    /// A single comment
    Single(String),

    /// Several comments scored in one forward pass
    Batch(Vec<String>),
}

impl TextInput {
    /// Number of texts carried by this input
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Batch(texts) => texts.len(),
        }
    }

    /// True for an empty batch
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the caller sent a bare string
    pub fn is_single(&self) -> bool {
        matches!(self, Self::Single(_))
    }

    /// Borrow the texts in input order
    pub fn texts(&self) -> Vec<&str> {
        match self {
            Self::Single(text) => vec![text.as_str()],
            Self::Batch(texts) => texts.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for TextInput {
    fn from(text: &str) -> Self {
        Self::Single(text.to_string())
    }
}

impl From<String> for TextInput {
    fn from(text: String) -> Self {
        Self::Single(text)
    }
}

impl From<Vec<String>> for TextInput {
    fn from(texts: Vec<String>) -> Self {
        Self::Batch(texts)
    }
}

/// Body of `POST /moderate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationRequest {
    /// Text to classify
    pub content: TextInput,
}

impl ModerationRequest {
    /// Create a request for a single text
    pub fn new(content: impl Into<TextInput>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Check the request beyond what deserialization enforces
    pub fn validate(&self, max_batch_size: usize) -> Result<()> {
        if self.content.is_empty() {
            return Err(Error::validation("content must contain at least one text"));
        }

        if self.content.len() > max_batch_size {
            return Err(Error::validation(format!(
                "content contains {} texts, the limit is {}",
                self.content.len(),
                max_batch_size
            )));
        }

        Ok(())
    }
}

/// Scores for one class: a float for a single input, a list for a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scores {
    /// Score of the only input
    Single(f32),

    /// One score per input, in request order
    Batch(Vec<f32>),
}

impl Scores {
    /// Flatten to a list of scores
    pub fn values(&self) -> Vec<f32> {
        match self {
            Self::Single(score) => vec![*score],
            Self::Batch(scores) => scores.clone(),
        }
    }
}

/// Body returned by `POST /moderate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationResponse {
    /// Class name to score(s), in the model's class order
    pub results: IndexMap<String, Scores>,
}

impl ModerationResponse {
    /// Per-class scores of the first input, in class order
    pub fn first_scores(&self) -> Vec<(String, f32)> {
        self.results
            .iter()
            .filter_map(|(label, scores)| {
                scores.values().first().map(|score| (label.clone(), *score))
            })
            .collect()
    }
}

/// Sigmoid outputs of the model for a set of inputs
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Public class names, one per output column
    pub labels: Vec<String>,

    /// Probabilities indexed as `[input][class]`
    pub probabilities: Vec<Vec<f32>>,

    /// Whether the input was a bare string
    pub single: bool,
}

impl Prediction {
    /// Build a prediction, checking every row has one score per label
    pub fn new(labels: Vec<String>, probabilities: Vec<Vec<f32>>, single: bool) -> Result<Self> {
        if let Some(row) = probabilities.iter().find(|row| row.len() != labels.len()) {
            return Err(Error::model(format!(
                "model produced {} scores for {} classes",
                row.len(),
                labels.len()
            )));
        }

        Ok(Self {
            labels,
            probabilities,
            single,
        })
    }

    /// Scores of a single input keyed by class
    pub fn scores_for(&self, index: usize) -> Option<Vec<(String, f32)>> {
        self.probabilities.get(index).map(|row| {
            self.labels
                .iter()
                .cloned()
                .zip(row.iter().copied())
                .collect()
        })
    }

    /// Per-input verdicts at the given threshold
    pub fn verdicts(&self, threshold: f32) -> Vec<Verdict> {
        (0..self.probabilities.len())
            .filter_map(|idx| self.scores_for(idx))
            .map(|scores| Verdict::from_scores(scores, threshold))
            .collect()
    }

    /// Convert to the wire shape: floats for a single input, lists for a batch
    pub fn into_response(self) -> ModerationResponse {
        let mut results = IndexMap::with_capacity(self.labels.len());

        for (class_idx, label) in self.labels.into_iter().enumerate() {
            let column: Vec<f32> = self
                .probabilities
                .iter()
                .map(|row| row[class_idx])
                .collect();

            let scores = if self.single {
                Scores::Single(column.first().copied().unwrap_or_default())
            } else {
                Scores::Batch(column)
            };

            results.insert(label, scores);
        }

        ModerationResponse { results }
    }
}

/// Thresholded reading of a score map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// True when at least one class is tagged
    pub is_toxic: bool,

    /// Classes whose score is strictly above the threshold
    pub tags: Vec<String>,
}

impl Verdict {
    /// Tag every class scoring above `threshold`
    pub fn from_scores<I, S>(scores: I, threshold: f32) -> Self
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        let tags: Vec<String> = scores
            .into_iter()
            .filter(|(_, score)| *score > threshold)
            .map(|(label, _)| label.into())
            .collect();

        Self {
            is_toxic: !tags.is_empty(),
            tags,
        }
    }
}

/// Body returned by `POST /moderate/verdict`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictResponse {
    /// One verdict per input text
    pub verdicts: Vec<Verdict>,
}
