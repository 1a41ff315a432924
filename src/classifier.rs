use image::DynamicImage;
use log::debug;
use serde::Serialize;
use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::labels::Labels;
use crate::model::InferenceModel;
use crate::models::{LabelScore, Prediction};
use crate::preprocess::Preprocessor;

/// What the model's output layer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Raw logits, softmax is applied
    #[default]
    Logits,
    /// Already normalized probabilities
    Probabilities,
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|x| x / sum).collect()
}

/// Indices and scores of the `k` largest entries, largest first. Equal
/// scores keep their index order.
pub fn top_k(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| match (a.1.is_nan(), b.1.is_nan()) {
        (false, false) => b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal),
        (nan_a, nan_b) => nan_a.cmp(&nan_b),
    });
    ranked.truncate(k);
    ranked
}

pub struct Classifier {
    model: Box<dyn InferenceModel>,
    labels: Labels,
    preprocessor: Preprocessor,
    output: OutputKind,
    top_k: usize,
}

impl Classifier {
    pub fn new(
        model: Box<dyn InferenceModel>,
        labels: Labels,
        preprocessor: Preprocessor,
        output: OutputKind,
        top_k: usize,
    ) -> Self {
        Self {
            model,
            labels,
            preprocessor,
            output,
            top_k,
        }
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn preprocessor(&self) -> Preprocessor {
        self.preprocessor
    }

    pub fn output(&self) -> OutputKind {
        self.output
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn predict(&self, image: &DynamicImage) -> Result<Prediction> {
        let input = self.preprocessor.tensor(image);
        let scores = self.model.run(input)?;

        if scores.len() != self.labels.len() {
            return Err(Error::LabelMismatch {
                outputs: scores.len(),
                labels: self.labels.len(),
            });
        }

        if let Some(index) = scores.iter().position(|score| !score.is_finite()) {
            return Err(Error::Model(format!(
                "model produced a non-finite score ({}) for class {}",
                scores[index], index
            )));
        }

        let probabilities = match self.output {
            OutputKind::Logits => softmax(&scores),
            OutputKind::Probabilities => scores,
        };

        let top_predictions: Vec<LabelScore> = top_k(&probabilities, self.top_k)
            .into_iter()
            .filter_map(|(index, probability)| {
                self.labels.get(index).map(|label| LabelScore {
                    label: label.to_string(),
                    probability,
                })
            })
            .collect();

        let best = top_predictions
            .first()
            .cloned()
            .ok_or_else(|| Error::Model("model produced no scores".to_string()))?;

        debug!("Top prediction {} ({:.4})", best.label, best.probability);

        Ok(Prediction {
            predicted_class: best.label,
            confidence: best.probability,
            top_predictions,
            all_probabilities: Some(probabilities),
        })
    }
}
