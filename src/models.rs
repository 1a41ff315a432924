use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

use crate::classifier::OutputKind;
use crate::preprocess::{ImageDetails, ResizeMode, Upload};

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LabelScore {
    pub label: String,
    pub probability: f32,
}

#[derive(Debug, Serialize, Clone)]
pub struct Prediction {
    pub predicted_class: String,
    pub confidence: f32,
    pub top_predictions: Vec<LabelScore>,
    /// One entry per class; remote endpoints only return their top scores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_probabilities: Option<Vec<f32>>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Moderate,
    Low,
}

impl ConfidenceTier {
    pub fn from_confidence(confidence: f32) -> Self {
        let percent = f64::from(confidence) * 100.0;
        if percent > 80.0 {
            ConfidenceTier::High
        } else if percent > 60.0 {
            ConfidenceTier::Moderate
        } else {
            ConfidenceTier::Low
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "High confidence prediction!",
            ConfidenceTier::Moderate => "Moderate confidence. Consider uploading a clearer image.",
            ConfidenceTier::Low => {
                "Low confidence. The image might be unclear or contain multiple fish."
            }
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct Analysis {
    pub id: Uuid,
    pub file_name: Option<String>,
    pub image: ImageDetails,
    pub backend: String,
    pub prediction: Prediction,
    pub tier: ConfidenceTier,
    pub advice: String,
}

impl Analysis {
    pub fn new(upload: &Upload, backend: &str, prediction: Prediction) -> Self {
        let tier = ConfidenceTier::from_confidence(prediction.confidence);
        Self {
            id: upload.id,
            file_name: upload.file_name.clone(),
            image: upload.details.clone(),
            backend: backend.to_string(),
            prediction,
            tier,
            advice: tier.advice().to_string(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ModelInfo {
    pub backend: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resize: Option<ResizeMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputKind>,
    pub top_k: usize,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            execution_time_ms: None,
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
            execution_time_ms: None,
        }
    }

    pub fn timed(mut self, start: Instant) -> Self {
        self.execution_time_ms = Some(start.elapsed().as_millis() as u64);
        self
    }
}
