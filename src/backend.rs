use actix_web::web;
use std::sync::Arc;

use crate::classifier::Classifier;
use crate::error::Result;
use crate::models::{ModelInfo, Prediction};
use crate::preprocess::Upload;
use crate::remote::RemoteClassifier;

/// Where predictions come from. Picked once at startup from configuration.
pub enum Backend {
    Local {
        classifier: Arc<Classifier>,
        source: String,
    },
    Remote(RemoteClassifier),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Local { .. } => "local",
            Backend::Remote(_) => "remote",
        }
    }

    pub async fn classify(&self, upload: &Upload) -> Result<Prediction> {
        match self {
            Backend::Local { classifier, .. } => {
                let classifier = Arc::clone(classifier);
                let image = Arc::clone(&upload.image);
                web::block(move || classifier.predict(&image)).await?
            }
            Backend::Remote(remote) => remote.classify(upload).await,
        }
    }

    pub fn info(&self) -> ModelInfo {
        match self {
            Backend::Local { classifier, source } => {
                let preprocessor = classifier.preprocessor();
                ModelInfo {
                    backend: self.name().to_string(),
                    source: source.clone(),
                    classes: Some(classifier.labels().len()),
                    input_size: Some(preprocessor.size),
                    resize: Some(preprocessor.resize),
                    output: Some(classifier.output()),
                    top_k: classifier.top_k(),
                }
            }
            Backend::Remote(remote) => ModelInfo {
                backend: self.name().to_string(),
                source: remote.endpoint().to_string(),
                classes: None,
                input_size: None,
                resize: None,
                output: None,
                top_k: remote.top_k(),
            },
        }
    }
}
