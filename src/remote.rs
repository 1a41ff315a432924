use log::{info, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::classifier::top_k;
use crate::error::{Error, Result};
use crate::models::{LabelScore, Prediction};
use crate::preprocess::Upload;

#[derive(Debug, Deserialize)]
struct RemoteScore {
    label: String,
    score: f32,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    error: String,
}

/// Classifies images by posting them to a hosted image-classification endpoint.
pub struct RemoteClassifier {
    client: Client,
    endpoint: String,
    token: Option<String>,
    top_k: usize,
    retries: u32,
    backoff: Duration,
}

impl RemoteClassifier {
    pub fn new(
        endpoint: String,
        token: Option<String>,
        timeout: Duration,
        top_k: usize,
        retries: u32,
        backoff: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("could not build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            token,
            top_k,
            retries,
            backoff,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn classify(&self, upload: &Upload) -> Result<Prediction> {
        let mut attempt = 0;
        loop {
            match self.request(upload).await {
                Err(error) if error.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "Inference endpoint attempt {} failed, retrying: {}",
                        attempt, error
                    );
                    actix_rt::time::sleep(self.backoff * attempt).await;
                }
                result => return result,
            }
        }
    }

    async fn request(&self, upload: &Upload) -> Result<Prediction> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, upload.mime_type())
            .body(upload.bytes.clone());

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let prediction = parse_scores(&body, self.top_k)?;
        info!(
            "Inference endpoint predicted {} ({:.4})",
            prediction.predicted_class, prediction.confidence
        );
        Ok(prediction)
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn status_error(status: StatusCode, body: &str) -> Error {
    let message = match serde_json::from_str::<RemoteError>(body) {
        Ok(remote) => remote.error,
        Err(_) => body.chars().take(200).collect(),
    };

    Error::Remote {
        status: Some(status.as_u16()),
        message: format!("{}: {}", status, message),
        transient: is_transient(status),
    }
}

fn parse_scores(body: &str, k: usize) -> Result<Prediction> {
    let scores: Vec<RemoteScore> = serde_json::from_str(body).map_err(|e| Error::Remote {
        status: None,
        message: format!("unexpected response body: {}", e),
        transient: false,
    })?;

    let values: Vec<f32> = scores.iter().map(|score| score.score).collect();
    let top_predictions: Vec<LabelScore> = top_k(&values, k)
        .into_iter()
        .map(|(index, probability)| LabelScore {
            label: scores[index].label.clone(),
            probability,
        })
        .collect();

    let best = top_predictions.first().cloned().ok_or_else(|| Error::Remote {
        status: None,
        message: "endpoint returned no predictions".to_string(),
        transient: false,
    })?;

    Ok(Prediction {
        predicted_class: best.label,
        confidence: best.probability,
        top_predictions,
        all_probabilities: None,
    })
}
