use actix_cors::Cors;
use clap::{Args, ValueEnum};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::Backend;
use crate::classifier::{Classifier, OutputKind};
use crate::error::{Error, Result};
use crate::labels::Labels;
use crate::model::OnnxModel;
use crate::preprocess::{Preprocessor, ResizeMode};
use crate::remote::RemoteClassifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Run an ONNX classifier in-process
    Local,
    /// Post images to a hosted inference endpoint
    Remote,
}

#[derive(Debug, Clone, Args)]
pub struct ClassifierConfig {
    /// Where predictions come from
    #[arg(long, value_enum, env = "FISH_BACKEND", default_value_t = BackendKind::Local)]
    pub backend: BackendKind,

    /// ONNX model file
    #[arg(long, env = "FISH_MODEL", default_value = "model.onnx")]
    pub model: PathBuf,

    /// Class names, one per line, in model output order
    #[arg(long, env = "FISH_LABELS", default_value = "classes.txt")]
    pub labels: PathBuf,

    /// Side length of the square model input
    #[arg(
        long,
        env = "FISH_INPUT_SIZE",
        default_value_t = 128,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub input_size: u32,

    #[arg(long, value_enum, env = "FISH_RESIZE", default_value_t = ResizeMode::Stretch)]
    pub resize: ResizeMode,

    #[arg(long, value_enum, env = "FISH_MODEL_OUTPUT", default_value_t = OutputKind::Logits)]
    pub model_output: OutputKind,

    /// Number of ranked predictions to return
    #[arg(long, env = "FISH_TOP_K", default_value_t = 5)]
    pub top_k: usize,

    /// Inference endpoint URL for the remote backend
    #[arg(long, env = "FISH_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Bearer token sent to the inference endpoint
    #[arg(long, env = "FISH_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Remote request timeout in seconds
    #[arg(long, env = "FISH_TIMEOUT", default_value_t = 30)]
    pub timeout: u64,

    /// Extra attempts after a transient remote failure
    #[arg(long, env = "FISH_RETRIES", default_value_t = 2)]
    pub retries: u32,

    /// Base delay between remote retries in milliseconds
    #[arg(long, env = "FISH_BACKOFF_MS", default_value_t = 500)]
    pub backoff_ms: u64,
}

impl ClassifierConfig {
    pub fn load_backend(&self) -> Result<Backend> {
        if self.top_k == 0 {
            return Err(Error::Config("--top-k must be at least 1".to_string()));
        }

        match self.backend {
            BackendKind::Local => {
                let labels = Labels::load(&self.labels)?;
                let model = OnnxModel::load(&self.model, self.input_size)?;
                info!(
                    "Loaded model {} with {} classes",
                    self.model.display(),
                    labels.len()
                );

                let classifier = Classifier::new(
                    Box::new(model),
                    labels,
                    Preprocessor::new(self.input_size, self.resize),
                    self.model_output,
                    self.top_k,
                );
                Ok(Backend::Local {
                    classifier: Arc::new(classifier),
                    source: self.model.display().to_string(),
                })
            }
            BackendKind::Remote => {
                let endpoint = self.endpoint.clone().ok_or_else(|| {
                    Error::Config("the remote backend requires --endpoint".to_string())
                })?;
                reqwest::Url::parse(&endpoint).map_err(|e| {
                    Error::Config(format!("invalid --endpoint {}: {}", endpoint, e))
                })?;
                if self.api_token.is_none() {
                    warn!("No API token configured for {}", endpoint);
                }
                info!("Using inference endpoint {}", endpoint);

                let remote = RemoteClassifier::new(
                    endpoint,
                    self.api_token.clone(),
                    Duration::from_secs(self.timeout),
                    self.top_k,
                    self.retries,
                    Duration::from_millis(self.backoff_ms),
                )?;
                Ok(Backend::Remote(remote))
            }
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    #[arg(long, env = "FISH_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "FISH_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Worker threads, defaults to one per core
    #[arg(long, env = "FISH_WORKERS")]
    pub workers: Option<usize>,

    #[arg(long, env = "FISH_MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Allowed CORS origin, repeatable; any origin when unset
    #[arg(long = "allowed-origin", env = "FISH_ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    pub fn cors(&self) -> Cors {
        if self.allowed_origins.is_empty() {
            return Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header();
        }

        self.allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST"])
            .allow_any_header()
            .max_age(3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(flatten)]
        classifier: ClassifierConfig,
        #[command(flatten)]
        server: ServerConfig,
    }

    fn parse(args: &[&str]) -> Harness {
        Harness::try_parse_from(std::iter::once("fish-analyzer").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn defaults_match_fish_model() {
        let harness = parse(&[]);
        assert_eq!(harness.classifier.backend, BackendKind::Local);
        assert_eq!(harness.classifier.input_size, 128);
        assert_eq!(harness.classifier.resize, ResizeMode::Stretch);
        assert_eq!(harness.classifier.model_output, OutputKind::Logits);
        assert_eq!(harness.classifier.top_k, 5);
        assert_eq!(harness.server.port, 8080);
        assert_eq!(harness.server.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn parses_overrides() {
        let harness = parse(&[
            "--resize",
            "letterbox",
            "--model-output",
            "probabilities",
            "--input-size",
            "224",
            "--allowed-origin",
            "http://localhost:3000,http://127.0.0.1:3000",
        ]);
        assert_eq!(harness.classifier.resize, ResizeMode::Letterbox);
        assert_eq!(harness.classifier.model_output, OutputKind::Probabilities);
        assert_eq!(harness.classifier.input_size, 224);
        assert_eq!(harness.server.allowed_origins.len(), 2);
    }

    #[test]
    fn rejects_zero_input_size() {
        assert!(Harness::try_parse_from(["fish-analyzer", "--input-size", "0"]).is_err());
    }

    #[test]
    fn remote_backend_requires_endpoint() {
        let harness = parse(&["--backend", "remote"]);
        assert!(matches!(
            harness.classifier.load_backend(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn remote_backend_builds_without_model_files() {
        let harness = parse(&[
            "--backend",
            "remote",
            "--endpoint",
            "https://example.com/models/fish",
            "--top-k",
            "3",
        ]);
        let backend = harness.classifier.load_backend().unwrap();
        assert_eq!(backend.name(), "remote");
        assert_eq!(backend.info().top_k, 3);
    }

    #[test]
    fn remote_backend_rejects_malformed_endpoint() {
        let harness = parse(&["--backend", "remote", "--endpoint", "not a url"]);
        assert!(matches!(
            harness.classifier.load_backend(),
            Err(Error::Config(message)) if message.contains("--endpoint")
        ));
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let harness = parse(&["--top-k", "0"]);
        assert!(matches!(
            harness.classifier.load_backend(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn local_backend_needs_labels() {
        let dir = tempfile::tempdir().unwrap();
        let labels = dir.path().join("classes.txt");
        let harness = parse(&["--labels", labels.to_str().unwrap()]);
        assert!(matches!(
            harness.classifier.load_backend(),
            Err(Error::LabelsIo { .. })
        ));
    }
}
