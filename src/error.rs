use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::path::PathBuf;
use thiserror::Error;

use crate::models::ApiResponse;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no image was uploaded")]
    EmptyUpload,

    #[error("upload exceeds the {limit} byte limit")]
    UploadTooLarge { limit: usize },

    #[error("could not read upload: {0}")]
    Upload(String),

    #[error("unsupported image format, expected JPEG or PNG")]
    UnsupportedFormat,

    #[error("invalid image file: {0}")]
    Decode(#[from] image::ImageError),

    #[error("could not read labels from {path}: {source}")]
    LabelsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("labels file contains no classes")]
    Labels,

    #[error("model produced {outputs} scores but {labels} labels are loaded")]
    LabelMismatch { outputs: usize, labels: usize },

    #[error("model error: {0}")]
    Model(String),

    /// A remote call failed; `transient` failures are worth retrying.
    #[error("inference endpoint error: {message}")]
    Remote {
        status: Option<u16>,
        message: String,
        transient: bool,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("inference task was cancelled")]
    Blocking(#[from] actix_web::error::BlockingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Remote { transient: true, .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Error::Remote {
            status: error.status().map(|status| status.as_u16()),
            transient: error.is_timeout() || error.is_connect(),
            message: error.to_string(),
        }
    }
}

impl From<actix_multipart::MultipartError> for Error {
    fn from(error: actix_multipart::MultipartError) -> Self {
        Error::Upload(error.to_string())
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::EmptyUpload
            | Error::Upload(_)
            | Error::Decode(_) => StatusCode::BAD_REQUEST,
            Error::UnsupportedFormat => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Remote {
                status: Some(429), ..
            } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Remote { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiResponse::<()>::error(&self.to_string()))
    }
}
