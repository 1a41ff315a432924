use actix_multipart::Multipart;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use log::{error, info};
use std::time::Instant;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::models::{Analysis, ApiResponse};
use crate::preprocess::Upload;
use crate::report;

pub struct AppState {
    pub backend: Backend,
    pub max_upload_bytes: usize,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/predict").route(web::post().to(predict)))
        .service(web::resource("/report").route(web::post().to(download_report)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/model-info").route(web::get().to(model_info)));
}

pub async fn predict(state: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse> {
    let start = Instant::now();
    let analysis = analyze(&state, payload).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(analysis).timed(start)))
}

pub async fn download_report(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse> {
    let analysis = analyze(&state, payload).await?;
    let disposition = ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(report::file_name(&analysis))],
    };

    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .insert_header(disposition)
        .body(report::render(&analysis)))
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success("ok"))
}

pub async fn model_info(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success(state.backend.info()))
}

pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(ApiResponse::<()>::error("endpoint not found"))
}

async fn analyze(state: &AppState, payload: Multipart) -> Result<Analysis> {
    let upload = read_upload(payload, state.max_upload_bytes).await?;

    let prediction = state.backend.classify(&upload).await.map_err(|e| {
        error!("Prediction {} failed: {}", upload.id, e);
        e
    })?;

    let analysis = Analysis::new(&upload, state.backend.name(), prediction);
    info!(
        "Prediction {}: {} ({:.1}%)",
        analysis.id,
        analysis.prediction.predicted_class,
        analysis.prediction.confidence * 100.0
    );
    Ok(analysis)
}

/// Reads the first file field of a multipart body into memory.
async fn read_upload(mut payload: Multipart, limit: usize) -> Result<Upload> {
    while let Some(item) = payload.next().await {
        let mut field = item?;
        let disposition = field.content_disposition();
        let file_name = disposition.get_filename().map(String::from);
        let is_image_field = file_name.is_some()
            || matches!(disposition.get_name(), Some("file") | Some("image"));

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk?;
            if bytes.len() + data.len() > limit {
                return Err(Error::UploadTooLarge { limit });
            }
            bytes.extend_from_slice(&data);
        }

        if is_image_field {
            return Upload::decode_blocking(bytes, file_name).await;
        }
    }

    Err(Error::EmptyUpload)
}
