//! Image upload → diagnosis with Grad-CAM overlay.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, PredictResponse};

/// Multipart field expected to carry the image.
pub const FILE_FIELD: &str = "file";

/// `POST /api/predict`: multipart upload, field `file`.
///
/// Inference runs on the blocking pool; the model lock is held only there.
pub async fn predict(
    State(ctx): State<ApiContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let mut multipart =
        multipart.map_err(|e| ApiError::BadUpload(format!("expected multipart/form-data: {e}")))?;
    let (filename, bytes) = read_file_field(&mut multipart).await?;

    let span = tracing::info_span!("predict", request_id = %Uuid::new_v4());
    span.in_scope(|| {
        tracing::debug!(filename = %filename, size_bytes = bytes.len(), "Upload received")
    });

    let service = ctx.service.clone();
    let report = tokio::task::spawn_blocking(move || span.in_scope(|| service.predict(&bytes)))
        .await
        .map_err(|e| ApiError::Internal(format!("inference task failed: {e}")))??;

    Ok(Json(PredictResponse::from_report(report)))
}

/// The field named `file`. Without one, the first other field carrying a
/// filename.
async fn read_file_field(multipart: &mut Multipart) -> Result<(String, Vec<u8>), ApiError> {
    let mut fallback = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadUpload(format!("cannot read multipart body: {e}")))?
    {
        let named = field.name() == Some(FILE_FIELD);
        if !named && (fallback.is_some() || field.file_name().is_none()) {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadUpload(format!("cannot read file data: {e}")))?;
        if named {
            return Ok((filename, bytes.to_vec()));
        }
        fallback = Some((filename, bytes.to_vec()));
    }

    fallback.ok_or_else(|| {
        ApiError::BadUpload(format!(
            "no file provided (expected multipart field '{FILE_FIELD}')"
        ))
    })
}
