//! Upload and health handlers.

use std::sync::Arc;

use axum::{Json, extract::Multipart, extract::State};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::parallel::BatchResult;
use crate::processing::FileDescriptor;
use crate::server::AppState;
use crate::server::errors::ApiError;

/// Message returned alongside the derivative paths on success.
pub const SUCCESS_MESSAGE: &str = "Files uploaded and converted successfully";

/// Message returned when the request carried no file parts.
pub const NO_FILES_MESSAGE: &str = "No files uploaded";

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub results: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

pub(crate) async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let batch = read_batch(&mut multipart, &state.upload_field).await?;
    if batch.is_empty() {
        return Err(ApiError::bad_request(NO_FILES_MESSAGE));
    }

    info!("Received upload with {} files", batch.len());

    match state.coordinator.process(batch).await? {
        BatchResult::AllSucceeded(paths) => Ok(Json(UploadResponse {
            message: SUCCESS_MESSAGE.to_string(),
            results: paths
                .iter()
                .map(|path| path.to_string_lossy().into_owned())
                .collect(),
        })),
        BatchResult::Failed(err) => Err(err.into()),
    }
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Buffer every file part of `field_name` in request order.
async fn read_batch(
    multipart: &mut Multipart,
    field_name: &str,
) -> Result<Vec<FileDescriptor>, ApiError> {
    let mut batch = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(field_name) {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }
        // Browsers send `filename=""` for an empty file input
        let Some(filename) = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
        else {
            debug!("Skipping non-file part of {:?}", field_name);
            continue;
        };

        let bytes = field.bytes().await?;
        batch.push(FileDescriptor::from_bytes(filename, bytes.to_vec()));
    }

    Ok(batch)
}
