//! Document upload and analysis endpoints.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::auth::CurrentActor;
use super::routes::AppState;
use crate::document::{Document, DocumentAnalysisView, Reanalysis};
use crate::error::{TrackerError, TrackerResult};

const FILE_FIELD: &str = "file";

/// Keep only the final path component of a client-supplied file name.
fn sanitize_file_name(raw: &str) -> String {
    raw.rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(raw)
        .replace('\0', "")
        .trim()
        .to_string()
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(task_id): Path<Uuid>,
) -> TrackerResult<Json<Vec<Document>>> {
    Ok(Json(state.documents.documents_for_task(task_id, &actor).await?))
}

pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(task_id): Path<Uuid>,
    mut multipart: Multipart,
) -> TrackerResult<(StatusCode, Json<Document>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| TrackerError::invalid(FILE_FIELD, e.to_string()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = sanitize_file_name(field.file_name().unwrap_or("upload.bin"));
        let media_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| TrackerError::invalid(FILE_FIELD, e.to_string()))?;

        let document = state
            .documents
            .upload_document(task_id, &actor, &file_name, &media_type, &bytes)
            .await?;
        return Ok((StatusCode::CREATED, Json(document)));
    }
    Err(TrackerError::missing(FILE_FIELD))
}

pub async fn document_analysis(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> TrackerResult<Json<DocumentAnalysisView>> {
    Ok(Json(state.documents.document_analysis(id, &actor).await?))
}

pub async fn reanalyze_document(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> TrackerResult<Json<Reanalysis>> {
    Ok(Json(state.documents.reanalyze_document(id, &actor).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> TrackerResult<Json<Document>> {
    let document = state
        .documents
        .update_document_status(id, &req.status, &actor)
        .await?;
    Ok(Json(document))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\docs\\GSTR-3B.pdf"), "GSTR-3B.pdf");
        assert_eq!(sanitize_file_name(" challan.txt "), "challan.txt");
    }
}
