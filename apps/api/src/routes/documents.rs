use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::document::{Document, DocumentKind};
use crate::state::AppState;

/// Registration body: text is already extracted upstream (upload and PDF
/// parsing live outside this service).
#[derive(Debug, Deserialize)]
pub struct RegisterDocumentRequest {
    pub kind: DocumentKind,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub kind: DocumentKind,
}

/// POST /documents
pub async fn handle_register_document(
    State(state): State<AppState>,
    Json(req): Json<RegisterDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentResponse>), AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::Validation(
            "document text must not be empty".to_string(),
        ));
    }

    let doc = Document::new(req.kind, format!("inline:{}", Uuid::new_v4()));
    let doc = state.documents.put(doc, req.text).await?;

    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse {
            id: doc.id,
            kind: doc.kind,
        }),
    ))
}

/// GET /documents/:id
pub async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, AppError> {
    let doc = state.documents.get(id).await?;
    Ok(Json(doc))
}
