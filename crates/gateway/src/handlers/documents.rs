//! Stored extraction read-back handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::AppState;
use claimforge_common::{
    db::{models::Document, Repository},
    errors::{AppError, Result},
};

fn default_limit() -> u64 {
    20
}

/// Pagination for the document listing
#[derive(Debug, Deserialize, Validate)]
pub struct ListDocumentsQuery {
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: u64,

    #[serde(default)]
    pub offset: u64,
}

/// A stored document with its extraction decoded
#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: i32,
    pub filename: String,
    pub extracted_data: Value,
    pub created_at: String,
}

impl From<Document> for DocumentResponse {
    fn from(document: Document) -> Self {
        let extracted_data = document.extracted_json();
        Self {
            id: document.id,
            filename: document.filename,
            extracted_data,
            created_at: document.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListDocumentsResponse {
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
    pub documents: Vec<DocumentResponse>,
}

/// List stored documents, newest first
pub async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<ListDocumentsResponse>> {
    query.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("limit".to_string()),
    })?;

    let repo = Repository::new(state.db.clone());
    let (documents, total) = repo.list_documents(query.offset, query.limit).await?;

    Ok(Json(ListDocumentsResponse {
        total,
        offset: query.offset,
        limit: query.limit,
        documents: documents.into_iter().map(DocumentResponse::from).collect(),
    }))
}

/// Get one stored document by ID
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<DocumentResponse>> {
    let repo = Repository::new(state.db.clone());

    let document = repo
        .find_document_by_id(id)
        .await?
        .ok_or(AppError::DocumentNotFound { id })?;

    Ok(Json(document.into()))
}
