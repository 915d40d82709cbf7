//! Document upload handler
//!
//! Always answers 200: extraction results and every kind of failure are
//! reported in the JSON body.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use crate::AppState;
use claimforge_common::{
    db::Repository,
    errors::{AppError, Result},
    metrics::{self, RequestMetrics},
};

/// Multipart field carrying the document
const FILE_FIELD: &str = "file";

/// Filename stored when the client sends none
const DEFAULT_FILENAME: &str = "upload";

/// A file read from the multipart body
struct UploadedFile {
    filename: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// Upload a document image, extract its fields, and store the result
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Json<Value> {
    let request_metrics = RequestMetrics::start("POST", "/upload");

    let body = match multipart {
        Ok(multipart) => match process_upload(&state, multipart).await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, code = ?e.code(), "Upload failed");
                json!({ "error": e.to_string() })
            }
        },
        Err(rejection) => {
            warn!(error = %rejection, "Upload rejected");
            json!({ "error": rejection.body_text() })
        }
    };

    request_metrics.finish(200);
    Json(body)
}

#[instrument(skip_all)]
async fn process_upload(state: &AppState, multipart: Multipart) -> Result<Value> {
    let upload = read_file_field(multipart).await?;
    let mime_type = resolve_mime_type(
        upload.content_type.as_deref(),
        &state.config.extraction.default_mime_type,
    );

    info!(
        filename = %upload.filename,
        bytes = upload.bytes.len(),
        mime_type = %mime_type,
        "Document received"
    );

    let report = state.extractor.extract(&upload.bytes, mime_type).await;

    if let Some(kind) = report.outcome.failure_kind() {
        warn!(
            filename = %upload.filename,
            kind = kind.as_str(),
            failed_attempts = report.failed_attempts.len(),
            "Extraction failed; nothing stored"
        );
        return Ok(report.outcome.into_value());
    }

    let result = report.outcome.into_value();
    let extracted_data = serde_json::to_string(&result)?;

    let repo = Repository::new(state.db.clone());
    match repo.create_document(upload.filename, extracted_data).await {
        Ok(document) => {
            metrics::record_document_stored(true);
            info!(
                document_id = document.id,
                filename = %document.filename,
                model = report.model.as_deref().unwrap_or_default(),
                "Document stored"
            );
            Ok(result)
        }
        Err(e) => {
            metrics::record_document_stored(false);
            let err = AppError::Persistence {
                message: e.to_string(),
            };
            error!(error = %err, "Extraction succeeded but was not stored");
            Ok(json!({
                "error": err.to_string(),
                "error_kind": "persistence",
                "result": result,
            }))
        }
    }
}

/// Read the first `file` part, ignoring any other fields
async fn read_file_field(mut multipart: Multipart) -> Result<UploadedFile> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidFormat {
            message: e.body_text(),
        })?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILENAME)
            .to_string();
        let content_type = field.content_type().map(str::to_string);

        let bytes = field.bytes().await.map_err(|e| AppError::InvalidFormat {
            message: e.body_text(),
        })?;

        return Ok(UploadedFile {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    Err(AppError::MissingField {
        field: FILE_FIELD.to_string(),
    })
}

/// Use the part's declared type when it is an image type
fn resolve_mime_type<'a>(declared: Option<&'a str>, default: &'a str) -> &'a str {
    match declared {
        Some(mime) if mime.starts_with("image/") => mime,
        _ => default,
    }
}
