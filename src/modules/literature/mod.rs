use axum::{
    Json, Router,
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Serialize;
use tracing::{error, info, warn};

pub mod citations;
pub mod generator;

pub use citations::{Citation, extract_citations};
pub use generator::{ExtractedText, OutputLanguage, ReviewGenerator, ReviewRequest, build_prompt};

use crate::{
    AppState,
    llm::GenerationError,
    utils::{ExtractionError, extract_text_blocking},
    web::{
        FileFieldConfig, UploadError, UploadedDocument, json_error, process_upload_form,
    },
};

pub const MAX_PDF_FILES: usize = 10;
pub const API_KEY_HEADER: &str = "x-openrouter-api-key";
const FILES_FIELD: &str = "files";
const PDF_SUFFIXES: &[&str] = &[".pdf"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload-pdfs", post(upload_pdfs))
        .route("/generate-literature-review", post(generate_literature_review))
}

/// Failure of one request, tagged by the pipeline stage that produced it.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error(transparent)]
    Validation(#[from] UploadError),
    #[error("{filename}: {source}")]
    Extraction {
        filename: String,
        #[source]
        source: ExtractionError,
    },
    #[error("Error generating literature review: {0}")]
    Generation(#[from] GenerationError),
}

impl ReviewError {
    pub fn status(&self) -> StatusCode {
        match self {
            ReviewError::Validation(_) => StatusCode::BAD_REQUEST,
            ReviewError::Extraction { .. } | ReviewError::Generation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ReviewError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(err = %self, "literature request failed");
        } else {
            warn!(err = %self, "literature request rejected");
        }
        json_error(status, self.to_string()).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ProcessedPdf {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct UploadPdfsResponse {
    pub message: String,
    pub files: Vec<ProcessedPdf>,
}

#[derive(Debug, Serialize)]
pub struct LiteratureReviewResponse {
    pub literature_review: String,
    pub message: String,
    pub citations: Vec<Citation>,
}

fn pdf_field() -> FileFieldConfig<'static> {
    FileFieldConfig::new(FILES_FIELD, PDF_SUFFIXES, "PDF", MAX_PDF_FILES)
}

/// Extract every document in upload order; the first failure aborts the batch.
async fn extract_all(files: Vec<UploadedDocument>) -> Result<Vec<ExtractedText>, ReviewError> {
    let mut extracted = Vec::with_capacity(files.len());
    for file in files {
        let text = extract_text_blocking(file.bytes)
            .await
            .map_err(|source| ReviewError::Extraction {
                filename: file.filename.clone(),
                source,
            })?;
        extracted.push(ExtractedText {
            filename: file.filename,
            text,
        });
    }
    Ok(extracted)
}

async fn upload_pdfs(multipart: Multipart) -> Result<Json<UploadPdfsResponse>, ReviewError> {
    let mut upload = process_upload_form(multipart, &[pdf_field()]).await?;
    let documents = extract_all(upload.take_files_for(FILES_FIELD)).await?;

    info!(files = documents.len(), "processed uploaded PDFs");

    Ok(Json(UploadPdfsResponse {
        message: format!("Successfully processed {} PDF files", documents.len()),
        files: documents
            .into_iter()
            .map(|doc| ProcessedPdf {
                filename: doc.filename,
                content: doc.text,
            })
            .collect(),
    }))
}

async fn generate_literature_review(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<LiteratureReviewResponse>, ReviewError> {
    let mut upload = process_upload_form(multipart, &[pdf_field()]).await?;

    let research_topic = upload
        .first_text("research_topic")
        .map(str::trim)
        .filter(|topic| !topic.is_empty())
        .ok_or(UploadError::MissingField("research_topic"))?
        .to_string();
    let language = upload
        .first_text("output_language")
        .map(OutputLanguage::from_form_value)
        .unwrap_or_default();
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let documents = extract_all(upload.take_files_for(FILES_FIELD)).await?;

    info!(
        documents = documents.len(),
        language = language.display_name(),
        key_override = api_key.is_some(),
        "generating literature review"
    );

    let literature_review = state
        .review_generator()
        .generate(ReviewRequest {
            research_topic,
            documents,
            output_language: language,
            api_key,
        })
        .await?;

    Ok(Json(LiteratureReviewResponse {
        literature_review,
        message: "Literature review generated successfully".to_string(),
        citations: Vec::new(),
    }))
}
