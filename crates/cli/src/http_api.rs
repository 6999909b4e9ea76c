use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
};
use docrag_retrieval::{ErrorKind, RetrievalError, RetrievalService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_TOP_K: usize = 5;

pub(crate) struct HttpState {
    pub service: Arc<RetrievalService>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct IndexRequest {
    pub filename: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

const fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

pub(crate) async fn index_pdf(State(state): State<Arc<HttpState>>, body: Bytes) -> Response {
    let request: IndexRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match state.service.index_file(&request.filename).await {
        Ok(report) => build_response(StatusCode::OK, &report),
        Err(err) => error_response(&err),
    }
}

pub(crate) async fn search(State(state): State<Arc<HttpState>>, body: Bytes) -> Response {
    let request: SearchRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match state.service.search(&request.query, request.top_k).await {
        Ok(response) => build_response(StatusCode::OK, &response),
        Err(err) => error_response(&err),
    }
}

pub(crate) async fn health() -> Response {
    build_response(StatusCode::OK, &serde_json::json!({ "status": "ok" }))
}

pub(crate) async fn stats(State(state): State<Arc<HttpState>>) -> Response {
    build_response(StatusCode::OK, &state.service.stats().await)
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|err| {
        request_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            format!("Invalid JSON request: {err}"),
        )
    })
}

pub(crate) const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Configuration | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::DimensionMismatch | ErrorKind::StorageIo | ErrorKind::Embedding => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn hint_for(code: &str) -> Option<&'static str> {
    match code {
        "not_found" => Some(
            "Place the file in the documents directory (DOCRAG_DOCUMENTS_DIR) and pass its name relative to it.",
        ),
        "invalid_request" => Some("Verify the request is valid JSON and matches the endpoint schema."),
        "invalid_input" => Some("The document could not be read as a PDF."),
        "dimension_mismatch" => Some(
            "The store was built with a different embedding model. Use a new DOCRAG_STORE_PATH or the model the store was built with.",
        ),
        "storage_io_error" => Some("Check that the store path is readable and writable."),
        "embedding_error" => Some(
            "Check DOCRAG_MODEL_DIR, or set DOCRAG_EMBEDDING_MODE=stub to run without model assets.",
        ),
        _ => None,
    }
}

pub(crate) fn error_response(err: &RetrievalError) -> Response {
    let kind = err.kind();
    let status = status_for(kind);
    if status.is_server_error() {
        log::error!("Request failed: {err}");
    } else {
        log::debug!("Request rejected: {err}");
    }
    request_error(status, kind.as_str(), err.to_string())
}

fn request_error(status: StatusCode, code: &str, message: String) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: code.to_string(),
            message,
            hint: hint_for(code).map(str::to_string),
        },
    };
    build_response(status, &body)
}

pub(crate) fn build_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (status, [(CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(err) => {
            log::error!("Failed to serialize response: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
