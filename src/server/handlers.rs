//! Request handlers, request validation and error mapping.

use std::io;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tokio::task::JoinError;
use tracing::{error, info};

use crate::config::MIN_TOP_K;
use crate::error::{RagError, Result};
use crate::rag::Rag;
use crate::types::QueryResult;

use super::AppState;

const MISSING_QUERY: &str = "Missing 'query' in request body";
const EMPTY_QUERY: &str = "Query cannot be empty";
const QUERY_NOT_STRING: &str = "'query' must be a string";

/// Error responses at the HTTP boundary.
#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotInitialized,
    Internal(String),
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::IndexNotReady => Self::NotInitialized,
            RagError::Validation(e) => Self::BadRequest(e.to_string()),
            RagError::Embedding(reason) => {
                Self::BadRequest(format!("Query could not be embedded: {reason}"))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::NotInitialized => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "RAG system not initialized" })),
            )
                .into_response(),
            Self::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error", "message": message })),
            )
                .into_response(),
        }
    }
}

/// A validated `/api/query` or `/api/search` body.
#[derive(Debug, PartialEq)]
struct QueryRequest {
    query: String,
    top_k: usize,
}

/// Validates `{query: string, top_k?: integer}` without coercing types.
fn parse_request(
    body: std::result::Result<Json<Value>, JsonRejection>,
    default_top_k: usize,
    max_top_k: usize,
) -> std::result::Result<QueryRequest, ApiError> {
    let missing = || ApiError::BadRequest(MISSING_QUERY.to_string());

    let Ok(Json(Value::Object(mut fields))) = body else {
        return Err(missing());
    };

    let query = match fields.remove("query") {
        None => return Err(missing()),
        Some(Value::String(query)) if !query.trim().is_empty() => query,
        Some(Value::String(_) | Value::Null) => {
            return Err(ApiError::BadRequest(EMPTY_QUERY.to_string()))
        }
        Some(_) => return Err(ApiError::BadRequest(QUERY_NOT_STRING.to_string())),
    };

    let top_k = match fields.get("top_k") {
        None => default_top_k,
        Some(value) => value
            .as_i64()
            .filter(|k| (MIN_TOP_K as i64..=max_top_k as i64).contains(k))
            .map(|k| k as usize)
            .ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "top_k must be an integer between {MIN_TOP_K} and {max_top_k}"
                ))
            })?,
    };

    Ok(QueryRequest { query, top_k })
}

fn join_failed(e: JoinError) -> RagError {
    RagError::Io(io::Error::other(e))
}

/// `GET /api/health`
pub(super) async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "rag_initialized": state.is_initialized(),
        "message": "RAG API is running",
    }))
}

/// `POST /api/query`
pub(super) async fn query(
    State(state): State<AppState>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Response {
    let Some(rag) = state.rag().cloned() else {
        return ApiError::NotInitialized.into_response();
    };
    let request = match parse_request(body, state.default_top_k, state.max_top_k) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    info!(query = %request.query, top_k = request.top_k, "Processing query");

    let answer = tokio::time::timeout(
        state.request_timeout,
        answer(rag, request.query.clone(), request.top_k),
    )
    .await
    .unwrap_or_else(|_| Err(RagError::generation("request timed out")));

    match answer {
        Ok(summary) => Json(json!({
            "success": true,
            "query": request.query,
            "summary": summary,
            "top_k": request.top_k,
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "Error processing query");
            ApiError::from(e).into_response()
        }
    }
}

/// `POST /api/search`
pub(super) async fn search(
    State(state): State<AppState>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Response {
    let Some(rag) = state.rag().cloned() else {
        return ApiError::NotInitialized.into_response();
    };
    let request = match parse_request(body, state.default_top_k, state.max_top_k) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    info!(query = %request.query, top_k = request.top_k, "Processing search");

    let results = tokio::time::timeout(
        state.request_timeout,
        retrieve(rag, request.query.clone(), request.top_k),
    )
    .await
    .unwrap_or(Err(RagError::IndexNotReady));

    match results {
        Ok(results) => Json(json!({
            "success": true,
            "query": request.query,
            "results": results.iter().map(result_json).collect::<Vec<_>>(),
            "top_k": request.top_k,
        }))
        .into_response(),
        Err(e) => {
            error!(error = %e, "Error processing search");
            ApiError::from(e).into_response()
        }
    }
}

fn result_json(result: &QueryResult) -> Value {
    json!({
        "text": result.text(),
        "distance": result.distance,
        "index": result.position.get(),
    })
}

/// Retrieval runs on a blocking thread: embedding and scanning are CPU-bound.
async fn retrieve(rag: Arc<Rag>, query: String, top_k: usize) -> Result<Vec<QueryResult>> {
    tokio::task::spawn_blocking(move || rag.search(&query, top_k))
        .await
        .map_err(join_failed)?
}

async fn answer(rag: Arc<Rag>, query: String, top_k: usize) -> Result<String> {
    let context = {
        let rag = Arc::clone(&rag);
        let query = query.clone();
        tokio::task::spawn_blocking(move || rag.retrieve_context(&query, top_k))
            .await
            .map_err(join_failed)??
    };
    rag.answer_from_context(&query, &context).await
}

/// Unknown route.
pub(super) async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Endpoint not found" })),
    )
        .into_response()
}

/// Known route, wrong method.
pub(super) async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed" })),
    )
        .into_response()
}

/// Permissive CORS: any origin, GET/POST/OPTIONS, answers preflights directly.
pub(super) async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };
    add_cors_headers(response.headers_mut());
    response
}

fn add_cors_headers(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
}
