use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use super::error::ApiError;
use crate::cache::CacheStats;
use crate::diagram::{Diagram, ImageFormat};
use crate::generator::Generator;

#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<Generator>,
}

impl AppState {
    pub fn new(generator: Arc<Generator>) -> Self {
        Self { generator }
    }
}

// ============================================================
// Generate Handlers
// ============================================================

#[derive(Debug, Default, Deserialize)]
pub struct GenerateQuery {
    /// Diagram text, GET only. Already percent-decoded by the extractor.
    pub data: Option<String>,
    /// `svg` (default) or `png`.
    #[serde(rename = "type")]
    pub image_type: Option<String>,
}

fn parse_format(image_type: Option<&str>) -> Result<ImageFormat, ApiError> {
    match image_type.map(str::trim) {
        None | Some("") => Ok(ImageFormat::default()),
        Some(value) => value
            .parse()
            .map_err(|e: crate::diagram::UnsupportedFormat| ApiError::bad_request(e.to_string())),
    }
}

pub async fn generate_get_handler(
    State(state): State<AppState>,
    Query(query): Query<GenerateQuery>,
) -> Result<Response, ApiError> {
    let format = parse_format(query.image_type.as_deref())?;

    let data = query.data.unwrap_or_default();
    if data.trim().is_empty() {
        return Err(ApiError::bad_request("missing data"));
    }

    generate(&state, Diagram::new(data, format)).await
}

pub async fn generate_post_handler(
    State(state): State<AppState>,
    Query(query): Query<GenerateQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let format = parse_format(query.image_type.as_deref())?;

    let description = String::from_utf8(body.to_vec())
        .map_err(|e| ApiError::bad_request(format!("could not read body: {}", e)))?;
    if description.trim().is_empty() {
        return Err(ApiError::bad_request("missing data"));
    }

    generate(&state, Diagram::new(description, format)).await
}

pub async fn method_not_allowed_handler(method: Method) -> ApiError {
    ApiError::new(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("unexpected HTTP method {}", method),
    )
}

async fn generate(state: &AppState, diagram: Diagram) -> Result<Response, ApiError> {
    let req_id = Uuid::new_v4();
    let span = tracing::info_span!("GenerateDiagram", %req_id, format = %diagram.format());

    render_diagram(state, diagram).instrument(span).await
}

async fn render_diagram(state: &AppState, mut diagram: Diagram) -> Result<Response, ApiError> {
    tracing::info!("Received diagram request");

    state.generator.generate(&mut diagram).await?;

    let output = diagram
        .output()
        .ok_or_else(|| ApiError::internal("could not create diagram"))?;
    let bytes = tokio::fs::read(output).await.map_err(|e| {
        ApiError::internal(format!(
            "could not read diagram bytes [{}]: {}",
            output.display(),
            e
        ))
    })?;

    tracing::debug!(bytes = bytes.len(), "Serving diagram");
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, diagram.format().content_type())],
        bytes,
    )
        .into_response())
}

// ============================================================
// Health / Stats Handlers
// ============================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn get_health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn get_stats_handler(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.generator.stats())
}
