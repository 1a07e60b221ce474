use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::generator::GenerateError;
use crate::render::RenderError;

/// Error returned to HTTP clients as `{"error": "<message>"}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<GenerateError> for ApiError {
    fn from(err: GenerateError) -> Self {
        let status = match &err {
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            GenerateError::Render(RenderError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, format!("could not generate diagram: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("[{}] {}", self.status.as_u16(), self.message);
        } else {
            tracing::warn!("[{}] {}", self.status.as_u16(), self.message);
        }

        let body = Json(ErrorBody {
            error: &self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::diagram::DiagramError;

    #[test]
    fn generate_errors_map_to_status_codes() {
        let cases = [
            (
                GenerateError::Identity(DiagramError::EmptyDescription),
                StatusCode::BAD_REQUEST,
            ),
            (
                GenerateError::Render(RenderError::Timeout(Duration::from_secs(30))),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                GenerateError::Render(RenderError::RendererMissing("/usr/bin/mmdc".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[tokio::test]
    async fn body_is_a_json_envelope() {
        let response = ApiError::bad_request("missing data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, serde_json::json!({ "error": "missing data" }));
    }
}
