use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mflow_core::NodeError;
use serde::Serialize;
use serde_json::Value;

/// The uniform `{status, data?, message?}` response shape every endpoint
/// returns.
#[derive(Serialize)]
pub struct Envelope {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    pub fn ok(data: Value) -> Self {
        Envelope { status: "ok", data: Some(data), message: None }
    }

    pub fn ok_empty() -> Self {
        Envelope { status: "ok", data: None, message: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Envelope { status: "error", data: None, message: Some(message.into()) }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Wraps a `NodeError` so handlers can return it as the `Err` arm of a
/// `Result<Envelope, HttpError>` and have it rendered as the same JSON
/// envelope shape rather than axum's default plaintext error body.
pub struct HttpError(pub NodeError);

impl From<NodeError> for HttpError {
    fn from(e: NodeError) -> Self {
        HttpError(e)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            NodeError::UnknownInstance { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Envelope::error(self.0.to_string())).into_response()
    }
}

/// The uniform 404 body for an unknown instance name or unknown verb, so a
/// missing route gets the same envelope shape as every other error.
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Envelope::error("no such instance or verb"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_instance_maps_to_404() {
        let err = HttpError(NodeError::UnknownInstance { name: "x".into() });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn other_errors_map_to_500() {
        let err = HttpError(NodeError::AlreadyRunning);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
