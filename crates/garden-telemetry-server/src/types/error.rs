//! Error types and HTTP error mapping for the server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use garden_telemetry::TelemetryError;

/// Machine-readable error codes carried in JSON error bodies.
pub mod error_codes {
    pub const INVALID_SENSOR_TYPE: &str = "E_INVALID_SENSOR_TYPE";
    pub const INSUFFICIENT_DATA: &str = "E_INSUFFICIENT_DATA";
    pub const STORE_UNAVAILABLE: &str = "E_STORE_UNAVAILABLE";
    pub const RENDER_FAILURE: &str = "E_RENDER_FAILURE";
    pub const ARTIFACT_NOT_FOUND: &str = "E_ARTIFACT_NOT_FOUND";
    pub const ARTIFACT_STORAGE: &str = "E_ARTIFACT_STORAGE";
    pub const INVALID_PARAMS: &str = "E_INVALID_PARAMS";
    pub const DEVICE_NOT_FOUND: &str = "E_DEVICE_NOT_FOUND";
    pub const METHOD_NOT_ALLOWED: &str = "E_METHOD_NOT_ALLOWED";
    pub const INTERNAL: &str = "E_INTERNAL";
}

/// All errors a request can end in.
#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("Device not found")]
    DeviceNotFound(String),

    #[error("Request type not valid")]
    MethodNotAllowed {
        methods: Vec<String>,
        req_method: String,
    },

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Telemetry(e) => match e {
                TelemetryError::InvalidSensorType(_) | TelemetryError::InvalidInput(_) => {
                    StatusCode::BAD_REQUEST
                }
                TelemetryError::InsufficientData { .. } | TelemetryError::ArtifactNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                TelemetryError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                TelemetryError::RenderFailure(_) | TelemetryError::ArtifactStorage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ServerError::DeviceNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::MethodNotAllowed { .. } | ServerError::InvalidParams(_) => {
                StatusCode::BAD_REQUEST
            }
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        use error_codes::*;
        match self {
            ServerError::Telemetry(e) => match e {
                TelemetryError::InvalidSensorType(_) => INVALID_SENSOR_TYPE,
                TelemetryError::InsufficientData { .. } => INSUFFICIENT_DATA,
                TelemetryError::StoreUnavailable(_) => STORE_UNAVAILABLE,
                TelemetryError::RenderFailure(_) => RENDER_FAILURE,
                TelemetryError::ArtifactNotFound(_) => ARTIFACT_NOT_FOUND,
                TelemetryError::ArtifactStorage(_) => ARTIFACT_STORAGE,
                TelemetryError::InvalidInput(_) => INVALID_PARAMS,
            },
            ServerError::DeviceNotFound(_) => DEVICE_NOT_FOUND,
            ServerError::MethodNotAllowed { .. } => METHOD_NOT_ALLOWED,
            ServerError::InvalidParams(_) => INVALID_PARAMS,
            ServerError::Internal(_) => INTERNAL,
        }
    }

    /// JSON error body. Dispatcher errors keep the flat shape device
    /// clients already parse.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ServerError::DeviceNotFound(_) => json!({ "error": "Device not found" }),
            ServerError::MethodNotAllowed {
                methods,
                req_method,
            } => json!({
                "error": "Request type not valid",
                "methods": methods,
                "req_method": req_method,
            }),
            other => json!({
                "error": { "code": other.code(), "message": other.to_string() }
            }),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{self}");
        } else {
            tracing::debug!("{self}");
        }
        (status, Json(self.to_json())).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
