//! JSON error envelope for API handlers.
//!
//! Every failure leaves the API as
//! `{"error": {"code": "...", "message": "...", "details": ...}}` so that
//! handlers can return `Result<T, ApiError>` and use `?` on library errors.

use af_pipeline::{BrowseError, ImportError, SubmitError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};

pub struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
    details: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(code: &str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }
}

impl From<af_core::Error> for ApiError {
    fn from(e: af_core::Error) -> Self {
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let code = match &e {
            af_core::Error::NotFound { entity, .. } => {
                format!("{}_NOT_FOUND", entity.to_uppercase())
            }
            af_core::Error::ArtifactMissing { .. } => "DOWNLOAD_NOT_FOUND".into(),
            af_core::Error::Validation(_) => "VALIDATION_ERROR".into(),
            af_core::Error::Conflict(_) => "CONFLICT".into(),
            af_core::Error::Io { .. } => "STORAGE_ERROR".into(),
            af_core::Error::Workspace(_) => "WORKSPACE_ERROR".into(),
            af_core::Error::Tool { .. } => "TOOL_ERROR".into(),
            af_core::Error::Pipeline { .. } => "PIPELINE_ERROR".into(),
            af_core::Error::Internal(_) => "INTERNAL_ERROR".into(),
        };

        Self::new(status, code, e.to_string())
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        let message = e.to_string();
        match e {
            SubmitError::ApkNotFound(_) => Self::new(StatusCode::NOT_FOUND, "APK_NOT_FOUND", message),
            SubmitError::CacheNotReady(_) => {
                Self::new(StatusCode::CONFLICT, "CACHE_NOT_READY", message)
            }
            SubmitError::InvalidRules(errors) => Self::bad_request("INVALID_RULE", message)
                .with_details(json!({ "errors": errors })),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(e: ImportError) -> Self {
        let message = e.to_string();
        match e {
            ImportError::TooLarge { size, limit } => {
                Self::new(StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE", message)
                    .with_details(json!({ "size": size, "limit": limit }))
            }
            ImportError::NotAnApk(_) => Self::bad_request("INVALID_APK_FORMAT", message),
            ImportError::Decompile(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "DECOMPILE_ERROR", message)
            }
            ImportError::Storage(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", message)
            }
        }
    }
}

impl From<BrowseError> for ApiError {
    fn from(e: BrowseError) -> Self {
        let message = e.to_string();
        match e {
            BrowseError::ApkNotFound(_) => Self::new(StatusCode::NOT_FOUND, "APK_NOT_FOUND", message),
            BrowseError::CacheNotReady(_) => {
                Self::new(StatusCode::CONFLICT, "CACHE_NOT_READY", message)
            }
            BrowseError::UnsafePath(_) => Self::bad_request("INVALID_PATH", message),
            BrowseError::FileNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "FILE_NOT_FOUND", message)
            }
            BrowseError::NotText(_) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "FILE_NOT_TEXT", message)
            }
            BrowseError::Io(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                code = %self.code,
                error = %self.message,
                "Server error in API handler"
            );
        }

        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "details": self.details,
            }
        });

        (self.status, axum::Json(body)).into_response()
    }
}
