use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::models::api::{ErrorBody, ErrorKind};
use crate::services::directory::DirectoryError;
use crate::services::dispatcher::DispatchError;
use crate::services::ingress::IngressError;
use crate::services::scan::ScanError;
use crate::services::status_store::StatusError;

/// Error returned by every handler, rendered as `{kind, message}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorKind::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::InternalError, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(kind = %self.kind, status = %self.status, message = %self.message, "Request failed");
        }
        let body = ErrorBody {
            kind: self.kind,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<IngressError> for ApiError {
    fn from(e: IngressError) -> Self {
        let status = match e {
            IngressError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            IngressError::UnsupportedFormat | IngressError::Undecodable(_) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, ErrorKind::ValidationError, e.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        let status = e.status();
        let status = if status.is_client_error() {
            status
        } else {
            StatusCode::BAD_REQUEST
        };
        Self::new(
            status,
            ErrorKind::ValidationError,
            IngressError::Multipart(e.body_text()).to_string(),
        )
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::new(
            rejection.status(),
            ErrorKind::ValidationError,
            IngressError::Multipart(rejection.body_text()).to_string(),
        )
    }
}

impl From<StatusError> for ApiError {
    fn from(e: StatusError) -> Self {
        match e {
            StatusError::NotFound(_) => Self::not_found(e.to_string()),
            StatusError::Duplicate(_) => {
                Self::new(StatusCode::CONFLICT, ErrorKind::ValidationError, e.to_string())
            }
            StatusError::InvalidTransition { .. } => Self::internal(e.to_string()),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Overloaded { .. } => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, ErrorKind::Overloaded, e.to_string())
            }
            DispatchError::Status(inner) => inner.into(),
        }
    }
}

impl From<ScanError> for ApiError {
    fn from(e: ScanError) -> Self {
        match e {
            ScanError::Invalid(inner) => inner.into(),
            ScanError::Dispatch(inner) => inner.into(),
            ScanError::Status(inner) => inner.into(),
        }
    }
}

impl From<DirectoryError> for ApiError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::NotFound(_) => Self::not_found(e.to_string()),
            DirectoryError::OpenFda(_) => {
                Self::new(StatusCode::BAD_GATEWAY, ErrorKind::InternalError, e.to_string())
            }
        }
    }
}
