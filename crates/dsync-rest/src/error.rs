use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dsync_common::error::DsyncError;

use crate::types::ErrorReply;

pub struct RestError(pub DsyncError);

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            DsyncError::InvalidArgument(_) | DsyncError::InvalidConfig { .. } => {
                StatusCode::BAD_REQUEST
            }
            DsyncError::NoLockers => StatusCode::SERVICE_UNAVAILABLE,
            DsyncError::Unreachable { .. } | DsyncError::Timeout { .. } => {
                StatusCode::BAD_GATEWAY
            }
            DsyncError::InternalError(_) | DsyncError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorReply {
            code: self.0.error_code().to_string(),
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<DsyncError> for RestError {
    fn from(err: DsyncError) -> Self {
        RestError(err)
    }
}
