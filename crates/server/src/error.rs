//! HTTP mapping for core errors.
//!
//! Every handler returns `Result<_, ApiError>`; the body is always
//! `{"message": ..., "error": ...}`.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use schoolhouse_core::Error;
use serde_json::json;

/// A core [`Error`] on its way to becoming an HTTP response.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub Error);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match &self.0 {
            Error::NotFound(_) => "Resource not found.",
            Error::Validation(_) => "Could not parse request data.",
            Error::Conflict(_) => "Resource already exists.",
            Error::Unauthorized(_) => "Authentication required.",
            Error::Forbidden(_) => "You do not have access to this resource.",
            _ => "Something went wrong. Try again later.",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "request rejected");
        }

        let body = Json(json!({ "message": self.message(), "error": self.0.to_string() }));
        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(Error::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(Error::Validation(rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError(Error::NotFound("x".into())).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError(Error::Validation("x".into())).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError(Error::Conflict("x".into())).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError(Error::Forbidden("x".into())).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError(Error::Internal("x".into())).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ApiError(Error::DirtyState { version: 2 }).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unauthorized_sets_challenge() {
        let response = ApiError(Error::Unauthorized("missing token".into())).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
