use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use praetor_core::{AppError, ErrorKind};
use serde::Serialize;

/// API error payload.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    message: String,
}

/// HTTP API error wrapper around core application errors.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Detail for auth and server failures stays in the logs.
        let message = match kind {
            ErrorKind::Unauthorized => "authentication required".to_owned(),
            ErrorKind::Forbidden => "access denied".to_owned(),
            ErrorKind::Internal => {
                tracing::error!(error = %self.0, "request failed");
                "internal server error".to_owned()
            }
            _ => self.0.to_string(),
        };

        (status, Json(ErrorResponse { message })).into_response()
    }
}

/// Standard API result type.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use praetor_core::{AppError, PrincipalId, RoleId};

    use super::ApiError;

    #[test]
    fn domain_errors_map_to_statuses() {
        let cases = [
            (AppError::Validation("bad".to_owned()), StatusCode::BAD_REQUEST),
            (
                AppError::CyclicHierarchy {
                    role_id: RoleId::new(),
                    parent_id: RoleId::new(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (AppError::NotFound("role".to_owned()), StatusCode::NOT_FOUND),
            (
                AppError::DuplicateAssignment {
                    principal_id: PrincipalId::new(),
                    role_id: RoleId::new(),
                    tenant_id: None,
                },
                StatusCode::CONFLICT,
            ),
            (AppError::Unauthorized("inactive".to_owned()), StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("missing".to_owned()), StatusCode::FORBIDDEN),
            (
                AppError::Internal("db down".to_owned()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError::from(error).into_response().status(), status);
        }
    }
}
