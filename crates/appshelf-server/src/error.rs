use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use appshelf_store::AppStorageError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Upload too large: {size} bytes (max {max})")]
    UploadTooLarge { size: usize, max: usize },

    #[error("{0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The upload is well-formed but conflicts with what is stored.
    #[error("{0}")]
    Conflict(String),

    /// The upload is not an acceptable package.
    #[error("{0}")]
    Rejected(String),

    /// An expected storage failure; the message is generic.
    #[error("{0}")]
    StorageFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AppStorageError> for ServerError {
    fn from(err: AppStorageError) -> Self {
        let Some(message) = err.user_message() else {
            return ServerError::Internal(err.to_string());
        };
        match err {
            AppStorageError::NotFound(_) => ServerError::NotFound(message),
            AppStorageError::Parser(ref parse) => {
                tracing::debug!(detail = %parse.detail(), "upload rejected by parser");
                ServerError::Rejected(message)
            }
            AppStorageError::DuplicatePackageName(_)
            | AppStorageError::PackageNameMismatch { .. }
            | AppStorageError::VersionNotIncreased { .. } => ServerError::Conflict(message),
            AppStorageError::AddFailed(ref source)
            | AppStorageError::UpdateFailed(ref source)
            | AppStorageError::DeleteFailed(ref source) => {
                tracing::error!(error = %source, "storage operation failed");
                ServerError::StorageFailed(message)
            }
            AppStorageError::Unexpected(e) => ServerError::Internal(e.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServerError::Internal(format!("storage task failed: {err}"))
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::UploadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, self.to_string())
            }
            ServerError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ServerError::Rejected(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            ServerError::StorageFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            ServerError::Internal(detail) => {
                tracing::error!(%detail, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use appshelf_shared::ParseError;
    use appshelf_store::StoreError;

    use super::*;

    #[test]
    fn maps_storage_errors_to_statuses() {
        let cases = [
            (AppStorageError::NotFound(3), StatusCode::NOT_FOUND),
            (
                AppStorageError::DuplicatePackageName("com.x".into()),
                StatusCode::CONFLICT,
            ),
            (
                AppStorageError::AddFailed(StoreError::NotFound),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AppStorageError::Unexpected(StoreError::LockClosed),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn rejections_carry_the_user_message() {
        let err = AppStorageError::VersionNotIncreased {
            supplied: 2,
            existing: 3,
        };
        let expected = err.user_message().unwrap();
        assert!(matches!(ServerError::from(err), ServerError::Conflict(m) if m == expected));

        let err = AppStorageError::Parser(ParseError::Metadata("versionCode is missing".into()));
        assert!(matches!(
            ServerError::from(err),
            ServerError::Rejected(m)
                if m == "Failed to extract the app's metadata from the supplied APK file!"
        ));
    }

    #[test]
    fn unexpected_errors_keep_detail_for_logs() {
        let err = ServerError::from(AppStorageError::Unexpected(StoreError::Migration(
            "secret detail".into(),
        )));
        assert!(matches!(err, ServerError::Internal(ref d) if d.contains("secret detail")));
    }
}
