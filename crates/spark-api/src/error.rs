use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use spark_chat::{ChatError, StoreError};
use spark_types::api::ErrorBody;

/// Error response: a status plus `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("{what} not found"),
        }
    }

    pub fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal error".into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let status = match &err {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::Auth => StatusCode::UNAUTHORIZED,
            ChatError::Store(StoreError::Forbidden(_)) => StatusCode::FORBIDDEN,
            ChatError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ChatError::Store(StoreError::Duplicate(_))
            | ChatError::NotReady
            | ChatError::SendInFlight
            | ChatError::Superseded => StatusCode::CONFLICT,
            ChatError::Store(StoreError::Backend(_)) | ChatError::Subscription(_) => {
                error!("Request failed: {}", err);
                return Self::internal();
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        let cases = [
            (ChatError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ChatError::Auth, StatusCode::UNAUTHORIZED),
            (
                StoreError::Forbidden("x".into()).into(),
                StatusCode::FORBIDDEN,
            ),
            (StoreError::NotFound("x".into()).into(), StatusCode::NOT_FOUND),
            (
                StoreError::Backend("disk".into()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn backend_details_are_not_leaked() {
        let err = ApiError::from(ChatError::from(StoreError::Backend("disk on fire".into())));
        assert_eq!(err.message, "internal error");
    }
}
