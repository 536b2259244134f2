use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use marquee_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::Store(
                StoreError::UnknownConversation(_)
                | StoreError::UnknownMessage { .. }
                | StoreError::UnknownNotification(_),
            ) => StatusCode::NOT_FOUND,
            ServerError::Store(StoreError::ConversationExists(_)) => StatusCode::CONFLICT,
            ServerError::Store(StoreError::UnknownListener(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use marquee_shared::{ConversationId, NotificationId};

    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (
                ServerError::from(StoreError::UnknownConversation(ConversationId::from("x"))),
                StatusCode::NOT_FOUND,
            ),
            (
                ServerError::from(StoreError::UnknownNotification(NotificationId::from("n"))),
                StatusCode::NOT_FOUND,
            ),
            (
                ServerError::from(StoreError::ConversationExists(ConversationId::from("1"))),
                StatusCode::CONFLICT,
            ),
            (
                ServerError::BadRequest("content is empty".into()),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
