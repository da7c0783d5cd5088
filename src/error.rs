use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use utoipa::ToSchema;

use crate::{data::StoreError, llm::GenerationError};

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Free requests exhausted. Provide or save an API key.")]
    QuotaExhausted,

    #[error("Invalid API key for text generation")]
    InvalidUpstreamCredential,

    #[error("Failed to generate text")]
    Generation(#[source] GenerationError),

    #[error("Failed to access profile store")]
    Store(#[from] StoreError),
}

impl From<GenerationError> for ApiError {
    fn from(error: GenerationError) -> Self {
        match error {
            GenerationError::InvalidCredential => Self::InvalidUpstreamCredential,
            error => Self::Generation(error),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_)
            | Self::QuotaExhausted
            | Self::InvalidUpstreamCredential => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Generation(_) | Self::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_requests_remaining: Option<u32>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self, "Request failed.");
        } else {
            tracing::warn!(error = %self, "Request rejected.");
        }
        let details = match &self {
            Self::Generation(GenerationError::Upstream { status, .. }) => {
                Some(format!("Upstream responded with {status}"))
            }
            Self::Generation(GenerationError::Empty) => {
                Some("Upstream returned no text".to_string())
            }
            _ => None,
        };
        let free_requests_remaining =
            matches!(self, Self::QuotaExhausted).then_some(0);
        let body = ErrorResponse {
            error: self.to_string(),
            details,
            free_requests_remaining,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use crate::{data::StoreError, llm::GenerationError};

    use super::ApiError;

    #[test]
    fn statuses() {
        let cases = [
            (ApiError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (ApiError::QuotaExhausted, StatusCode::BAD_REQUEST),
            (
                ApiError::from(GenerationError::InvalidCredential),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(GenerationError::Empty),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::from(StoreError::NotFound { uid: "u".into() }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn invalid_credential_is_distinct() {
        assert!(matches!(
            ApiError::from(GenerationError::InvalidCredential),
            ApiError::InvalidUpstreamCredential
        ));
    }
}
