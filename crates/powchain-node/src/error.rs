use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use powchain_core::LedgerError;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Ledger(LedgerError::MalformedInput(reason.into()))
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Ledger(LedgerError::BlockNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Ledger(LedgerError::MalformedInput(_)) => StatusCode::BAD_REQUEST,
            Self::Ledger(LedgerError::MiningInProgress) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {self}");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
