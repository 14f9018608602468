use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::extractor::ExtractError;

/// Failures that are still reportable, i.e. no response headers went out yet.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("URL is required")]
    MissingUrl,

    #[error("Invalid URL")]
    InvalidUrl(String),

    #[error("type must be \"video\" or \"audio\"")]
    InvalidMediaKind(String),

    #[error("Invalid download token")]
    InvalidToken,

    #[error("{context}")]
    Extraction {
        context: &'static str,
        #[source]
        source: ExtractError,
    },
}

impl AppError {
    pub fn extraction(context: &'static str, source: ExtractError) -> Self {
        Self::Extraction { context, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingUrl | Self::InvalidUrl(_) | Self::InvalidMediaKind(_) | Self::InvalidToken => {
                StatusCode::BAD_REQUEST
            }
            Self::Extraction { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::MissingUrl | Self::InvalidToken => json!({ "error": self.to_string() }),
            Self::InvalidUrl(details) | Self::InvalidMediaKind(details) => {
                json!({ "error": self.to_string(), "details": details })
            }
            Self::Extraction { context, source } => {
                error!("{}: {}", context, source);
                json!({ "error": context, "details": source.to_string() })
            }
        };
        (status, Json(body)).into_response()
    }
}
