//! Gateway error taxonomy and its HTTP rendering.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::identity::IdentityError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Malformed or missing request fields; safe to detail.
    #[error("{0}")]
    InputParameter(String),
    /// Any authentication failure; the message stays generic.
    #[error("{0}")]
    InvalidCredential(String),
    /// Valid identity, disallowed operation.
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    TooManyRequests(String),
    #[error("{0}")]
    GeneralServer(String),
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: u16,
    pub class: String,
    pub details: String,
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InputParameter(_) => StatusCode::BAD_REQUEST,
            Self::InvalidCredential(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::GeneralServer(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            Self::InputParameter(_) => "InputParameterError",
            Self::InvalidCredential(_) => "InvalidCredentialError",
            Self::Forbidden(_) => "ForbiddenError",
            Self::NotFound(_) => "NotFoundError",
            Self::Conflict(_) => "ConflictError",
            Self::TooManyRequests(_) => "TooManyRequestsError",
            Self::GeneralServer(_) => "GeneralServerError",
        }
    }

    #[must_use]
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.status().as_u16(),
            class: self.class().to_string(),
            details: self.to_string(),
        }
    }
}

/// Backend statuses map onto the taxonomy; transport failures are server errors.
impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        let message = err.message().to_string();
        match err.status() {
            Some(400) => Self::InputParameter(message),
            Some(401) => Self::InvalidCredential(message),
            Some(403) => Self::Forbidden(message),
            Some(404) => Self::NotFound(message),
            Some(409) => Self::Conflict(message),
            Some(429) => Self::TooManyRequests(message),
            _ => Self::GeneralServer(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
