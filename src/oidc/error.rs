use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OidcErrorKind {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    UnsupportedGrantType,
    UnsupportedResponseType,
    ServerError,
}

impl OidcErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::ServerError => "server_error",
        }
    }
}

/// OAuth 2.0 error, rendered as `{error, error_description}`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}: {description}", kind.as_str())]
pub struct OidcError {
    kind: OidcErrorKind,
    description: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct OidcErrorBody {
    pub error: String,
    pub error_description: String,
}

impl OidcError {
    #[must_use]
    pub fn new(kind: OidcErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(OidcErrorKind::InvalidRequest, description)
    }

    #[must_use]
    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::new(OidcErrorKind::InvalidClient, description)
    }

    #[must_use]
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(OidcErrorKind::InvalidGrant, description)
    }

    #[must_use]
    pub fn server_error(description: impl Into<String>) -> Self {
        Self::new(OidcErrorKind::ServerError, description)
    }

    #[must_use]
    pub fn kind(&self) -> OidcErrorKind {
        self.kind
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.kind {
            OidcErrorKind::InvalidClient => StatusCode::UNAUTHORIZED,
            OidcErrorKind::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    #[must_use]
    pub fn body(&self) -> OidcErrorBody {
        OidcErrorBody {
            error: self.kind.as_str().to_string(),
            error_description: self.description.clone(),
        }
    }
}

impl IntoResponse for OidcError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
