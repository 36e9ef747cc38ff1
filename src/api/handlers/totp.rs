use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use super::{Session, parse_typed, resolve_session, session_cookie};
use crate::api::state::GatewayState;
use crate::error::{ApiError, ErrorBody};
use crate::session::AuthToken;
use crate::totp::{RecoveryAnswer, TotpProvisioning};

#[derive(Debug, Deserialize, ToSchema)]
pub struct PasscodeBody {
    pub passcode: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecoveryAnswers {
    pub answers: Vec<RecoveryAnswer>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecoveryQuestions {
    pub questions: Vec<String>,
}

/// Re-issue the session cookie carrying `auth`.
fn reissue(state: &GatewayState, session: &Session, auth: &AuthToken) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, session_cookie(state, auth, &session.token)?);
    Ok(headers)
}

#[utoipa::path(
    post,
    path = "/initcredential",
    responses(
        (status = 200, description = "New secret for the authenticator app", body = TotpProvisioning),
        (status = 401, description = "No session", body = ErrorBody),
        (status = 409, description = "Secret already verified", body = ErrorBody)
    ),
    tag = "totp"
)]
pub async fn init_credential(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
) -> Result<Json<TotpProvisioning>, ApiError> {
    let session = resolve_session(&state, &headers).await?;
    let provisioning = state.totp().init(&session.token).await?;
    info!(user_id = %session.token.user_id, "totp secret issued");
    Ok(Json(provisioning))
}

#[utoipa::path(
    post,
    path = "/credential",
    request_body = RecoveryAnswers,
    responses(
        (status = 200, description = "Secret replaced; it must be verified again", body = TotpProvisioning),
        (status = 401, description = "No session or wrong answers", body = ErrorBody),
        (status = 403, description = "No recovery questions set", body = ErrorBody)
    ),
    tag = "totp"
)]
pub async fn reset_credential(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let session = resolve_session(&state, &headers).await?;
    let request: RecoveryAnswers = parse_typed(&headers, &body)?;
    let provisioning = state.totp().reset(&session.token, &request.answers).await?;
    let auth = session.auth.clone().with_totp_initialized(false);
    Ok((reissue(&state, &session, &auth)?, Json(provisioning)))
}

#[utoipa::path(
    post,
    path = "/passcode",
    request_body = PasscodeBody,
    responses(
        (status = 200, description = "Passcode accepted; the session is verified"),
        (status = 400, description = "Invalid passcode", body = ErrorBody),
        (status = 401, description = "No session", body = ErrorBody)
    ),
    tag = "totp"
)]
pub async fn passcode(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let session = resolve_session(&state, &headers).await?;
    let request: PasscodeBody = parse_typed(&headers, &body)?;
    state
        .totp()
        .verify(&session.token.user_id, &request.passcode)
        .await?;
    let auth = session.auth.clone().verified();
    Ok((StatusCode::OK, reissue(&state, &session, &auth)?))
}

#[utoipa::path(
    get,
    path = "/recovery",
    responses(
        (status = 200, description = "Recovery question texts", body = RecoveryQuestions),
        (status = 401, description = "No session", body = ErrorBody)
    ),
    tag = "totp"
)]
pub async fn list_recovery(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
) -> Result<Json<RecoveryQuestions>, ApiError> {
    let session = resolve_session(&state, &headers).await?;
    let questions = state.totp().list_questions(&session.token.user_id).await?;
    Ok(Json(RecoveryQuestions { questions }))
}

#[utoipa::path(
    post,
    path = "/recovery",
    request_body = RecoveryAnswers,
    responses(
        (status = 200, description = "Recovery questions stored"),
        (status = 400, description = "Missing or blank questions", body = ErrorBody),
        (status = 401, description = "No verified session", body = ErrorBody)
    ),
    tag = "totp"
)]
pub async fn set_recovery(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let session = resolve_session(&state, &headers).await?.require_verified()?;
    let request: RecoveryAnswers = parse_typed(&headers, &body)?;
    state
        .totp()
        .set_questions(&session.token.user_id, &request.answers)
        .await?;
    Ok(StatusCode::OK)
}
