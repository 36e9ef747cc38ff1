use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::{Value, json};
use std::sync::Arc;

use super::{clear_session_cookie, parse_typed, request_context, resolve_session};
use crate::api::state::GatewayState;
use crate::error::{ApiError, ErrorBody};
use crate::login::PasswordReset;
use crate::userinfo::build_user_info;

#[utoipa::path(
    get,
    path = "/user",
    responses(
        (status = 200, description = "Profile, projects and policies of the session holder", body = Object),
        (status = 401, description = "No verified session", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn user(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
) -> Result<Json<Value>, ApiError> {
    let session = resolve_session(&state, &headers).await?.require_verified()?;
    let doc = build_user_info(
        state.identity(),
        state.policy(),
        &session.token,
        &state.config().sso_callback_url(),
    )
    .await?;
    Ok(Json(json!({ "data": doc })))
}

#[utoipa::path(
    post,
    path = "/password",
    request_body = PasswordReset,
    responses(
        (status = 200, description = "Password changed; the session is cleared"),
        (status = 400, description = "Mismatch, wrong password or wrong passcode", body = ErrorBody),
        (status = 401, description = "No session", body = ErrorBody),
        (status = 403, description = "Federated users cannot change passwords here", body = ErrorBody),
        (status = 409, description = "Account locked", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn password(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let session = resolve_session(&state, &headers).await?;
    let reset: PasswordReset = parse_typed(&headers, &body)?;
    state
        .login()
        .verify_password_reset(
            &request_context(&headers),
            &session.token,
            &reset,
            state.totp(),
        )
        .await?;

    // Once the patch is attempted the session is dropped, whatever the outcome.
    let result = state
        .login()
        .apply_password_reset(&session.token.user_id, &reset)
        .await;
    let cleared = clear_session_cookie(&state)?;
    Ok(match result {
        Ok(()) => (StatusCode::OK, cleared).into_response(),
        Err(err) => (cleared, err).into_response(),
    })
}
