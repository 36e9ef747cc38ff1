use axum::{
    body::Bytes,
    extract::{Extension, OriginalUri, Query},
    http::{
        HeaderMap,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    response::{IntoResponse, Json, Response},
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::{client_ip, form_to_map, found, resolve_session};
use crate::api::state::GatewayState;
use crate::crypto::Jwks;
use crate::error::{ApiError, ErrorBody};
use crate::oidc::{
    AuthorizeOutcome, AuthorizeRequest, DiscoveryDocument, OidcError, OidcErrorBody,
    TokenRequest, TokenResponse, login_redirect, unix_now_nanos,
};
use crate::userinfo::build_user_info;

#[utoipa::path(
    get,
    path = "/oidc/auth",
    params(AuthorizeRequest),
    responses(
        (status = 302, description = "To the client with a code or an error, or to the login page"),
        (status = 400, description = "No usable redirect_uri", body = OidcErrorBody)
    ),
    tag = "oidc"
)]
pub async fn authorize(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    OriginalUri(original): OriginalUri,
    Query(request): Query<AuthorizeRequest>,
) -> Response {
    let verified = match resolve_session(&state, &headers).await {
        Ok(session) => session.auth.is_totp_verified(),
        Err(err) => {
            debug!(error = %err, "authorize without a session");
            false
        }
    };
    if !verified {
        let config = state.config();
        let location = login_redirect(
            config.login_url(),
            config.login_callback_param(),
            config.api_server(),
            &original.to_string(),
        );
        return found(&location, HeaderMap::new());
    }

    match state
        .oidc()
        .authorize(&request, &client_ip(&headers), unix_now_nanos())
        .await
    {
        AuthorizeOutcome::Redirect(location) => found(&location, HeaderMap::new()),
        AuthorizeOutcome::Reject(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/oidc/.well-known/openid-configuration",
    responses((status = 200, description = "Provider metadata", body = DiscoveryDocument)),
    tag = "oidc"
)]
pub async fn discovery(state: Extension<Arc<GatewayState>>) -> Json<DiscoveryDocument> {
    Json(state.oidc().discovery())
}

#[utoipa::path(
    get,
    path = "/oidc/keys",
    responses((status = 200, description = "Public keys for id_token signatures", body = Jwks)),
    tag = "oidc"
)]
pub async fn keys(state: Extension<Arc<GatewayState>>) -> Json<Jwks> {
    Json(state.oidc().jwks().clone())
}

#[utoipa::path(
    post,
    path = "/oidc/token",
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Tokens for the authorization code", body = TokenResponse),
        (status = 400, description = "Bad grant or request", body = OidcErrorBody),
        (status = 401, description = "Client authentication failed", body = OidcErrorBody)
    ),
    tag = "oidc"
)]
pub async fn token(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    body: Bytes,
) -> Response {
    let request = match token_request(&headers, &body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    match state
        .oidc()
        .token(&request, authorization, unix_now_nanos())
        .await
    {
        Ok(tokens) => Json(tokens).into_response(),
        Err(err) => err.into_response(),
    }
}

// A missing content type is read as a form.
fn token_request(headers: &HeaderMap, body: &Bytes) -> Result<TokenRequest, OidcError> {
    if let Some(content_type) = headers.get(CONTENT_TYPE) {
        let is_form = content_type
            .to_str()
            .is_ok_and(|v| v.starts_with("application/x-www-form-urlencoded"));
        if !is_form {
            return Err(OidcError::invalid_request(
                "token request must be application/x-www-form-urlencoded",
            ));
        }
    }
    serde_json::from_value(serde_json::Value::Object(form_to_map(body)))
        .map_err(|err| OidcError::invalid_request(format!("invalid token request: {err}")))
}

#[utoipa::path(
    get,
    path = "/oidc/user",
    responses(
        (status = 200, description = "Who-am-I document for the access token holder", body = Object),
        (status = 401, description = "Invalid or unverified token", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody)
    ),
    tag = "oidc"
)]
pub async fn user(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
) -> Result<Json<Map<String, Value>>, ApiError> {
    let session = resolve_session(&state, &headers).await?.require_verified()?;
    let doc = build_user_info(
        state.identity(),
        state.policy(),
        &session.token,
        &state.config().sso_callback_url(),
    )
    .await?;
    Ok(Json(doc))
}
