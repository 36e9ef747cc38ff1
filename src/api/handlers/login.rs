use axum::{
    body::Bytes,
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{IntoParams, ToSchema};

use super::{clear_session_cookie, decode_session, login_cookies, parse_body, request_context};
use crate::api::state::GatewayState;
use crate::error::{ApiError, ErrorBody};
use crate::identity::{IdentityProvider, IdpFilter};
use crate::login::LoginRequest;

/// Fields `POST /login` understands. Unknown fields are passed to the
/// pre-login hook and the SSO exchange untouched.
///
/// The flow reads the body as a loose JSON object through `LoginRequest`; this
/// type only describes it in the API document.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginBody {
    /// `tenant/user` scopes the login to `tenant`.
    #[allow(dead_code, reason = "read through LoginRequest")]
    username: Option<String>,
    /// Plain or base64 encoded.
    #[allow(dead_code, reason = "read through LoginRequest")]
    password: Option<String>,
    #[allow(dead_code, reason = "read through LoginRequest")]
    domain: Option<String>,
    /// Switch the current session to this project instead of logging in.
    #[serde(rename = "tenantId")]
    #[allow(dead_code, reason = "read through LoginRequest")]
    tenant_id: Option<String>,
    #[allow(dead_code, reason = "read through LoginRequest")]
    idp_driver: Option<String>,
    #[allow(dead_code, reason = "read through LoginRequest")]
    idp_id: Option<String>,
    #[allow(dead_code, reason = "seen by the pre-login hook")]
    isadmin: Option<String>,
    #[allow(dead_code, reason = "overwritten with the resolved scope")]
    scope: Option<String>,
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginBody,
    responses(
        (status = 200, description = "Session cookie and console cookies set"),
        (status = 400, description = "Malformed body", body = ErrorBody),
        (status = 401, description = "Credential or session rejected", body = ErrorBody),
        (status = 403, description = "User may not use the web console", body = ErrorBody),
        (status = 409, description = "Account locked", body = ErrorBody),
        (status = 429, description = "Too many attempts", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let body = parse_body(&headers, &body)?;
    let session = decode_session(&state, &headers);
    let outcome = state
        .login()
        .login(&request_context(&headers), LoginRequest::new(body), session)
        .await?;
    Ok((StatusCode::OK, login_cookies(&state, &outcome)?))
}

#[utoipa::path(
    post,
    path = "/logout",
    responses((status = 200, description = "Session cookie cleared")),
    tag = "auth"
)]
pub async fn logout(state: Extension<Arc<GatewayState>>) -> Result<impl IntoResponse, ApiError> {
    Ok((StatusCode::OK, clear_session_cookie(&state)?))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RegionsQuery {
    /// Restrict the domain list to this id.
    domain: Option<String>,
    /// `false` lists only providers that do not create users on first login.
    auto_create_user: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginOptions {
    pub domains: Vec<String>,
    pub regions: Vec<String>,
    pub idps: Vec<IdentityProvider>,
}

#[utoipa::path(
    get,
    path = "/regions",
    params(RegionsQuery),
    responses(
        (status = 200, description = "Regions, domains and identity providers for the login page", body = LoginOptions),
        (status = 500, description = "No region available", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn regions(
    state: Extension<Arc<GatewayState>>,
    Query(query): Query<RegionsQuery>,
) -> Result<Json<LoginOptions>, ApiError> {
    let identity = state.identity();
    let regions = identity.list_regions().await.map_err(|err| {
        error!(error = %err, "failed to list regions");
        ApiError::from(err)
    })?;
    if regions.is_empty() {
        return Err(ApiError::GeneralServer("no region available".to_string()));
    }

    let domain = query.domain.filter(|d| !d.is_empty());
    let domains = identity
        .list_domains(domain.as_deref())
        .await?
        .into_iter()
        .filter(|d| d.enabled)
        .map(|d| d.name)
        .collect();
    let idps = identity
        .list_idps(&IdpFilter {
            sso_domain: domain.unwrap_or_else(|| "all".to_string()),
            auto_create_user: query.auto_create_user.filter(|create| !create),
        })
        .await?;

    Ok(Json(LoginOptions {
        domains,
        regions,
        idps,
    }))
}
