use axum::{
    body::{Bytes, Bytes as RawBody},
    extract::{Extension, Path, Query, RawQuery},
    http::{HeaderMap, header::SET_COOKIE},
    response::Response,
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use url::form_urlencoded;
use utoipa::IntoParams;

use super::{found, form_to_map, login_cookies, parse_body, request_context};
use crate::api::state::GatewayState;
use crate::error::{ApiError, ErrorBody};
use crate::identity::IdpFilter;
use crate::login::LoginRequest;
use crate::oidc::{add_query, query_unescape};
use crate::session::read_cookie;

pub const SSO_STATE_COOKIE: &str = "sso_state";
const SSO_STATE_MAX_AGE: i64 = 300;

/// What `/sso/redirect` remembers for the callback.
#[derive(Debug, Default, PartialEq, Eq)]
struct SsoStash {
    state: String,
    idp_id: String,
    idp_driver: String,
    return_url: Option<String>,
}

impl SsoStash {
    fn encode(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        serializer
            .append_pair("state", &self.state)
            .append_pair("idp_id", &self.idp_id)
            .append_pair("idp_driver", &self.idp_driver);
        if let Some(rf) = &self.return_url {
            serializer.append_pair("rf", rf);
        }
        serializer.finish()
    }

    /// Cookie values arrive percent-encoded once more.
    fn decode(cookie: &str) -> Self {
        let mut stash = Self::default();
        let raw = query_unescape(cookie);
        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            match key.as_ref() {
                "state" => stash.state = value.into_owned(),
                "idp_id" => stash.idp_id = value.into_owned(),
                "idp_driver" => stash.idp_driver = value.into_owned(),
                "rf" => stash.return_url = Some(value.into_owned()).filter(|v| !v.is_empty()),
                _ => {}
            }
        }
        stash
    }
}

fn random_state() -> Result<String, ApiError> {
    let mut bytes = [0u8; 32];
    OsRng.try_fill_bytes(&mut bytes).map_err(|err| {
        error!("Failed to generate sso state: {}", err);
        ApiError::GeneralServer("failed to generate state".to_string())
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RedirectQuery {
    /// Where to land after a successful login.
    rf: Option<String>,
}

#[utoipa::path(
    get,
    path = "/sso/redirect/{idp_id}",
    params(("idp_id" = String, Path, description = "Identity provider id"), RedirectQuery),
    responses(
        (status = 302, description = "Redirect to the identity provider"),
        (status = 404, description = "Unknown identity provider", body = ErrorBody)
    ),
    tag = "sso"
)]
pub async fn redirect(
    state: Extension<Arc<GatewayState>>,
    Path(idp_id): Path<String>,
    Query(query): Query<RedirectQuery>,
) -> Result<Response, ApiError> {
    let identity = state.identity();
    let idp = identity
        .list_idps(&IdpFilter {
            sso_domain: "all".to_string(),
            auto_create_user: None,
        })
        .await?
        .into_iter()
        .find(|idp| idp.id == idp_id)
        .ok_or_else(|| ApiError::NotFound(format!("identity provider {idp_id} not found")))?;

    let sso_state = random_state()?;
    let location = identity
        .sso_redirect_uri(&idp.id, &state.config().sso_callback_url(), &sso_state)
        .await
        .map_err(|err| {
            error!(idp_id = %idp.id, error = %err, "failed to build sso redirect");
            ApiError::from(err)
        })?;

    let stash = SsoStash {
        state: sso_state,
        idp_id: idp.id,
        idp_driver: idp.driver,
        return_url: query.rf.filter(|rf| !rf.is_empty()),
    };
    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        state
            .cookies()
            .plain_cookie(SSO_STATE_COOKIE, &stash.encode(), SSO_STATE_MAX_AGE)
            .map_err(|err| ApiError::GeneralServer(err.to_string()))?,
    );
    Ok(found(&location, headers))
}

/// Query pairs first, then form fields the query did not set.
fn callback_payload(
    query: Option<&str>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Map<String, Value>, ApiError> {
    let mut payload = form_to_map(query.unwrap_or_default().as_bytes());
    for (key, value) in parse_body(headers, body)? {
        payload.entry(key).or_insert(value);
    }
    Ok(payload)
}

fn fill_from_stash(payload: &mut Map<String, Value>, stash: &SsoStash) -> Result<(), ApiError> {
    if !stash.state.is_empty() {
        let returned = payload.get("state").and_then(Value::as_str);
        if returned != Some(stash.state.as_str()) {
            return Err(ApiError::InvalidCredential("sso state mismatch".to_string()));
        }
    }
    for (key, value) in [("idp_id", &stash.idp_id), ("idp_driver", &stash.idp_driver)] {
        if !value.is_empty() {
            payload
                .entry(key.to_string())
                .or_insert_with(|| Value::String(value.clone()));
        }
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/ssologin",
    responses(
        (status = 302, description = "Back to the console, with cookies on success or error details in the query")
    ),
    tag = "sso"
)]
pub async fn sso_login(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    RawQuery(query): RawQuery,
    // Aliased so utoipa does not infer an undocumented request body.
    body: RawBody,
) -> Response {
    let stash = read_cookie(&headers, SSO_STATE_COOKIE)
        .map(|cookie| SsoStash::decode(&cookie))
        .unwrap_or_default();
    let cleared = state.cookies().clear_cookie(SSO_STATE_COOKIE).ok();

    let login_url = state.config().login_url();
    match complete_sso(&state, &headers, query.as_deref(), &body, &stash).await {
        Ok(mut cookies) => {
            if let Some(value) = cleared {
                cookies.append(SET_COOKIE, value);
            }
            info!(idp_id = %stash.idp_id, "sso login succeeded");
            found(stash.return_url.as_deref().unwrap_or(login_url), cookies)
        }
        Err(err) => {
            warn!(idp_id = %stash.idp_id, error = %err, "sso login failed");
            let mut headers = HeaderMap::new();
            if let Some(value) = cleared {
                headers.append(SET_COOKIE, value);
            }
            let body = err.body();
            let location = add_query(
                login_url,
                &[
                    ("result", "error"),
                    ("error_class", body.class.as_str()),
                    ("error_details", body.details.as_str()),
                ],
            );
            found(&location, headers)
        }
    }
}

async fn complete_sso(
    state: &GatewayState,
    headers: &HeaderMap,
    query: Option<&str>,
    body: &Bytes,
    stash: &SsoStash,
) -> Result<HeaderMap, ApiError> {
    let mut payload = callback_payload(query, headers, body)?;
    fill_from_stash(&mut payload, stash)?;
    let outcome = state
        .login()
        .login(&request_context(headers), LoginRequest::new(payload), None)
        .await?;
    login_cookies(state, &outcome)
}
