pub mod health;
pub mod login;
pub mod oidc;
pub mod sso;
pub mod totp;
pub mod user;

use axum::{
    body::Bytes,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CONTENT_TYPE, LOCATION, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, error};
use url::form_urlencoded;

use super::state::GatewayState;
use crate::error::ApiError;
use crate::identity::TokenCredential;
use crate::login::{LoginOutcome, RequestContext};
use crate::session::{AUTH_COOKIE_NAME, AuthToken, extract_session_token};

/// First hop of `x-forwarded-for`, else `x-real-ip`.
pub(crate) fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    forwarded
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
        })
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn request_context(headers: &HeaderMap) -> RequestContext {
    RequestContext::new(client_ip(headers))
}

/// A decoded session whose backend token still verifies.
pub(crate) struct Session {
    pub auth: AuthToken,
    pub token: TokenCredential,
}

impl Session {
    pub(crate) fn require_verified(self) -> Result<Self, ApiError> {
        if self.auth.is_totp_verified() {
            Ok(self)
        } else {
            Err(ApiError::InvalidCredential(
                "TOTP authentication failed".to_string(),
            ))
        }
    }
}

/// The caller's session, TOTP verified or not.
pub(crate) async fn resolve_session(
    state: &GatewayState,
    headers: &HeaderMap,
) -> Result<Session, ApiError> {
    let invalid = || ApiError::InvalidCredential("invalid session".to_string());
    let encoded = extract_session_token(headers).ok_or_else(invalid)?;
    let auth = state.codec().decode(&encoded).map_err(|err| {
        debug!(error = %err, "session cookie rejected");
        invalid()
    })?;
    let token = state
        .identity()
        .verify_token(auth.token())
        .await
        .map_err(|err| {
            debug!(error = %err, "session token rejected by backend");
            invalid()
        })?;
    Ok(Session { auth, token })
}

/// The caller's session when the request carries a valid one.
pub(crate) fn decode_session(state: &GatewayState, headers: &HeaderMap) -> Option<AuthToken> {
    let encoded = extract_session_token(headers)?;
    state.codec().decode(&encoded).ok()
}

fn header_error(err: impl std::fmt::Display) -> ApiError {
    error!(error = %err, "failed to build response header");
    ApiError::GeneralServer("failed to build response".to_string())
}

/// `Set-Cookie` for a session that lives as long as `token`.
pub(crate) fn session_cookie(
    state: &GatewayState,
    auth: &AuthToken,
    token: &TokenCredential,
) -> Result<HeaderValue, ApiError> {
    let encoded = state.codec().encode(auth).map_err(header_error)?;
    state
        .cookies()
        .auth_cookie(&encoded, token.max_age(crate::unix_now()))
        .map_err(header_error)
}

/// Session cookie plus the console's plaintext companions.
pub(crate) fn login_cookies(
    state: &GatewayState,
    outcome: &LoginOutcome,
) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.append(
        SET_COOKIE,
        session_cookie(state, &outcome.auth, &outcome.token)?,
    );
    let max_age = outcome.token.max_age(crate::unix_now());
    for (name, value) in &outcome.companions {
        headers.append(
            SET_COOKIE,
            state
                .cookies()
                .plain_cookie(name, value, max_age)
                .map_err(header_error)?,
        );
    }
    Ok(headers)
}

pub(crate) fn clear_session_cookie(state: &GatewayState) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.append(
        SET_COOKIE,
        state
            .cookies()
            .clear_cookie(AUTH_COOKIE_NAME)
            .map_err(header_error)?,
    );
    Ok(headers)
}

/// 302 to `location`, carrying `headers`.
pub(crate) fn found(location: &str, mut headers: HeaderMap) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            headers.insert(LOCATION, value);
            (StatusCode::FOUND, headers).into_response()
        }
        Err(err) => header_error(err).into_response(),
    }
}

/// A JSON object or a form body; an empty body is an empty object.
pub(crate) fn parse_body(headers: &HeaderMap, body: &Bytes) -> Result<Map<String, Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    let is_form = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));
    if is_form {
        return Ok(form_to_map(body));
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::InputParameter(
            "request body must be an object".to_string(),
        )),
        Err(err) => Err(ApiError::InputParameter(format!("invalid json body: {err}"))),
    }
}

/// Deserialize a body through [`parse_body`].
pub(crate) fn parse_typed<T: DeserializeOwned>(
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<T, ApiError> {
    let map = parse_body(headers, body)?;
    serde_json::from_value(Value::Object(map))
        .map_err(|err| ApiError::InputParameter(format!("invalid request body: {err}")))
}

/// Form or query pairs as string values; the first occurrence of a key wins.
pub(crate) fn form_to_map(raw: &[u8]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in form_urlencoded::parse(raw) {
        map.entry(key.into_owned())
            .or_insert_with(|| Value::String(value.into_owned()));
    }
    map
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::*;
    use crate::api::state::GatewayConfig;
    use crate::policy::StaticPolicyEngine;
    use crate::test_support::{MemoryIdentity, test_crypto};
    use std::sync::Arc;

    pub(crate) fn gateway(identity: MemoryIdentity) -> Arc<GatewayState> {
        gateway_with(identity, GatewayConfig::new("https://gw.example.test"))
    }

    pub(crate) fn gateway_with(identity: MemoryIdentity, config: GatewayConfig) -> Arc<GatewayState> {
        Arc::new(GatewayState::new(
            config,
            Arc::new(identity),
            Arc::new(StaticPolicyEngine::empty()),
            Arc::new(test_crypto()),
        ))
    }

    /// `Cookie` header value carrying `auth` as the session.
    pub(crate) fn session_header(state: &GatewayState, auth: &AuthToken) -> anyhow::Result<String> {
        Ok(format!("{AUTH_COOKIE_NAME}={}", state.codec().encode(auth)?))
    }

    pub(crate) fn set_cookies(headers: &HeaderMap) -> Vec<String> {
        headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(ToString::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ip_prefers_forwarded_for() -> anyhow::Result<()> {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "");
        headers.insert("x-real-ip", "10.0.0.2".parse()?);
        assert_eq!(client_ip(&headers), "10.0.0.2");
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse()?);
        assert_eq!(client_ip(&headers), "203.0.113.9");
        Ok(())
    }

    #[test]
    fn bodies_parse_as_json_or_form() -> anyhow::Result<()> {
        let mut headers = HeaderMap::new();
        let json = parse_body(&headers, &Bytes::from_static(br#"{"username":"alice"}"#))?;
        assert_eq!(json.get("username"), Some(&Value::String("alice".to_string())));
        assert!(parse_body(&headers, &Bytes::new())?.is_empty());
        assert!(matches!(
            parse_body(&headers, &Bytes::from_static(b"[1]")),
            Err(ApiError::InputParameter(_))
        ));

        headers.insert(CONTENT_TYPE, "application/x-www-form-urlencoded".parse()?);
        let form = parse_body(&headers, &Bytes::from_static(b"a=1&a=2&b=x+y"))?;
        assert_eq!(form.get("a"), Some(&Value::String("1".to_string())));
        assert_eq!(form.get("b"), Some(&Value::String("x y".to_string())));
        Ok(())
    }
}
