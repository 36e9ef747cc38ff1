//! The session cookie.
//!
//! A session is the backend token plus its MFA flags, sealed into a single
//! cookie-safe string. Nothing is kept server side.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{AUTHORIZATION, COOKIE, InvalidHeaderValue},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use url::form_urlencoded;

use crate::crypto::{CryptoBox, CryptoError};

pub const AUTH_COOKIE_NAME: &str = "apigate_auth";
const SESSION_CONTEXT: &str = "session";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("malformed session")]
    Decode,
    #[error("failed to encode session: {0}")]
    Encode(#[from] CryptoError),
    #[error("failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Backend token plus MFA state for one browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    token: String,
    mfa_required: bool,
    mfa_verified: bool,
    #[serde(default)]
    totp_initialized: bool,
}

impl AuthToken {
    #[must_use]
    pub fn new(token: impl Into<String>, mfa_required: bool, totp_initialized: bool) -> Self {
        Self {
            token: token.into(),
            mfa_required,
            mfa_verified: false,
            totp_initialized,
        }
    }

    /// A session for machine clients: no MFA flags set.
    #[must_use]
    pub fn machine(token: impl Into<String>) -> Self {
        Self::new(token, false, false)
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn mfa_required(&self) -> bool {
        self.mfa_required
    }

    #[must_use]
    pub fn mfa_verified(&self) -> bool {
        self.mfa_verified
    }

    #[must_use]
    pub fn totp_initialized(&self) -> bool {
        self.totp_initialized
    }

    #[must_use]
    pub fn is_totp_verified(&self) -> bool {
        !self.mfa_required || self.mfa_verified
    }

    /// Record a correct passcode for this session.
    #[must_use]
    pub fn verified(mut self) -> Self {
        self.mfa_verified = true;
        self.totp_initialized = true;
        self
    }

    #[must_use]
    pub fn with_totp_initialized(mut self, initialized: bool) -> Self {
        self.totp_initialized = initialized;
        self
    }

    /// Same flags, new backend token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct SessionCodec {
    crypto: Arc<CryptoBox>,
}

impl SessionCodec {
    #[must_use]
    pub fn new(crypto: Arc<CryptoBox>) -> Self {
        Self { crypto }
    }

    /// # Errors
    /// Returns an error if the session cannot be serialized or sealed.
    pub fn encode(&self, auth: &AuthToken) -> Result<String, SessionError> {
        let json = serde_json::to_vec(auth)?;
        Ok(self.crypto.seal(SESSION_CONTEXT, &json)?)
    }

    /// # Errors
    /// Returns [`SessionError::Decode`] for anything that is not a session this
    /// gateway sealed.
    pub fn decode(&self, value: &str) -> Result<AuthToken, SessionError> {
        let json = self
            .crypto
            .open(SESSION_CONTEXT, value)
            .map_err(|_| SessionError::Decode)?;
        serde_json::from_slice(&json).map_err(|_| SessionError::Decode)
    }
}

/// Attributes shared by every cookie the gateway sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieConfig {
    domain: Option<String>,
    secure: bool,
    http_only: bool,
}

impl CookieConfig {
    #[must_use]
    pub fn new(domain: Option<String>, secure: bool, http_only: bool) -> Self {
        Self {
            domain: domain.filter(|d| !d.trim().is_empty()),
            secure,
            http_only,
        }
    }

    fn finish(&self, mut cookie: String, http_only: bool) -> Result<HeaderValue, InvalidHeaderValue> {
        if let Some(domain) = &self.domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        if http_only {
            cookie.push_str("; HttpOnly");
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }

    /// The session cookie; `max_age` is the seconds until the backend token expires.
    ///
    /// # Errors
    /// Returns an error if the value cannot be carried in a header.
    pub fn auth_cookie(&self, value: &str, max_age: i64) -> Result<HeaderValue, InvalidHeaderValue> {
        self.finish(
            format!("{AUTH_COOKIE_NAME}={value}; Path=/; SameSite=Lax; Max-Age={max_age}"),
            self.http_only,
        )
    }

    /// A plaintext companion cookie readable by the console.
    ///
    /// # Errors
    /// Returns an error if the value cannot be carried in a header.
    pub fn plain_cookie(
        &self,
        name: &str,
        value: &str,
        max_age: i64,
    ) -> Result<HeaderValue, InvalidHeaderValue> {
        let value: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
        self.finish(
            format!("{name}={value}; Path=/; SameSite=Lax; Max-Age={max_age}"),
            false,
        )
    }

    /// # Errors
    /// Returns an error if the name cannot be carried in a header.
    pub fn clear_cookie(&self, name: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        self.finish(
            format!("{name}=; Path=/; SameSite=Lax; Max-Age=0"),
            self.http_only && name == AUTH_COOKIE_NAME,
        )
    }
}

/// Value of cookie `name`, if the request carries one.
#[must_use]
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| val.trim().to_string())
        })
        .filter(|val| !val.is_empty())
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Encoded session from the bearer header, else from the auth cookie.
#[must_use]
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers).or_else(|| read_cookie(headers, AUTH_COOKIE_NAME))
}
