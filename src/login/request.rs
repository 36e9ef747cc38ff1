use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::policy::RbacScope;

/// A login body as posted by the console or assembled from an SSO callback.
///
/// Kept as a loose JSON object: the pre-login hook and the SSO exchange both
/// see fields this crate knows nothing about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoginRequest {
    body: Map<String, Value>,
}

impl LoginRequest {
    #[must_use]
    pub fn new(body: Map<String, Value>) -> Self {
        Self { body }
    }

    #[must_use]
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.body.contains_key(key)
    }

    /// Field `key` as text. Booleans and numbers are rendered, `null` is empty.
    #[must_use]
    pub fn string(&self, key: &str) -> Option<String> {
        match self.body.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Null => Some(String::new()),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Present when the body asks for a tenant switch.
    ///
    /// # Errors
    /// Returns an error if `tenantId` is present but not text.
    pub fn tenant_id(&self) -> Result<Option<String>, ApiError> {
        if !self.contains("tenantId") {
            return Ok(None);
        }
        self.string("tenantId")
            .map(Some)
            .ok_or_else(|| ApiError::InputParameter("not found tenantId in body".to_string()))
    }

    #[must_use]
    pub fn username(&self) -> Option<String> {
        self.string("username")
    }

    #[must_use]
    pub fn password(&self) -> Option<String> {
        self.string("password")
    }

    /// Login domain, when one was named.
    #[must_use]
    pub fn domain(&self) -> Option<String> {
        self.string("domain").filter(|d| !d.is_empty())
    }

    pub(crate) fn set_scope(&mut self, scope: RbacScope) {
        self.body
            .insert("scope".to_string(), Value::String(scope.to_string()));
    }
}

impl From<Map<String, Value>> for LoginRequest {
    fn from(body: Map<String, Value>) -> Self {
        Self::new(body)
    }
}

/// Split `tenant/user` into its parts. Without a tenant the first part is empty.
#[must_use]
pub fn parse_login_user(raw: &str) -> (String, String) {
    match raw.find('/') {
        Some(0) => (String::new(), raw[1..].to_string()),
        Some(pos) => (raw[..pos].to_string(), raw[pos + 1..].to_string()),
        None => (String::new(), raw.to_string()),
    }
}

/// The console may post the password base64 encoded; use the decoded form only
/// when it is printable ASCII.
#[must_use]
pub fn decode_password(password: &str) -> String {
    match STANDARD.decode(password) {
        Ok(bytes) if !bytes.is_empty() && bytes.iter().all(|b| (0x20..=0x7e).contains(b)) => {
            String::from_utf8(bytes).unwrap_or_else(|_| password.to_string())
        }
        _ => password.to_string(),
    }
}
