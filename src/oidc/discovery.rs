use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// `/.well-known/openid-configuration` document.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub claims_supported: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

impl DiscoveryDocument {
    #[must_use]
    pub fn new(issuer: &str, route_prefix: &str) -> Self {
        let base = format!("{}{}/oidc", issuer.trim_end_matches('/'), route_prefix);
        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{base}/auth"),
            token_endpoint: format!("{base}/token"),
            userinfo_endpoint: format!("{base}/user"),
            jwks_uri: format!("{base}/keys"),
            response_types_supported: strings(&["code"]),
            subject_types_supported: strings(&["public"]),
            id_token_signing_alg_values_supported: strings(&["RS256"]),
            scopes_supported: strings(&["user", "profile"]),
            token_endpoint_auth_methods_supported: strings(&["client_secret_basic"]),
            claims_supported: strings(&["iss", "sub", "aud", "exp", "iat"]),
        }
    }
}
