//! OpenID Connect provider: authorization code flow with client secrets.
//!
//! Codes carry no client binding; the token endpoint re-checks the client
//! secret and the registered redirect URI instead.

mod code;
mod discovery;
mod error;
mod query;

pub use code::{CODE_TTL_NANOS, OidcClientInfo, unix_now_nanos};
pub use discovery::DiscoveryDocument;
pub use error::{OidcError, OidcErrorBody, OidcErrorKind};
pub use query::{add_query, join_url, query_unescape};

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::crypto::{CryptoBox, IdTokenClaims, Jwks};
use crate::identity::IdentityBackend;
use crate::session::{AuthToken, SessionCodec};

pub const RESPONSE_TYPE_CODE: &str = "code";
pub const GRANT_TYPE_AUTHORIZATION_CODE: &str = "authorization_code";

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeRequest {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub state: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub id_token: String,
    pub expires_in: i64,
}

/// Result of an authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeOutcome {
    /// Send the browser here: the code on success, or the error for the client.
    Redirect(String),
    /// No usable `redirect_uri`; answer the caller directly.
    Reject(OidcError),
}

/// Where to send a browser that has no usable session yet.
#[must_use]
pub fn login_redirect(
    login_url: &str,
    callback_param: &str,
    api_server: &str,
    original_url: &str,
) -> String {
    let original = join_url(api_server, original_url);
    add_query(login_url, &[(callback_param, &original)])
}

pub struct OidcProvider {
    identity: Arc<dyn IdentityBackend>,
    crypto: Arc<CryptoBox>,
    codec: SessionCodec,
    issuer: String,
    route_prefix: String,
}

impl OidcProvider {
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityBackend>,
        crypto: Arc<CryptoBox>,
        issuer: impl Into<String>,
        route_prefix: impl Into<String>,
    ) -> Self {
        let codec = SessionCodec::new(crypto.clone());
        Self {
            identity,
            crypto,
            codec,
            issuer: issuer.into(),
            route_prefix: route_prefix.into(),
        }
    }

    #[must_use]
    pub fn discovery(&self) -> DiscoveryDocument {
        DiscoveryDocument::new(&self.issuer, &self.route_prefix)
    }

    #[must_use]
    pub fn jwks(&self) -> &Jwks {
        self.crypto.jwks()
    }

    /// Issue a code for a caller that already holds a verified session.
    pub async fn authorize(
        &self,
        request: &AuthorizeRequest,
        client_ip: &str,
        now_ns: i64,
    ) -> AuthorizeOutcome {
        let redirect_uri = request.redirect_uri.clone().unwrap_or_default();
        match self.issue_code(request, &redirect_uri, client_ip, now_ns).await {
            Ok(code) => {
                let mut params = vec![("code", code.as_str())];
                if let Some(state) = request.state.as_deref() {
                    params.push(("state", state));
                }
                AuthorizeOutcome::Redirect(add_query(&redirect_uri, &params))
            }
            Err(err) => {
                warn!(error = %err, client_id = ?request.client_id, "authorization refused");
                if url::Url::parse(&redirect_uri).is_ok() {
                    AuthorizeOutcome::Redirect(add_query(
                        &redirect_uri,
                        &[
                            ("error", err.kind().as_str()),
                            ("error_description", err.description()),
                        ],
                    ))
                } else {
                    AuthorizeOutcome::Reject(err)
                }
            }
        }
    }

    async fn issue_code(
        &self,
        request: &AuthorizeRequest,
        redirect_uri: &str,
        client_ip: &str,
        now_ns: i64,
    ) -> Result<String, OidcError> {
        if request.response_type.as_deref() != Some(RESPONSE_TYPE_CODE) {
            return Err(OidcError::new(
                OidcErrorKind::UnsupportedResponseType,
                "response_type must be code",
            ));
        }
        let client_id = request
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| OidcError::invalid_client("missing client_id"))?;
        let credential = self
            .identity
            .get_oidc_credential(client_id)
            .await
            .map_err(|err| {
                debug!(client_id, error = %err, "unknown oidc client");
                OidcError::invalid_client("client not found")
            })?;
        if credential.redirect_uri != redirect_uri {
            return Err(OidcError::invalid_request("redirect uri not match"));
        }

        OidcClientInfo::new(now_ns, client_ip)
            .seal(&self.crypto)
            .map_err(|err| {
                error!(error = %err, "failed to seal authorization code");
                OidcError::server_error("failed to issue code")
            })
    }

    /// Exchange a code for tokens. The backend sees the address of the
    /// browser that was issued the code, not of the relying party.
    ///
    /// # Errors
    /// Returns the OAuth error for the first check that fails, in a fixed order.
    pub async fn token(
        &self,
        request: &TokenRequest,
        authorization: Option<&str>,
        now_ns: i64,
    ) -> Result<TokenResponse, OidcError> {
        if request.grant_type != GRANT_TYPE_AUTHORIZATION_CODE {
            return Err(OidcError::new(
                OidcErrorKind::UnsupportedGrantType,
                "grant_type must be authorization_code",
            ));
        }
        let info = OidcClientInfo::open(&self.crypto, &request.code)
            .ok_or_else(|| OidcError::invalid_grant("invalid code"))?;
        if info.is_expired_at(now_ns) {
            return Err(OidcError::invalid_grant("code expired"));
        }

        let (client_id, client_secret) = basic_credentials(authorization)?;
        let credential = self
            .identity
            .get_oidc_credential(&client_id)
            .await
            .map_err(|err| {
                debug!(client_id, error = %err, "unknown oidc client");
                OidcError::invalid_client("client secret not match")
            })?;
        if credential.redirect_uri != request.redirect_uri || credential.secret != client_secret {
            return Err(OidcError::invalid_client("client secret not match"));
        }

        let token = self
            .identity
            .authenticate_by_access_key(&client_id, &client_secret, &info.ip.to_string())
            .await
            .map_err(|err| {
                warn!(client_id, error = %err, "client credential rejected by backend");
                OidcError::invalid_client(err.message().to_string())
            })?;

        let now = now_ns / 1_000_000_000;
        let access_token = self
            .codec
            .encode(&AuthToken::machine(token.token.clone()))
            .map_err(|err| {
                error!(error = %err, "failed to encode access token");
                OidcError::server_error("failed to issue token")
            })?;
        let id_token = self
            .crypto
            .sign_jwt(&IdTokenClaims {
                iss: self.issuer.clone(),
                sub: token.user_id.clone(),
                aud: client_id.clone(),
                exp: token.expires_at,
                iat: now,
            })
            .map_err(|err| {
                error!(error = %err, "failed to sign id token");
                OidcError::server_error("failed to issue token")
            })?;

        info!(client_id, user_id = %token.user_id, "oidc tokens issued");
        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            id_token,
            expires_in: token.expires_at - now,
        })
    }
}

/// `Basic base64(client_id:client_secret)`, each part URL-escaped.
fn basic_credentials(authorization: Option<&str>) -> Result<(String, String), OidcError> {
    let header = authorization.unwrap_or_default();
    let parts: Vec<&str> = header.split(' ').collect();
    let [scheme, encoded] = parts.as_slice() else {
        return Err(OidcError::invalid_request("illegal authorization header"));
    };
    if *scheme != "Basic" {
        return Err(OidcError::invalid_request("illegal authorization header"));
    }
    let decoded = STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| OidcError::invalid_client("illegal client credential"))?;
    let parts: Vec<&str> = decoded.split(':').collect();
    let [client_id, client_secret] = parts.as_slice() else {
        return Err(OidcError::invalid_client("illegal client credential"));
    };
    Ok((query_unescape(client_id), query_unescape(client_secret)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryIdentity, test_crypto, token};

    const REDIRECT: &str = "https://rp.example.test/cb";
    const NOW: i64 = 1_700_000_000_000_000_000;

    fn provider(identity: MemoryIdentity) -> OidcProvider {
        OidcProvider::new(
            Arc::new(identity),
            Arc::new(test_crypto()),
            "https://gw.example.test",
            "/api/v1/auth",
        )
    }

    fn registered() -> MemoryIdentity {
        let mut machine = token("u1", "alice", "p1");
        machine.expires_at = NOW / 1_000_000_000 + 600;
        MemoryIdentity::new()
            .with_oidc_client("rp", "s3cret", REDIRECT)
            .with_access_key("rp", "s3cret", machine)
    }

    fn authorize_request(client_id: &str, redirect_uri: &str) -> AuthorizeRequest {
        AuthorizeRequest {
            response_type: Some("code".to_string()),
            client_id: Some(client_id.to_string()),
            redirect_uri: Some(redirect_uri.to_string()),
            state: Some("xyz".to_string()),
            scope: None,
        }
    }

    fn basic(id: &str, secret: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{id}:{secret}")))
    }

    fn code_from(location: &str) -> anyhow::Result<String> {
        let url = url::Url::parse(location)?;
        url.query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .ok_or_else(|| anyhow::anyhow!("no code in {location}"))
    }

    fn token_request(code: &str) -> TokenRequest {
        TokenRequest {
            grant_type: GRANT_TYPE_AUTHORIZATION_CODE.to_string(),
            code: code.to_string(),
            redirect_uri: REDIRECT.to_string(),
            client_id: None,
        }
    }

    #[tokio::test]
    async fn code_flow_issues_tokens() -> anyhow::Result<()> {
        let provider = provider(registered());
        let AuthorizeOutcome::Redirect(location) = provider
            .authorize(&authorize_request("rp", REDIRECT), "10.0.0.5", NOW)
            .await
        else {
            anyhow::bail!("expected a redirect");
        };
        assert!(location.starts_with(REDIRECT));
        assert!(location.ends_with("&state=xyz"));

        let code = code_from(&location)?;
        let tokens = provider
            .token(
                &token_request(&code),
                Some(&basic("rp", "s3cret")),
                NOW + 1_000_000_000,
            )
            .await?;
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_in, 599);
        assert_eq!(tokens.id_token.split('.').count(), 3);

        let session = provider.codec.decode(&tokens.access_token)?;
        assert_eq!(session, AuthToken::machine("tok-u1-p1"));
        Ok(())
    }

    #[tokio::test]
    async fn token_reports_browser_address_to_backend() -> anyhow::Result<()> {
        let identity = Arc::new(registered());
        let provider = OidcProvider::new(
            identity.clone(),
            Arc::new(test_crypto()),
            "https://gw.example.test",
            "/api/v1/auth",
        );
        let code = OidcClientInfo::new(NOW, "198.51.100.7").seal(&provider.crypto)?;
        provider
            .token(&token_request(&code), Some(&basic("rp", "s3cret")), NOW)
            .await?;
        assert_eq!(identity.last_login_ip().as_deref(), Some("198.51.100.7"));
        Ok(())
    }

    #[tokio::test]
    async fn authorize_errors_redirect_or_reject() {
        let provider = provider(registered());

        let mut bad_type = authorize_request("rp", REDIRECT);
        bad_type.response_type = Some("token".to_string());
        let outcome = provider.authorize(&bad_type, "", NOW).await;
        assert_eq!(
            outcome,
            AuthorizeOutcome::Redirect(format!(
                "{REDIRECT}?error=unsupported_response_type&error_description=response_type+must+be+code"
            ))
        );

        let outcome = provider
            .authorize(&authorize_request("stranger", REDIRECT), "", NOW)
            .await;
        let AuthorizeOutcome::Redirect(location) = outcome else {
            panic!("expected a redirect");
        };
        assert!(location.contains("error=invalid_client"));
        assert!(!location.contains("code="));

        let outcome = provider
            .authorize(&authorize_request("rp", "https://evil.example.test/cb"), "", NOW)
            .await;
        let AuthorizeOutcome::Redirect(location) = outcome else {
            panic!("expected a redirect");
        };
        assert!(location.starts_with("https://evil.example.test/cb?error=invalid_request"));

        let outcome = provider
            .authorize(&authorize_request("stranger", "/relative"), "", NOW)
            .await;
        assert!(matches!(
            outcome,
            AuthorizeOutcome::Reject(err) if err.kind() == OidcErrorKind::InvalidClient
        ));
    }

    #[tokio::test]
    async fn token_checks_run_in_order() -> anyhow::Result<()> {
        let provider = provider(registered());
        let code = OidcClientInfo::new(NOW, "10.0.0.5").seal(&provider.crypto)?;
        let auth = basic("rp", "s3cret");

        let mut wrong_grant = token_request("garbage");
        wrong_grant.grant_type = "password".to_string();
        let err = provider.token(&wrong_grant, None, NOW).await.err();
        assert_eq!(err.map(|e| e.kind()), Some(OidcErrorKind::UnsupportedGrantType));

        let err = provider
            .token(&token_request("garbage"), Some(&auth), NOW)
            .await
            .err();
        assert_eq!(err.map(|e| e.kind()), Some(OidcErrorKind::InvalidGrant));

        let err = provider
            .token(&token_request(&code), Some(&auth), NOW + CODE_TTL_NANOS + 1)
            .await
            .err();
        assert_eq!(err, Some(OidcError::invalid_grant("code expired")));
        assert!(
            provider
                .token(&token_request(&code), Some(&auth), NOW + CODE_TTL_NANOS)
                .await
                .is_ok()
        );

        for header in [None, Some("Bearer abc"), Some("Basic a b")] {
            let err = provider.token(&token_request(&code), header, NOW).await.err();
            assert_eq!(err.map(|e| e.kind()), Some(OidcErrorKind::InvalidRequest));
        }
        let no_colon = format!("Basic {}", STANDARD.encode("no-colon"));
        for header in ["Basic !!!", no_colon.as_str()] {
            let err = provider
                .token(&token_request(&code), Some(header), NOW)
                .await
                .err();
            assert_eq!(err.map(|e| e.kind()), Some(OidcErrorKind::InvalidClient));
        }
        Ok(())
    }

    #[tokio::test]
    async fn mismatched_client_never_gets_tokens() -> anyhow::Result<()> {
        let provider = provider(registered());
        let code = OidcClientInfo::new(NOW, "10.0.0.5").seal(&provider.crypto)?;
        let expected = Some(OidcError::invalid_client("client secret not match"));

        let mut other_redirect = token_request(&code);
        other_redirect.redirect_uri = "https://rp.example.test/other".to_string();
        let err = provider
            .token(&other_redirect, Some(&basic("rp", "s3cret")), NOW)
            .await
            .err();
        assert_eq!(err, expected);

        let err = provider
            .token(&token_request(&code), Some(&basic("rp", "wrong")), NOW)
            .await
            .err();
        assert_eq!(err, expected);

        let err = provider
            .token(&token_request(&code), Some(&basic("ghost", "s3cret")), NOW)
            .await
            .err();
        assert_eq!(err, expected);
        Ok(())
    }

    #[tokio::test]
    async fn escaped_credentials_are_decoded() -> anyhow::Result<()> {
        let mut machine = token("u1", "alice", "p1");
        machine.expires_at = NOW / 1_000_000_000 + 60;
        let provider = provider(
            MemoryIdentity::new()
                .with_oidc_client("rp one", "s:cret", REDIRECT)
                .with_access_key("rp one", "s:cret", machine),
        );
        let code = OidcClientInfo::new(NOW, "10.0.0.5").seal(&provider.crypto)?;
        let tokens = provider
            .token(
                &token_request(&code),
                Some(&basic("rp%20one", "s%3Acret")),
                NOW,
            )
            .await?;
        assert_eq!(tokens.expires_in, 60);
        Ok(())
    }

    #[test]
    fn login_redirect_joins_relative_urls() {
        assert_eq!(
            login_redirect(
                "/auth/login",
                "rf",
                "https://gw.example.test",
                "/api/v1/auth/oidc/auth?client_id=rp"
            ),
            "/auth/login?rf=https%3A%2F%2Fgw.example.test%2Fapi%2Fv1%2Fauth%2Foidc%2Fauth%3Fclient_id%3Drp"
        );
    }
}
