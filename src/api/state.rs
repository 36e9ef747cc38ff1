use std::sync::Arc;

use crate::crypto::CryptoBox;
use crate::identity::IdentityBackend;
use crate::login::{LoginFlow, PreLoginHook};
use crate::oidc::{OidcProvider, join_url};
use crate::policy::PolicyEngine;
use crate::session::{CookieConfig, SessionCodec};
use crate::totp::{DEFAULT_SKEW, TotpGate};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ROUTE_PREFIX: &str = "/api/v1/auth";
pub const DEFAULT_LOGIN_URL: &str = "/auth/login";
pub const DEFAULT_LOGIN_CALLBACK_PARAM: &str = "rf";
pub const DEFAULT_TOTP_ISSUER: &str = "apigate";

/// Runtime settings for the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    api_server: String,
    route_prefix: String,
    cookie_domain: Option<String>,
    cookie_http_only: bool,
    login_url: String,
    login_callback_param: String,
    sso_callback_url: Option<String>,
    enable_totp: bool,
    totp_issuer: String,
    totp_skew: u8,
    allow_encoded_password: bool,
}

/// `/api/v1/auth/` and `api/v1/auth` both become `/api/v1/auth`; `/` becomes empty.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

impl GatewayConfig {
    /// Defaults for everything but the public base URL.
    #[must_use]
    pub fn new(api_server: impl Into<String>) -> Self {
        Self {
            api_server: api_server.into().trim_end_matches('/').to_string(),
            route_prefix: DEFAULT_ROUTE_PREFIX.to_string(),
            cookie_domain: None,
            cookie_http_only: true,
            login_url: DEFAULT_LOGIN_URL.to_string(),
            login_callback_param: DEFAULT_LOGIN_CALLBACK_PARAM.to_string(),
            sso_callback_url: None,
            enable_totp: false,
            totp_issuer: DEFAULT_TOTP_ISSUER.to_string(),
            totp_skew: DEFAULT_SKEW,
            allow_encoded_password: true,
        }
    }

    #[must_use]
    pub fn with_route_prefix(mut self, prefix: &str) -> Self {
        self.route_prefix = normalize_prefix(prefix);
        self
    }

    #[must_use]
    pub fn with_cookie_domain(mut self, domain: Option<String>) -> Self {
        self.cookie_domain = domain;
        self
    }

    #[must_use]
    pub fn with_cookie_http_only(mut self, http_only: bool) -> Self {
        self.cookie_http_only = http_only;
        self
    }

    #[must_use]
    pub fn with_login_url(mut self, login_url: impl Into<String>) -> Self {
        self.login_url = login_url.into();
        self
    }

    #[must_use]
    pub fn with_login_callback_param(mut self, param: impl Into<String>) -> Self {
        self.login_callback_param = param.into();
        self
    }

    #[must_use]
    pub fn with_sso_callback_url(mut self, url: Option<String>) -> Self {
        self.sso_callback_url = url.filter(|u| !u.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_totp(mut self, enable: bool) -> Self {
        self.enable_totp = enable;
        self
    }

    #[must_use]
    pub fn with_totp_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.totp_issuer = issuer.into();
        self
    }

    #[must_use]
    pub fn with_totp_skew(mut self, skew: u8) -> Self {
        self.totp_skew = skew;
        self
    }

    #[must_use]
    pub fn with_encoded_password(mut self, allow: bool) -> Self {
        self.allow_encoded_password = allow;
        self
    }

    #[must_use]
    pub fn api_server(&self) -> &str {
        &self.api_server
    }

    #[must_use]
    pub fn route_prefix(&self) -> &str {
        &self.route_prefix
    }

    #[must_use]
    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    #[must_use]
    pub fn login_callback_param(&self) -> &str {
        &self.login_callback_param
    }

    #[must_use]
    pub fn enable_totp(&self) -> bool {
        self.enable_totp
    }

    #[must_use]
    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }

    #[must_use]
    pub fn totp_skew(&self) -> u8 {
        self.totp_skew
    }

    #[must_use]
    pub fn allow_encoded_password(&self) -> bool {
        self.allow_encoded_password
    }

    /// Cookies are `Secure` when the gateway is served over https.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.api_server.starts_with("https://")
    }

    #[must_use]
    pub fn cookie_config(&self) -> CookieConfig {
        CookieConfig::new(
            self.cookie_domain.clone(),
            self.cookie_secure(),
            self.cookie_http_only,
        )
    }

    /// Where identity providers send the browser back to.
    #[must_use]
    pub fn sso_callback_url(&self) -> String {
        self.sso_callback_url.clone().unwrap_or_else(|| {
            join_url(
                &self.api_server,
                &format!("{}/ssologin", self.route_prefix),
            )
        })
    }
}

/// Everything a handler needs, shared read-only across requests.
pub struct GatewayState {
    config: GatewayConfig,
    identity: Arc<dyn IdentityBackend>,
    policy: Arc<dyn PolicyEngine>,
    codec: SessionCodec,
    cookies: CookieConfig,
    login: LoginFlow,
    totp: TotpGate,
    oidc: OidcProvider,
}

impl GatewayState {
    #[must_use]
    pub fn new(
        config: GatewayConfig,
        identity: Arc<dyn IdentityBackend>,
        policy: Arc<dyn PolicyEngine>,
        crypto: Arc<CryptoBox>,
    ) -> Self {
        let login = LoginFlow::new(identity.clone(), policy.clone())
            .with_totp(config.enable_totp())
            .with_encoded_password(config.allow_encoded_password());
        let totp = TotpGate::new(identity.clone(), crypto.clone(), config.totp_issuer())
            .with_skew(config.totp_skew());
        let oidc = OidcProvider::new(
            identity.clone(),
            crypto.clone(),
            config.api_server(),
            config.route_prefix(),
        );
        Self {
            cookies: config.cookie_config(),
            codec: SessionCodec::new(crypto),
            config,
            identity,
            policy,
            login,
            totp,
            oidc,
        }
    }

    #[must_use]
    pub fn with_pre_login_hook(mut self, hook: PreLoginHook) -> Self {
        self.login = self.login.with_pre_login_hook(hook);
        self
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    #[must_use]
    pub fn identity(&self) -> &dyn IdentityBackend {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn policy(&self) -> &dyn PolicyEngine {
        self.policy.as_ref()
    }

    #[must_use]
    pub fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    #[must_use]
    pub fn cookies(&self) -> &CookieConfig {
        &self.cookies
    }

    #[must_use]
    pub fn login(&self) -> &LoginFlow {
        &self.login
    }

    #[must_use]
    pub fn totp(&self) -> &TotpGate {
        &self.totp
    }

    #[must_use]
    pub fn oidc(&self) -> &OidcProvider {
        &self.oidc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = GatewayConfig::new("https://gw.example.test/");
        assert_eq!(config.api_server(), "https://gw.example.test");
        assert_eq!(config.route_prefix(), DEFAULT_ROUTE_PREFIX);
        assert_eq!(config.login_url(), DEFAULT_LOGIN_URL);
        assert_eq!(config.login_callback_param(), "rf");
        assert!(config.cookie_secure());
        assert!(!config.enable_totp());
        assert!(config.allow_encoded_password());
        assert_eq!(
            config.sso_callback_url(),
            "https://gw.example.test/api/v1/auth/ssologin"
        );
    }

    #[test]
    fn prefix_is_normalized() {
        for (raw, expected) in [
            ("/api/v1/auth/", "/api/v1/auth"),
            ("auth", "/auth"),
            ("/", ""),
            ("", ""),
        ] {
            assert_eq!(
                GatewayConfig::new("http://gw").with_route_prefix(raw).route_prefix(),
                expected
            );
        }
    }

    #[test]
    fn overrides_apply() {
        let config = GatewayConfig::new("http://gw")
            .with_sso_callback_url(Some("https://sso.example.test/cb".to_string()))
            .with_cookie_domain(Some("example.test".to_string()))
            .with_cookie_http_only(false);
        assert!(!config.cookie_secure());
        assert_eq!(config.sso_callback_url(), "https://sso.example.test/cb");
        assert_eq!(
            config.cookie_config(),
            CookieConfig::new(Some("example.test".to_string()), false, false)
        );
        assert_eq!(
            GatewayConfig::new("http://gw")
                .with_sso_callback_url(Some(" ".to_string()))
                .sso_callback_url(),
            "http://gw/api/v1/auth/ssologin"
        );
    }
}
