//! The login state machine.
//!
//! A credential is checked, then scoped to a project, then gated on the user
//! profile before a session is issued. A tenant switch re-scopes an existing
//! session without checking credentials again.

mod password;
mod request;
mod scope;

pub use password::PasswordReset;
pub use request::{LoginRequest, decode_password, parse_login_user};
pub use scope::{select_default_project, select_role_project};

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::ApiError;
use crate::identity::{IdentityBackend, IdentityError, TokenCredential, TokenKind, UserProfile};
use crate::policy::{PolicyEngine, RbacScope};
use crate::session::AuthToken;

/// Facts about the caller the flow needs besides the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub client_ip: String,
}

impl RequestContext {
    #[must_use]
    pub fn new(client_ip: impl Into<String>) -> Self {
        Self {
            client_ip: client_ip.into(),
        }
    }
}

/// Runs before a password is checked; an error aborts the login.
pub type PreLoginHook =
    Arc<dyn Fn(&RequestContext, &str, &Map<String, Value>) -> Result<(), ApiError> + Send + Sync>;

/// What a successful login hands back to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub token: TokenCredential,
    pub auth: AuthToken,
    /// Plaintext cookies for the console, in the order they are set.
    pub companions: Vec<(&'static str, String)>,
}

pub struct LoginFlow {
    identity: Arc<dyn IdentityBackend>,
    policy: Arc<dyn PolicyEngine>,
    pre_login: Option<PreLoginHook>,
    enable_totp: bool,
    allow_encoded_password: bool,
}

impl LoginFlow {
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityBackend>, policy: Arc<dyn PolicyEngine>) -> Self {
        Self {
            identity,
            policy,
            pre_login: None,
            enable_totp: false,
            allow_encoded_password: true,
        }
    }

    #[must_use]
    pub fn with_pre_login_hook(mut self, hook: PreLoginHook) -> Self {
        self.pre_login = Some(hook);
        self
    }

    #[must_use]
    pub fn with_totp(mut self, enable: bool) -> Self {
        self.enable_totp = enable;
        self
    }

    #[must_use]
    pub fn with_encoded_password(mut self, allow: bool) -> Self {
        self.allow_encoded_password = allow;
        self
    }

    #[must_use]
    pub fn totp_enabled(&self) -> bool {
        self.enable_totp
    }

    /// Log in with a credential, or switch tenant when the body names one.
    ///
    /// # Errors
    /// Returns the error to render for the request; authentication failures
    /// stay generic.
    pub async fn login(
        &self,
        ctx: &RequestContext,
        mut request: LoginRequest,
        session: Option<AuthToken>,
    ) -> Result<LoginOutcome, ApiError> {
        let (token, auth, user) = if let Some(tenant_id) = request.tenant_id()? {
            let (token, auth) = self.switch_tenant(&tenant_id, session).await?;
            let user = self.fetch_user(&token).await?;
            (token, auth, user)
        } else {
            let token = self.credential_login(ctx, &mut request).await?;
            let user = self.fetch_user(&token).await?;
            let totp_initialized = self.totp_initialized(&token.user_id).await?;
            let auth = AuthToken::new(
                token.token.clone(),
                self.enable_totp && user.enable_mfa,
                totp_initialized,
            );
            (token, auth, user)
        };

        if !user.allow_web_console {
            warn!(user_id = %user.id, "web console login denied by user policy");
            return Err(ApiError::Forbidden(
                "user forbidden login from web".to_string(),
            ));
        }

        info!(
            user_id = %token.user_id,
            project_id = %token.project_id,
            mfa_required = auth.mfa_required(),
            "login succeeded"
        );
        let companions = self.companion_cookies(&token, &request);
        Ok(LoginOutcome {
            token,
            auth,
            companions,
        })
    }

    async fn switch_tenant(
        &self,
        tenant_id: &str,
        session: Option<AuthToken>,
    ) -> Result<(TokenCredential, AuthToken), ApiError> {
        let Some(auth) = session else {
            return Err(ApiError::InvalidCredential("invalid session".to_string()));
        };
        let current = self.identity.verify_token(auth.token()).await.map_err(|err| {
            debug!(error = %err, "session token rejected");
            ApiError::InvalidCredential("invalid session".to_string())
        })?;
        if !auth.is_totp_verified() {
            return Err(ApiError::InvalidCredential(
                "TOTP authentication failed".to_string(),
            ));
        }
        let token = self
            .identity
            .set_project(tenant_id, &current)
            .await
            .map_err(|err| {
                warn!(tenant_id, error = %err, "tenant switch refused");
                ApiError::InvalidCredential("failed to change project".to_string())
            })?;
        let auth = auth.with_token(token.token.clone());
        Ok((token, auth))
    }

    /// Check the credential in the body and resolve the project to scope to.
    ///
    /// # Errors
    /// Returns `InputParameter` for a malformed body and `InvalidCredential`
    /// for any rejected credential, except backend 409 and 429 which pass
    /// through.
    pub async fn credential_login(
        &self,
        ctx: &RequestContext,
        request: &mut LoginRequest,
    ) -> Result<TokenCredential, ApiError> {
        let (result, tenant) = if let Some(username) = request.username() {
            if let Some(hook) = &self.pre_login {
                hook(ctx, &username, request.body())?;
            }
            let Some(password) = request.password() else {
                return Err(ApiError::InputParameter(
                    "get password in body".to_string(),
                ));
            };
            let password = if self.allow_encoded_password {
                decode_password(&password)
            } else {
                password
            };
            if username.is_empty() || password.is_empty() {
                return Err(ApiError::InputParameter(
                    "username or password is empty".to_string(),
                ));
            }
            let (tenant, username) = parse_login_user(&username);
            let domain = request.domain();
            let result = self
                .identity
                .authenticate_by_password(&username, &password, domain.as_deref(), &ctx.client_ip)
                .await;
            (result, tenant)
        } else if request.contains("idp_driver") {
            let result = self
                .identity
                .authenticate_by_sso(request.body(), &ctx.client_ip)
                .await;
            (result, String::new())
        } else {
            return Err(ApiError::InputParameter("missing credential".to_string()));
        };

        let token = result.map_err(credential_failure)?;
        Ok(self.resolve_scope(token, &tenant, request).await)
    }

    async fn resolve_scope(
        &self,
        token: TokenCredential,
        tenant: &str,
        request: &mut LoginRequest,
    ) -> TokenCredential {
        if !tenant.is_empty() {
            match self.scope_to_hint(&token, tenant).await {
                Ok(scoped) => return scoped,
                Err(err) => warn!(tenant, error = %err, "tenant hint not usable"),
            }
        }

        match &token.kind {
            TokenKind::V3 { role_assignments } => {
                if let Some((project_id, scope)) = select_role_project(role_assignments) {
                    match self.identity.set_project(project_id, &token).await {
                        Ok(scoped) => {
                            request.set_scope(scope);
                            return scoped;
                        }
                        Err(err) => {
                            error!(project_id, error = %err, "failed to scope to assigned project");
                        }
                    }
                }
            }
            TokenKind::Legacy => {}
        }

        match self.identity.get_projects_for_user(&token.user_id).await {
            Ok(projects) => {
                if let Some(project) = select_default_project(&projects, &token.user) {
                    match self.identity.set_project(&project.id, &token).await {
                        Ok(scoped) => return scoped,
                        Err(err) => {
                            error!(project_id = %project.id, error = %err, "failed to scope to default project");
                        }
                    }
                } else {
                    debug!(user_id = %token.user_id, "user has no projects");
                }
            }
            Err(err) => error!(user_id = %token.user_id, error = %err, "failed to list user projects"),
        }
        token
    }

    async fn scope_to_hint(
        &self,
        token: &TokenCredential,
        tenant: &str,
    ) -> Result<TokenCredential, IdentityError> {
        let project = self.identity.get_project(tenant).await?;
        self.identity.set_project(&project.id, token).await
    }

    async fn fetch_user(&self, token: &TokenCredential) -> Result<UserProfile, ApiError> {
        self.identity.get_user(&token.user_id).await.map_err(|err| {
            error!(user_id = %token.user_id, error = %err, "failed to fetch user profile");
            ApiError::from(err)
        })
    }

    async fn totp_initialized(&self, user_id: &str) -> Result<bool, ApiError> {
        let record = self.identity.get_totp(user_id).await.map_err(|err| {
            error!(user_id, error = %err, "failed to read totp record");
            ApiError::from(err)
        })?;
        Ok(record.is_some_and(|r| r.verified))
    }

    fn companion_cookies(
        &self,
        token: &TokenCredential,
        request: &LoginRequest,
    ) -> Vec<(&'static str, String)> {
        if !token.is_scoped() {
            return Vec::new();
        }
        let mut cookies = Vec::new();
        if request.contains("isadmin") {
            let value = if self.policy.is_scope_capable(token, RbacScope::System) {
                request.string("isadmin").unwrap_or_default()
            } else {
                "false".to_string()
            };
            cookies.push(("isadmin", value));
        }
        if request.contains("scope") {
            let requested = request.string("scope").unwrap_or_default();
            let value = match requested.parse::<RbacScope>() {
                Ok(scope) if self.policy.is_scope_capable(token, scope) => requested,
                _ => RbacScope::Project.to_string(),
            };
            cookies.push(("scope", value));
        }
        if request.contains("domain") {
            cookies.push(("domain", request.string("domain").unwrap_or_default()));
        }
        cookies.push(("tenant", token.project_id.clone()));
        cookies
    }
}

fn credential_failure(err: IdentityError) -> ApiError {
    if err.is_conflict() {
        warn!(error = %err, "credential check conflict");
        ApiError::Conflict(err.message().to_string())
    } else if err.is_rate_limited() {
        warn!(error = %err, "credential check rate limited");
        ApiError::TooManyRequests(err.message().to_string())
    } else {
        warn!(error = %err, "credential rejected");
        ApiError::InvalidCredential("invalid credential".to_string())
    }
}
