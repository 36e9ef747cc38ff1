//! REST client for the identity service.
//!
//! Every call carries the gateway's admin token in `X-Auth-Token`. User tokens
//! under inspection travel in `X-Subject-Token`.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use tracing::{Instrument, info_span};
use url::Url;

use super::{
    Domain, IdentityBackend, IdentityError, IdentityProvider, IdentityResult, IdpFilter,
    OidcCredential, Project, RecoveryQuestion, RoleAssignment, TokenCredential, TotpRecord,
    UserProfile,
};

#[derive(Debug, Clone)]
pub struct IdentityClient {
    base_url: Url,
    admin_token: SecretString,
    http: Client,
}

#[derive(Deserialize)]
struct RoleAssignmentList {
    role_assignments: Vec<RoleAssignment>,
}

#[derive(Deserialize)]
struct ProjectList {
    projects: Vec<Project>,
}

#[derive(Deserialize)]
struct RegionList {
    regions: Vec<String>,
}

#[derive(Deserialize)]
struct DomainList {
    domains: Vec<Domain>,
}

#[derive(Deserialize)]
struct IdpList {
    identity_providers: Vec<IdentityProvider>,
}

#[derive(Deserialize)]
struct RecoveryList {
    questions: Vec<RecoveryQuestion>,
}

#[derive(Deserialize)]
struct RedirectUri {
    uri: String,
}

impl IdentityClient {
    /// Build a client for the identity service at `base_url`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str, admin_token: SecretString) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("identity url must be hierarchical: {base_url}");
        }
        let http = Client::builder().user_agent(crate::APP_USER_AGENT).build()?;
        Ok(Self {
            base_url,
            admin_token,
            http,
        })
    }

    // Each segment is percent-encoded on its own, so ids cannot add or climb path levels.
    fn endpoint(&self, segments: &[&str]) -> IdentityResult<Url> {
        if let Some(bad) = segments
            .iter()
            .find(|segment| matches!(**segment, "" | "." | ".."))
        {
            return Err(IdentityError::with_status(
                404,
                format!("invalid resource id {bad:?}"),
            ));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| IdentityError::transport(format!("invalid base url {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> IdentityResult<RequestBuilder> {
        let url = self.endpoint(segments)?;
        Ok(self
            .http
            .request(method, url)
            .header("X-Auth-Token", self.admin_token.expose_secret()))
    }

    async fn send(&self, builder: RequestBuilder, operation: &'static str) -> IdentityResult<Response> {
        let span = info_span!("identity.request", operation);
        let response = builder
            .send()
            .instrument(span)
            .await
            .map_err(|e| IdentityError::transport(format!("{operation}: {e}")))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        Err(IdentityError::with_status(
            status.as_u16(),
            backend_error_message(&body, status),
        ))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        operation: &'static str,
    ) -> IdentityResult<T> {
        self.send(builder, operation)
            .await?
            .json::<T>()
            .await
            .map_err(|e| IdentityError::transport(format!("{operation}: invalid response: {e}")))
    }
}

/// Pull a readable message out of an error body, falling back to the status text.
fn backend_error_message(body: &Value, status: StatusCode) -> String {
    body.get("error")
        .and_then(|e| e.get("details").or_else(|| e.get("message")))
        .or_else(|| body.get("details"))
        .and_then(Value::as_str)
        .map_or_else(
            || status.canonical_reason().unwrap_or("error").to_string(),
            ToString::to_string,
        )
}

#[async_trait]
impl IdentityBackend for IdentityClient {
    async fn authenticate_by_password(
        &self,
        username: &str,
        password: &str,
        domain: Option<&str>,
        client_ip: &str,
    ) -> IdentityResult<TokenCredential> {
        let body = json!({
            "username": username,
            "password": password,
            "domain": domain,
            "ip": client_ip,
        });
        let builder = self.request(Method::POST, &["v3", "auth", "password"])?.json(&body);
        self.send_json(builder, "authenticate_by_password").await
    }

    async fn authenticate_by_sso(
        &self,
        payload: &Map<String, Value>,
        client_ip: &str,
    ) -> IdentityResult<TokenCredential> {
        let body = json!({ "payload": payload, "ip": client_ip });
        let builder = self.request(Method::POST, &["v3", "auth", "sso"])?.json(&body);
        self.send_json(builder, "authenticate_by_sso").await
    }

    async fn authenticate_by_access_key(
        &self,
        access_key: &str,
        secret: &str,
        client_ip: &str,
    ) -> IdentityResult<TokenCredential> {
        let body = json!({
            "access_key": access_key,
            "secret": secret,
            "ip": client_ip,
        });
        let builder = self.request(Method::POST, &["v3", "auth", "access-key"])?.json(&body);
        self.send_json(builder, "authenticate_by_access_key").await
    }

    async fn set_project(
        &self,
        project_id: &str,
        token: &TokenCredential,
    ) -> IdentityResult<TokenCredential> {
        let body = json!({ "project_id": project_id });
        let builder = self
            .request(Method::POST, &["v3", "auth", "project"])?
            .header("X-Subject-Token", &token.token)
            .json(&body);
        self.send_json(builder, "set_project").await
    }

    async fn verify_token(&self, token: &str) -> IdentityResult<TokenCredential> {
        let builder = self
            .request(Method::GET, &["v3", "auth", "tokens"])?
            .header("X-Subject-Token", token);
        self.send_json(builder, "verify_token").await
    }

    async fn get_user(&self, user_id: &str) -> IdentityResult<UserProfile> {
        let builder = self.request(Method::GET, &["v3", "users", user_id])?;
        self.send_json(builder, "get_user").await
    }

    async fn list_role_assignments(&self, user_id: &str) -> IdentityResult<Vec<RoleAssignment>> {
        let builder = self.request(Method::GET, &["v3", "role_assignments"])?.query(&[
            ("user_id", user_id),
            ("effective", "true"),
            ("include_names", "true"),
            ("include_system", "true"),
        ]);
        let list: RoleAssignmentList = self.send_json(builder, "list_role_assignments").await?;
        Ok(list.role_assignments)
    }

    async fn get_projects_for_user(&self, user_id: &str) -> IdentityResult<Vec<Project>> {
        let builder = self.request(Method::GET, &["v3", "users", user_id, "projects"])?;
        let list: ProjectList = self.send_json(builder, "get_projects_for_user").await?;
        Ok(list.projects)
    }

    async fn get_project(&self, id_or_name: &str) -> IdentityResult<Project> {
        let builder = self.request(Method::GET, &["v3", "projects", id_or_name])?;
        self.send_json(builder, "get_project").await
    }

    async fn get_oidc_credential(&self, client_id: &str) -> IdentityResult<OidcCredential> {
        let builder = self.request(Method::GET, &["v3", "credentials", "oidc", client_id])?;
        self.send_json(builder, "get_oidc_credential").await
    }

    async fn patch_user_password(&self, user_id: &str, password: &str) -> IdentityResult<()> {
        let builder = self
            .request(Method::PATCH, &["v3", "users", user_id])?
            .json(&json!({ "password": password }));
        self.send(builder, "patch_user_password").await?;
        Ok(())
    }

    async fn get_totp(&self, user_id: &str) -> IdentityResult<Option<TotpRecord>> {
        let builder = self.request(Method::GET, &["v3", "users", user_id, "totp"])?;
        match self.send_json(builder, "get_totp").await {
            Ok(record) => Ok(Some(record)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn put_totp(&self, user_id: &str, record: &TotpRecord) -> IdentityResult<()> {
        let builder = self
            .request(Method::PUT, &["v3", "users", user_id, "totp"])?
            .json(record);
        self.send(builder, "put_totp").await?;
        Ok(())
    }

    async fn get_recovery(&self, user_id: &str) -> IdentityResult<Vec<RecoveryQuestion>> {
        let builder = self.request(Method::GET, &["v3", "users", user_id, "recovery"])?;
        match self.send_json::<RecoveryList>(builder, "get_recovery").await {
            Ok(list) => Ok(list.questions),
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    async fn put_recovery(
        &self,
        user_id: &str,
        questions: &[RecoveryQuestion],
    ) -> IdentityResult<()> {
        let builder = self
            .request(Method::PUT, &["v3", "users", user_id, "recovery"])?
            .json(&json!({ "questions": questions }));
        self.send(builder, "put_recovery").await?;
        Ok(())
    }

    async fn list_regions(&self) -> IdentityResult<Vec<String>> {
        let builder = self.request(Method::GET, &["v3", "regions"])?;
        let list: RegionList = self.send_json(builder, "list_regions").await?;
        Ok(list.regions)
    }

    async fn list_domains(&self, id: Option<&str>) -> IdentityResult<Vec<Domain>> {
        let mut builder = self
            .request(Method::GET, &["v3", "domains"])?
            .query(&[("limit", "1000")]);
        if let Some(id) = id {
            builder = builder.query(&[("id", id)]);
        }
        let list: DomainList = self.send_json(builder, "list_domains").await?;
        Ok(list.domains)
    }

    async fn list_idps(&self, filter: &IdpFilter) -> IdentityResult<Vec<IdentityProvider>> {
        let mut builder = self.request(Method::GET, &["v3", "identity_providers"])?.query(&[
            ("enabled", "true"),
            ("scope", "system"),
            ("sso_domain", filter.sso_domain.as_str()),
            ("limit", "1000"),
        ]);
        if let Some(auto_create) = filter.auto_create_user {
            builder = builder.query(&[("auto_create_user", auto_create.to_string())]);
        }
        let list: IdpList = self.send_json(builder, "list_idps").await?;
        Ok(list.identity_providers)
    }

    async fn sso_redirect_uri(
        &self,
        idp_id: &str,
        callback_url: &str,
        state: &str,
    ) -> IdentityResult<String> {
        let builder = self
            .request(
                Method::GET,
                &["v3", "identity_providers", idp_id, "sso-redirect-uri"],
            )?
            .query(&[("redirect_uri", callback_url), ("state", state)]);
        let redirect: RedirectUri = self.send_json(builder, "sso_redirect_uri").await?;
        Ok(redirect.uri)
    }
}
