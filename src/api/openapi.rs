use super::handlers::{health, login, oidc, sso, totp, user};
use super::state::DEFAULT_ROUTE_PREFIX;
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

/// Document for the default route prefix.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router(DEFAULT_ROUTE_PREFIX).split_for_parts();
    openapi
}

/// Routes under the auth prefix. `POST /ssologin` and `OPTIONS /health` are
/// added by the server and stay undocumented.
fn auth_router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(login::regions))
        .routes(routes!(login::login))
        .routes(routes!(login::logout))
        .routes(routes!(user::user))
        .routes(routes!(user::password))
        .routes(routes!(totp::init_credential))
        .routes(routes!(totp::reset_credential))
        .routes(routes!(totp::passcode))
        .routes(routes!(totp::list_recovery, totp::set_recovery))
        .routes(routes!(sso::redirect))
        .routes(routes!(sso::sso_login))
        .routes(routes!(oidc::authorize))
        .routes(routes!(oidc::discovery))
        .routes(routes!(oidc::keys))
        .routes(routes!(oidc::token))
        .routes(routes!(oidc::user))
}

/// Build the router that also drives the `OpenAPI` document.
///
/// `/health` sits at the root; everything else under `prefix`, which is
/// already normalized (empty or `/segment...`).
pub(crate) fn api_router(prefix: &str) -> OpenApiRouter {
    let router = OpenApiRouter::with_openapi(cargo_openapi()).routes(routes!(health::health));
    let mut router = if prefix.is_empty() {
        router.merge(auth_router())
    } else {
        router.nest(prefix, auth_router())
    };

    let tags = [
        ("health", "Liveness and build information"),
        ("auth", "Login, logout and the session holder"),
        ("totp", "Second factor enrollment and recovery"),
        ("sso", "Federated login through external identity providers"),
        ("oidc", "OpenID Connect provider"),
    ]
    .into_iter()
    .map(|(name, description)| {
        let mut tag = Tag::new(name);
        tag.description = Some(description.to_string());
        tag
    })
    .collect();
    router.get_openapi_mut().tags = Some(tags);

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() { None } else { Some(value) }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.find('<') {
        Some(start) => (
            non_empty(author[..start].trim()),
            non_empty(author[start + 1..].trim_end_matches('>').trim()),
        ),
        None => (non_empty(author.trim()), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            spec.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Apigate"));
            assert_eq!(contact.email.as_deref(), Some("team@apigate.dev"));
        }

        let license = spec.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.name, "BSD-3-Clause");
            assert_eq!(license.identifier.as_deref(), Some("BSD-3-Clause"));
        }
    }

    #[test]
    fn openapi_tags_and_paths() {
        let spec = openapi();
        let tags = spec.tags.clone().unwrap_or_default();
        for name in ["health", "auth", "totp", "sso", "oidc"] {
            assert!(tags.iter().any(|tag| tag.name == name), "missing tag {name}");
        }
        let paths = &spec.paths.paths;
        assert!(paths.contains_key("/health"));
        assert!(paths.contains_key("/api/v1/auth/login"));
        assert!(paths.contains_key("/api/v1/auth/sso/redirect/{idp_id}"));
        assert!(paths.contains_key("/api/v1/auth/oidc/.well-known/openid-configuration"));
        assert!(!paths.contains_key("/login"));
    }

    #[test]
    fn login_body_is_documented() -> Result<(), serde_json::Error> {
        let spec = serde_json::to_value(openapi())?;
        let body = &spec["components"]["schemas"]["LoginBody"]["properties"];
        for field in ["username", "password", "domain", "tenantId", "idp_id", "scope"] {
            assert!(body.get(field).is_some(), "missing field {field}");
        }
        let login = &spec["paths"]["/api/v1/auth/login"]["post"]["requestBody"];
        assert_eq!(
            login["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/LoginBody"
        );
        Ok(())
    }

    #[test]
    fn empty_prefix_mounts_at_root() {
        let (_router, spec) = api_router("").split_for_parts();
        assert!(spec.paths.paths.contains_key("/login"));
        assert!(spec.paths.paths.contains_key("/oidc/token"));
    }

    #[test]
    fn authors_parse() {
        assert_eq!(parse_author("A <a@x>"), (Some("A"), Some("a@x")));
        assert_eq!(parse_author("A"), (Some("A"), None));
        assert_eq!(parse_author("<a@x>"), (None, Some("a@x")));
    }
}
