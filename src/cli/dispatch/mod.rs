use crate::api::state::{DEFAULT_PORT, DEFAULT_ROUTE_PREFIX};
use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{self, identity, keys, login};
use anyhow::{Context, Result};

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(DEFAULT_PORT);
    let api_server = matches
        .get_one::<String>(commands::ARG_API_SERVER)
        .cloned()
        .context("missing required argument: --api-server")?;
    let route_prefix = matches
        .get_one::<String>(commands::ARG_ROUTE_PREFIX)
        .cloned()
        .unwrap_or_else(|| DEFAULT_ROUTE_PREFIX.to_string());

    Ok(Action::Server(Args {
        port,
        api_server,
        route_prefix,
        identity: identity::Options::parse(matches)?,
        keys: keys::Options::parse(matches)?,
        login: login::Options::parse(matches),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn builds_server_action() -> Result<()> {
        temp_env::with_vars(
            [
                ("APIGATE_PORT", None::<&str>),
                ("APIGATE_POLICY_PATH", None),
                ("APIGATE_SSO_CALLBACK_URL", None),
            ],
            || {
                let matches = commands::new().try_get_matches_from([
                    "apigate",
                    "--api-server",
                    "https://gw.example.test",
                    "--route-prefix",
                    "/auth",
                    "--identity-url",
                    "http://identity:5000/v3",
                    "--identity-token",
                    "admin-token",
                    "--encryption-key",
                    "a2V5",
                    "--signing-key",
                    "/keys/signing.pem",
                    "--jwk-kid",
                    "k9",
                    "--cookie-domain",
                    "example.test",
                ])?;
                let Action::Server(args) = handler(&matches)?;
                assert_eq!(args.port, 8080);
                assert_eq!(args.api_server, "https://gw.example.test");
                assert_eq!(args.route_prefix, "/auth");
                assert_eq!(args.identity.url, "http://identity:5000/v3");
                assert_eq!(args.identity.token.expose_secret(), "admin-token");
                assert_eq!(args.keys.encryption_key.expose_secret(), "a2V5");
                assert_eq!(args.keys.signing_key_path, "/keys/signing.pem");
                assert_eq!(args.keys.jwk_kid, "k9");
                assert_eq!(args.keys.policy_path, None);
                assert_eq!(args.login.cookie_domain.as_deref(), Some("example.test"));
                assert_eq!(args.login.sso_callback_url, None);
                Ok(())
            },
        )
    }
}
