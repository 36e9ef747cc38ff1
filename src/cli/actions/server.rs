use crate::{
    api::{self, GatewayConfig, GatewayState},
    cli::{
        commands::{identity, keys, login},
        telemetry,
    },
    crypto::CryptoBox,
    identity::IdentityClient,
    policy::StaticPolicyEngine,
};
use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use secrecy::ExposeSecret;
use std::{path::Path, sync::Arc};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub api_server: String,
    pub route_prefix: String,
    pub identity: identity::Options,
    pub keys: keys::Options,
    pub login: login::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if key material or the policy file cannot be loaded, or the server fails.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let state = build_state(&args)?;
    let result = api::new(args.port, Arc::new(state)).await;

    telemetry::shutdown_tracer();
    result
}

/// Load key material and policies, then wire the gateway.
/// # Errors
/// Returns an error on unreadable or malformed keys, or an invalid policy file.
pub fn build_state(args: &Args) -> Result<GatewayState> {
    let encryption_key = STANDARD
        .decode(args.keys.encryption_key.expose_secret().trim())
        .context("encryption key is not valid base64")?;
    let signing_key = std::fs::read(&args.keys.signing_key_path).with_context(|| {
        format!(
            "could not read signing key: {}",
            args.keys.signing_key_path
        )
    })?;
    let crypto = CryptoBox::new(&encryption_key, &signing_key, args.keys.jwk_kid.clone())
        .context("invalid key material")?;

    let policy = match &args.keys.policy_path {
        Some(path) => StaticPolicyEngine::load(Path::new(path))
            .with_context(|| format!("could not load policies from {path}"))?,
        None => StaticPolicyEngine::empty(),
    };
    info!(rules = policy.len(), "policies loaded");

    let identity = IdentityClient::new(&args.identity.url, args.identity.token.clone())?;

    let login = &args.login;
    let config = GatewayConfig::new(args.api_server.clone())
        .with_route_prefix(&args.route_prefix)
        .with_cookie_domain(login.cookie_domain.clone())
        .with_cookie_http_only(login.cookie_http_only)
        .with_login_url(login.login_url.clone())
        .with_login_callback_param(login.login_callback_param.clone())
        .with_sso_callback_url(login.sso_callback_url.clone())
        .with_totp(login.enable_totp)
        .with_totp_issuer(login.totp_issuer.clone())
        .with_totp_skew(login.totp_skew)
        .with_encoded_password(login.allow_encoded_password);

    Ok(GatewayState::new(
        config,
        Arc::new(identity),
        Arc::new(policy),
        Arc::new(crypto),
    ))
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("api_server", args.api_server.clone()),
        ("route_prefix", args.route_prefix.clone()),
        ("identity_url", args.identity.url.clone()),
        ("signing_key", args.keys.signing_key_path.clone()),
        ("jwk_kid", args.keys.jwk_kid.clone()),
        (
            "policy_path",
            args.keys
                .policy_path
                .clone()
                .unwrap_or_else(|| "none".to_string()),
        ),
        ("login_url", args.login.login_url.clone()),
        (
            "cookie_domain",
            args.login
                .cookie_domain
                .clone()
                .unwrap_or_else(|| "host-only".to_string()),
        ),
        ("totp", args.login.enable_totp.to_string()),
    ];

    let width = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "apigate {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(width.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
