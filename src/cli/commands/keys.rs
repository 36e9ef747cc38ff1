use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_ENCRYPTION_KEY: &str = "encryption-key";
pub const ARG_SIGNING_KEY: &str = "signing-key";
pub const ARG_JWK_KID: &str = "jwk-kid";
pub const ARG_POLICY_PATH: &str = "policy-path";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ENCRYPTION_KEY)
                .long(ARG_ENCRYPTION_KEY)
                .help("Base64 of the 32-byte key sealing cookies, codes and TOTP secrets")
                .env("APIGATE_ENCRYPTION_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_SIGNING_KEY)
                .long(ARG_SIGNING_KEY)
                .help("Path to the RSA private key (PEM or DER) signing id tokens")
                .env("APIGATE_SIGNING_KEY")
                .required(true),
        )
        .arg(
            Arg::new(ARG_JWK_KID)
                .long(ARG_JWK_KID)
                .help("Key id published in the JWKS")
                .env("APIGATE_JWK_KID")
                .default_value("apigate-1"),
        )
        .arg(
            Arg::new(ARG_POLICY_PATH)
                .long(ARG_POLICY_PATH)
                .help("JSON policy file; no policies when unset")
                .env("APIGATE_POLICY_PATH"),
        )
}

#[derive(Debug)]
pub struct Options {
    pub encryption_key: SecretString,
    pub signing_key_path: String,
    pub jwk_kid: String,
    pub policy_path: Option<String>,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            encryption_key: matches
                .get_one::<String>(ARG_ENCRYPTION_KEY)
                .cloned()
                .map(SecretString::from)
                .context("missing required argument: --encryption-key")?,
            signing_key_path: matches
                .get_one::<String>(ARG_SIGNING_KEY)
                .cloned()
                .context("missing required argument: --signing-key")?,
            jwk_kid: matches
                .get_one::<String>(ARG_JWK_KID)
                .cloned()
                .unwrap_or_else(|| "apigate-1".to_string()),
            policy_path: matches
                .get_one::<String>(ARG_POLICY_PATH)
                .cloned()
                .filter(|p| !p.is_empty()),
        })
    }
}
