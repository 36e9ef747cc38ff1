use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_IDENTITY_URL: &str = "identity-url";
pub const ARG_IDENTITY_TOKEN: &str = "identity-token";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_IDENTITY_URL)
                .long(ARG_IDENTITY_URL)
                .help("Base URL of the identity service REST API")
                .env("APIGATE_IDENTITY_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_IDENTITY_TOKEN)
                .long(ARG_IDENTITY_TOKEN)
                .help("Admin token for the identity service")
                .env("APIGATE_IDENTITY_TOKEN")
                .hide_env_values(true)
                .required(true),
        )
}

#[derive(Debug)]
pub struct Options {
    pub url: String,
    pub token: SecretString,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let url = matches
            .get_one::<String>(ARG_IDENTITY_URL)
            .cloned()
            .context("missing required argument: --identity-url")?;
        let token = matches
            .get_one::<String>(ARG_IDENTITY_TOKEN)
            .cloned()
            .map(SecretString::from)
            .context("missing required argument: --identity-token")?;
        Ok(Self { url, token })
    }
}
