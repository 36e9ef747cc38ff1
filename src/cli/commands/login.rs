use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::api::state::{
    DEFAULT_LOGIN_CALLBACK_PARAM, DEFAULT_LOGIN_URL, DEFAULT_TOTP_ISSUER,
};

// `--flag` alone means true; `--flag false` or the env var can turn it off.
fn bool_arg(name: &'static str, env: &'static str, default: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .env(env)
        .action(ArgAction::Set)
        .num_args(0..=1)
        .default_value(default)
        .default_missing_value("true")
        .value_parser(clap::value_parser!(bool))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("cookie-domain")
                .long("cookie-domain")
                .help("Domain attribute for every cookie")
                .env("APIGATE_COOKIE_DOMAIN"),
        )
        .arg(
            bool_arg("cookie-http-only", "APIGATE_COOKIE_HTTP_ONLY", "true")
                .help("Mark the session cookie HttpOnly"),
        )
        .arg(
            Arg::new("login-url")
                .long("login-url")
                .help("Console login page")
                .env("APIGATE_LOGIN_URL")
                .default_value(DEFAULT_LOGIN_URL),
        )
        .arg(
            Arg::new("login-callback-param")
                .long("login-callback-param")
                .help("Query parameter carrying the return URL to the login page")
                .env("APIGATE_LOGIN_CALLBACK_PARAM")
                .default_value(DEFAULT_LOGIN_CALLBACK_PARAM),
        )
        .arg(
            Arg::new("sso-callback-url")
                .long("sso-callback-url")
                .help("Where identity providers return to (default: <api-server><route-prefix>/ssologin)")
                .env("APIGATE_SSO_CALLBACK_URL"),
        )
        .arg(
            bool_arg("enable-totp", "APIGATE_ENABLE_TOTP", "false")
                .help("Require a TOTP passcode from users with MFA enabled"),
        )
        .arg(
            Arg::new("totp-issuer")
                .long("totp-issuer")
                .help("Issuer shown in authenticator apps")
                .env("APIGATE_TOTP_ISSUER")
                .default_value(DEFAULT_TOTP_ISSUER),
        )
        .arg(
            Arg::new("totp-skew")
                .long("totp-skew")
                .help("Accepted TOTP steps before and after the current one")
                .env("APIGATE_TOTP_SKEW")
                .default_value("1")
                .value_parser(clap::value_parser!(u8)),
        )
        .arg(
            bool_arg(
                "allow-encoded-password",
                "APIGATE_ALLOW_ENCODED_PASSWORD",
                "true",
            )
            .help("Accept base64 encoded passwords"),
        )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub cookie_domain: Option<String>,
    pub cookie_http_only: bool,
    pub login_url: String,
    pub login_callback_param: String,
    pub sso_callback_url: Option<String>,
    pub enable_totp: bool,
    pub totp_issuer: String,
    pub totp_skew: u8,
    pub allow_encoded_password: bool,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let string = |name: &str, default: &str| {
            matches
                .get_one::<String>(name)
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };
        let flag = |name: &str, default: bool| matches.get_one::<bool>(name).copied().unwrap_or(default);
        Self {
            cookie_domain: matches
                .get_one::<String>("cookie-domain")
                .cloned()
                .filter(|d| !d.is_empty()),
            cookie_http_only: flag("cookie-http-only", true),
            login_url: string("login-url", DEFAULT_LOGIN_URL),
            login_callback_param: string("login-callback-param", DEFAULT_LOGIN_CALLBACK_PARAM),
            sso_callback_url: matches.get_one::<String>("sso-callback-url").cloned(),
            enable_totp: flag("enable-totp", false),
            totp_issuer: string("totp-issuer", DEFAULT_TOTP_ISSUER),
            totp_skew: matches.get_one::<u8>("totp-skew").copied().unwrap_or(1),
            allow_encoded_password: flag("allow-encoded-password", true),
        }
    }
}
