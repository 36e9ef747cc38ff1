pub mod identity;
pub mod keys;
pub mod logging;
pub mod login;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

use crate::api::state::{DEFAULT_PORT, DEFAULT_ROUTE_PREFIX};

pub const ARG_PORT: &str = "port";
pub const ARG_API_SERVER: &str = "api-server";
pub const ARG_ROUTE_PREFIX: &str = "route-prefix";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("apigate")
        .about("Login gateway and OpenID Connect provider")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value(DEFAULT_PORT.to_string())
                .env("APIGATE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_API_SERVER)
                .long(ARG_API_SERVER)
                .help("Public base URL of the gateway, also the OIDC issuer")
                .env("APIGATE_API_SERVER")
                .required(true),
        )
        .arg(
            Arg::new(ARG_ROUTE_PREFIX)
                .long(ARG_ROUTE_PREFIX)
                .help("Path prefix for every endpoint but /health")
                .env("APIGATE_ROUTE_PREFIX")
                .default_value(DEFAULT_ROUTE_PREFIX),
        );

    let command = identity::with_args(command);
    let command = keys::with_args(command);
    let command = login::with_args(command);
    logging::with_args(command)
}
