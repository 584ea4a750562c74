//! Command-line interface for extension-bridge.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::net::IpAddr;
use std::path::PathBuf;

/// Command-line arguments.
///
/// Every override is optional so that unset flags leave file and
/// environment values in place.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Host address to bind to.
    pub host: Option<IpAddr>,
    /// Port to listen on.
    pub port: Option<u16>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Outbound proxy for forwarded HTTP requests.
    pub proxy: Option<String>,
    /// Forward HTTP requests directly.
    pub no_proxy: bool,
    /// Session liveness window in seconds.
    pub keepalive_timeout: Option<u64>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('H') | Long("host") => {
                let value: String = parser.value()?.parse()?;
                result.host = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("host", value))?,
                );
            }
            Short('p') | Long("port") => {
                let value: String = parser.value()?.parse()?;
                result.port = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("port", value))?,
                );
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('P') | Long("proxy") => {
                result.proxy = Some(parser.value()?.parse()?);
            }
            Long("no-proxy") => {
                result.no_proxy = true;
            }
            Short('t') | Long("keepalive-timeout") => {
                let value: String = parser.value()?.parse()?;
                let secs = value
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or(ArgsError::InvalidValue("keepalive-timeout", value))?;
                result.keepalive_timeout = Some(secs);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"extension-bridge {version}
Local helper daemon for a browser extension: keyed WebSocket sessions and
HTTP forwarding through a local proxy

USAGE:
    extension-bridge [OPTIONS]

OPTIONS:
    -H, --host <ADDR>               Host address to bind [default: 127.0.0.1]
    -p, --port <PORT>               Port to listen on [default: 50888]
    -c, --config <FILE>             Path to configuration file (JSON)
    -P, --proxy <URL>               Outbound proxy [default: http://127.0.0.1:7890]
        --no-proxy                  Forward HTTP requests directly
    -t, --keepalive-timeout <SECS>  Session liveness window [default: 10]
    -l, --log-level <LVL>           Log level (error, warn, info, debug, trace)
    -h, --help                      Print help
    -V, --version                   Print version

ENVIRONMENT VARIABLES:
    EXTENSION_BRIDGE_HOST       Host address (overrides config)
    EXTENSION_BRIDGE_PORT       Port number (overrides config)
    EXTENSION_BRIDGE_PROXY      Outbound proxy, empty to disable (overrides config)
    EXTENSION_BRIDGE_LOG_LEVEL  Log level (overrides config)
    RUST_LOG                    Alternative log level setting

EXAMPLES:
    # Start with defaults (localhost:50888, proxy on 127.0.0.1:7890)
    extension-bridge

    # Forward directly and keep idle sessions for a minute
    extension-bridge --no-proxy -t 60

    # Start with config file
    extension-bridge -c ~/.config/extension-bridge.json
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("extension-bridge {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
