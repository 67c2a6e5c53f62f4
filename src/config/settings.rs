//! Configuration settings.
//!
//! Defines the main `ProxyConfig` struct, the command line surface and the
//! environment variable fallbacks (`MORTY_ADDRESS`, `MORTY_KEY`,
//! `MORTY_URL_PARAM`, `MORTY_HASH_PARAM`, `DEBUG`).

use std::env;
use std::sync::Arc;

use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;
use clap::{ArgAction, Parser};

use crate::config::error::{MortyError, Result};

/// Command line arguments.
///
/// Booleans use explicit `--flag=true|false` assignment so that defaults
/// that are `true` (like `--ipv6`) can still be switched off.
#[derive(Parser, Debug)]
#[command(name = "morty", version, about = "Sanitizing web proxy")]
pub struct Cli {
    /// Listen address
    #[arg(long, env = "MORTY_ADDRESS", default_value = "127.0.0.1:3000")]
    pub listen: String,

    /// HMAC url validation key (base64 encoded) - leave blank to disable validation
    #[arg(long, env = "MORTY_KEY", default_value = "")]
    pub key: String,

    /// Allow IPv6 HTTP requests
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub ipv6: bool,

    /// Debug mode (defaults to the DEBUG environment variable)
    #[arg(long, action = ArgAction::Set)]
    pub debug: Option<bool>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,

    /// Follow HTTP GET redirect
    #[arg(long, action = ArgAction::Set, default_value_t = false)]
    pub followredirect: bool,

    /// Use a HTTP proxy as set in the environment (HTTP_PROXY, HTTPS_PROXY and
    /// NO_PROXY). Overrides --proxy, --socks5, --ipv6.
    #[arg(long, action = ArgAction::SetTrue)]
    pub proxyenv: bool,

    /// Use the specified HTTP proxy (ie: '[user:pass@]hostname:port').
    /// Overrides --socks5, --ipv6.
    #[arg(long, default_value = "")]
    pub proxy: String,

    /// Use a SOCKS5 proxy (ie: 'hostname:port'). Overrides --ipv6.
    #[arg(long, default_value = "")]
    pub socks5: String,

    /// Name of the requesting string URL parameter (ie: '/?url=...')
    #[arg(long, env = "MORTY_URL_PARAM", default_value = "mortyurl")]
    pub urlparam: String,

    /// Name of the requesting string HASH parameter (ie: '/?hash=...')
    #[arg(long, env = "MORTY_HASH_PARAM", default_value = "mortyhash")]
    pub hashparam: String,
}

fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// `DEBUG` defaults to on; only the literal string "false" disables it.
fn env_debug_default() -> bool {
    get_env_or("DEBUG", "true") != "false"
}

/// Application configuration, built once at startup and immutable afterwards.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address to listen on.
    pub listen_address: String,
    /// Decoded HMAC key; `None` disables signature checks.
    pub key: Option<Vec<u8>>,
    /// Dial IPv4+IPv6 dual-stack when no proxy is configured.
    pub ipv6: bool,
    /// Verbose logging.
    pub debug: bool,
    /// Per-request upstream timeout in seconds.
    pub request_timeout: u64,
    /// Follow GET 3xx redirects (bounded hop count).
    pub follow_redirect: bool,
    /// Route upstream requests through the environment proxy settings.
    pub proxy_env: bool,
    /// Explicit HTTP proxy for upstream requests.
    pub http_proxy: Option<String>,
    /// SOCKS5 proxy for upstream requests.
    pub socks5_proxy: Option<String>,
    /// Name of the URL query parameter.
    pub url_param: String,
    /// Name of the hash query parameter.
    pub hash_param: String,
}

impl ProxyConfig {
    /// Builds the configuration from parsed command line arguments.
    ///
    /// # Errors
    ///
    /// Returns [`MortyError::Config`] if the HMAC key is not valid base64 or
    /// `--proxyenv` is set without any proxy environment variables.
    pub fn from_cli(cli: Cli) -> Result<Arc<Self>> {
        let key = if cli.key.is_empty() {
            None
        } else {
            Some(
                BASE64_STANDARD
                    .decode(cli.key.as_bytes())
                    .map_err(|e| MortyError::Config(format!("invalid --key value: {e}")))?,
            )
        };

        if cli.proxyenv
            && get_env_or("HTTP_PROXY", "").is_empty()
            && get_env_or("HTTPS_PROXY", "").is_empty()
        {
            return Err(MortyError::Config(
                "--proxyenv is set but neither HTTP_PROXY nor HTTPS_PROXY is defined".to_string(),
            ));
        }

        Ok(Arc::new(Self {
            listen_address: cli.listen,
            key,
            ipv6: cli.ipv6,
            debug: cli.debug.unwrap_or_else(env_debug_default),
            request_timeout: cli.timeout,
            follow_redirect: cli.followredirect,
            proxy_env: cli.proxyenv,
            http_proxy: Some(cli.proxy).filter(|s| !s.is_empty()),
            socks5_proxy: Some(cli.socks5).filter(|s| !s.is_empty()),
            url_param: cli.urlparam,
            hash_param: cli.hashparam,
        }))
    }
}
