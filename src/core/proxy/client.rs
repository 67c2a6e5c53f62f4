//! Outbound HTTP client construction.
//!
//! One shared client per process. Redirects are disabled here because the
//! dispatcher follows them manually, and the dial mode is chosen from the
//! proxy flags: environment proxies, an explicit HTTP proxy, a SOCKS5
//! proxy, or direct connections (optionally IPv4-only).

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use reqwest::{Client, Proxy, redirect};
use tracing::info;

use crate::config::{MortyError, ProxyConfig, Result};

/// Fixed User-Agent presented to upstreams.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:78.0) Gecko/20100101 Firefox/78.0";

/// Builds the shared upstream client from the configuration.
///
/// # Errors
///
/// Returns [`MortyError::Config`] when a proxy URL is rejected or the client
/// cannot be constructed.
pub fn build_client(config: &ProxyConfig) -> Result<Client> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(config.request_timeout))
        .redirect(redirect::Policy::none())
        .user_agent(USER_AGENT);

    if config.proxy_env {
        // reqwest picks up HTTP_PROXY / HTTPS_PROXY / NO_PROXY by itself.
        info!("using environment defined proxy(ies)");
    } else if let Some(proxy) = &config.http_proxy {
        let url = if proxy.contains("://") {
            proxy.clone()
        } else {
            format!("http://{proxy}")
        };
        builder = builder.no_proxy().proxy(
            Proxy::all(url).map_err(|e| MortyError::Config(format!("invalid --proxy value: {e}")))?,
        );
        info!("using custom HTTP proxy");
    } else if let Some(socks5) = &config.socks5_proxy {
        builder = builder.no_proxy().proxy(
            Proxy::all(format!("socks5://{socks5}"))
                .map_err(|e| MortyError::Config(format!("invalid --socks5 value: {e}")))?,
        );
        info!("using SOCKS5 proxy");
    } else {
        builder = builder.no_proxy();
        if config.ipv6 {
            info!("using dual stack (IPv4/IPv6) direct connections");
        } else {
            builder = builder.local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
            info!("using IPv4 only direct connections");
        }
    }

    builder
        .build()
        .map_err(|e| MortyError::Config(format!("failed to build HTTP client: {e}")))
}
