//! Shared test helpers.

use std::sync::Arc;

use url::Url;

use crate::config::ProxyConfig;
use crate::sanitize::proxify::RequestContext;

/// A configuration with signature checks disabled and default parameter
/// names, suitable for exercising the rewriting pipeline.
#[must_use]
pub fn create_test_config() -> Arc<ProxyConfig> {
    Arc::new(ProxyConfig {
        listen_address: "127.0.0.1:0".to_string(),
        key: None,
        ipv6: true,
        debug: false,
        request_timeout: 5,
        follow_redirect: false,
        proxy_env: false,
        http_proxy: None,
        socks5_proxy: None,
        url_param: "mortyurl".to_string(),
        hash_param: "mortyhash".to_string(),
    })
}

/// A request context for `config` with the given document base URL.
///
/// # Panics
///
/// Panics if `base` is not an absolute URL.
#[must_use]
pub fn test_context<'a>(config: &'a ProxyConfig, base: &str) -> RequestContext<'a> {
    RequestContext::new(config, Url::parse(base).expect("test base URL parses"))
}
