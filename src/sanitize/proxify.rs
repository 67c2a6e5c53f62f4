//! URL proxification.
//!
//! Resolves a candidate URL against the document base, classifies it, and
//! either returns a safe literal (fragment or allow-listed `data:` image),
//! drops it, or produces a proxy-routed URL, HMAC-signed when a key is
//! configured.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use url::Url;

use crate::config::{MortyError, ProxyConfig, Result};
use crate::sanitize::uri::sanitize_uri;
use crate::security::sign;

/// Per-request rewriting state.
///
/// The base URL is a mutable cursor: a `<base href>` tag rewrites it
/// mid-stream so later relative links resolve against the new base.
pub struct RequestContext<'a> {
    pub key: Option<&'a [u8]>,
    pub base_url: Url,
    pub body_injected: bool,
    pub url_param: &'a str,
    pub hash_param: &'a str,
}

impl<'a> RequestContext<'a> {
    #[must_use]
    pub fn new(config: &'a ProxyConfig, base_url: Url) -> Self {
        Self {
            key: config.key.as_deref(),
            base_url,
            body_injected: false,
            url_param: &config.url_param,
            hash_param: &config.hash_param,
        }
    }
}

/// `data:` payloads that may pass through as literals.
const SAFE_DATA_PREFIXES: &[&[u8]] = &[
    b"data:image/png",
    b"data:image/jpeg",
    b"data:image/pjpeg",
    b"data:image/gif",
    b"data:image/webp",
];

// Everything outside `A-Za-z0-9-_.~` is percent-encoded; space becomes `+`.
const QUERY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn query_escape(s: &str) -> String {
    utf8_percent_encode(s, QUERY_ESCAPE)
        .to_string()
        .replace("%20", "+")
}

fn is_same_document(resolved: &Url, base: &Url) -> bool {
    resolved.scheme() == base.scheme()
        && resolved.username() == base.username()
        && resolved.password() == base.password()
        && resolved.host_str() == base.host_str()
        && resolved.port() == base.port()
        && resolved.path() == base.path()
        && resolved.query() == base.query()
}

/// Maps a candidate URL to a safe replacement.
///
/// Returns an empty string for dropped targets (`javascript:`, disallowed
/// `data:`), a bare `#fragment` for same-document links, an allow-listed
/// `data:image/*` literal unchanged, and otherwise the proxy-routed
/// `./?<url-param>=…[&<hash-param>=…][#fragment]` form. The HMAC is computed
/// over the resolved URL before percent-encoding.
///
/// # Errors
///
/// Returns [`MortyError::MalformedUrl`] when the candidate does not parse
/// against the base URL.
pub fn proxify_uri(ctx: &RequestContext<'_>, uri: &[u8]) -> Result<String> {
    let (uri, scheme) = sanitize_uri(uri);

    if scheme == "javascript:" {
        return Ok(String::new());
    }

    if scheme == "data:" {
        // The literal is re-emitted inside an attribute value, so payloads
        // that could terminate the attribute are dropped outright.
        if SAFE_DATA_PREFIXES.iter().any(|p| uri.starts_with(p))
            && !uri
                .iter()
                .any(|c| matches!(c, b'"' | b'\'' | b'<' | b'>'))
        {
            return Ok(String::from_utf8_lossy(&uri).into_owned());
        }
        return Ok(String::new());
    }

    let candidate = String::from_utf8_lossy(&uri);
    let mut resolved = Url::options()
        .base_url(Some(&ctx.base_url))
        .parse(&candidate)
        .map_err(|e| MortyError::MalformedUrl(e.to_string()))?;

    let fragment = resolved
        .fragment()
        .map(|f| format!("#{f}"))
        .unwrap_or_default();
    resolved.set_fragment(None);

    if is_same_document(&resolved, &ctx.base_url) {
        return Ok(fragment);
    }

    let target = resolved.to_string();
    match ctx.key {
        None => Ok(format!(
            "./?{}={}{}",
            ctx.url_param,
            query_escape(&target),
            fragment
        )),
        Some(key) => Ok(format!(
            "./?{}={}&{}={}{}",
            ctx.url_param,
            query_escape(&target),
            ctx.hash_param,
            sign::hash(target.as_bytes(), key),
            fragment
        )),
    }
}
