//! CSS URL rewriting.
//!
//! Scans a CSS byte stream and rewrites every `url(...)` target through the
//! proxifier; everything else passes through verbatim. CSS is deliberately
//! not parsed structurally: this is best-effort over a conservative
//! superset of unreserved URL bytes.

use std::sync::LazyLock;

use regex::bytes::Regex;
use tracing::debug;

use crate::sanitize::proxify::{RequestContext, proxify_uri};

static CSS_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\((['"]?)[ \t\x0c]*([\x09\x21\x23-\x26\x28\x2a-\x7e]+)(['"]?)\)?"#)
        .expect("CSS url() pattern compiles")
});

/// Rewrites `url(...)` references in `css` into `out`.
///
/// A URL the proxifier rejects is left untouched; rewriting continues with
/// the next match.
pub fn rewrite_css(ctx: &RequestContext<'_>, out: &mut Vec<u8>, css: &[u8]) {
    let mut start = 0;

    for caps in CSS_URL_RE.captures_iter(css) {
        let Some(m) = caps.get(2) else {
            continue;
        };
        match proxify_uri(ctx, &css[m.start()..m.end()]) {
            Ok(uri) => {
                out.extend_from_slice(&css[start..m.start()]);
                out.extend_from_slice(uri.as_bytes());
                start = m.end();
            }
            Err(e) => {
                debug!(
                    url = %String::from_utf8_lossy(&css[m.start()..m.end()]),
                    error = %e,
                    "cannot proxify css uri"
                );
            }
        }
    }
    out.extend_from_slice(&css[start..]);
}
