//! Proxy service logic.
//!
//! The request entry point: extracts the target URL and optional hash from
//! the query string or a form-encoded body, verifies the signature, and
//! hands the target to the dispatcher. Every request is answered here;
//! nothing is ever forwarded through the host proxy machinery.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use pingora::proxy::{ProxyHttp, Session};
use pingora::upstreams::peer::HttpPeer;
use pingora::{Error, ErrorType, Result};
use tracing::{debug, warn};

use crate::config::{MortyError, ProxyConfig};
use crate::core::proxy::dispatch::Dispatcher;
use crate::core::proxy::response::{serve_html, serve_proxy_response, serve_static};
use crate::security::sign;
use crate::web::ui::pages;

/// Request bodies are buffered in full, up to this cap.
const MAX_REQUEST_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Main proxy service.
pub struct MortyProxy {
    config: Arc<ProxyConfig>,
    dispatcher: Dispatcher,
}

impl MortyProxy {
    /// Creates a new `MortyProxy` service around a shared upstream client.
    #[must_use]
    pub fn new(config: Arc<ProxyConfig>, client: reqwest::Client) -> Self {
        let dispatcher = Dispatcher::new(config.clone(), client);
        Self { config, dispatcher }
    }

    async fn serve_main_page(
        &self,
        session: &mut Session,
        status: u16,
        error: Option<&str>,
    ) -> Result<bool> {
        let html = pages::main_page(error, self.config.key.is_some(), &self.config.url_param);
        serve_html(session, status, html).await
    }

    async fn read_request_body(&self, session: &mut Session) -> Result<Option<Bytes>> {
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = session.read_request_body().await? {
            if body.len() + chunk.len() > MAX_REQUEST_BODY_SIZE {
                return Err(Error::new(ErrorType::Custom("request body too large")));
            }
            body.extend_from_slice(&chunk);
        }
        if body.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Bytes::from(body)))
        }
    }
}

/// Removes every `name=value` pair for `name` from a URL-encoded string.
///
/// Returns the first decoded value (query semantics: the earliest pair
/// wins) and the remaining pairs verbatim, so the residue can be re-joined
/// byte-for-byte.
fn pop_url_encoded_param(encoded: &str, name: &str) -> (Option<String>, String) {
    let mut found = None;
    let mut kept: Vec<&str> = Vec::new();

    for pair in encoded.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key == name {
            if found.is_none() {
                found = Some(
                    percent_decode_str(&value.replace('+', " "))
                        .decode_utf8_lossy()
                        .into_owned(),
                );
            }
            continue;
        }
        kept.push(pair);
    }
    (found, kept.join("&"))
}

fn is_form_encoded(session: &Session) -> bool {
    session
        .req_header()
        .headers
        .get("Content-Type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

#[async_trait]
impl ProxyHttp for MortyProxy {
    type CTX = ();

    fn new_ctx(&self) -> Self::CTX {}

    async fn request_filter(&self, session: &mut Session, _ctx: &mut Self::CTX) -> Result<bool> {
        let path = session.req_header().uri.path().to_string();

        if path == "/robots.txt" {
            return serve_static(session, "text/plain", pages::ROBOTS_BODY.as_bytes()).await;
        }
        if path == "/favicon.ico" {
            return serve_static(session, "image/png", pages::FAVICON_BYTES.as_slice()).await;
        }

        let method = session.req_header().method.as_str().to_string();
        let raw_query = session
            .req_header()
            .uri
            .query()
            .unwrap_or("")
            .to_string();

        let mut upstream_body = if matches!(method.as_str(), "POST" | "PUT") {
            self.read_request_body(session).await?
        } else {
            None
        };

        // The url and hash parameters are stripped from both carriers so
        // they never leak into the upstream request; the query string wins
        // when both carry them.
        let (query_hash, rest) = pop_url_encoded_param(&raw_query, &self.config.hash_param);
        let (query_url, remaining_query) = pop_url_encoded_param(&rest, &self.config.url_param);

        let (mut body_hash, mut body_url) = (None, None);
        if is_form_encoded(session) {
            if let Some(body) = &upstream_body {
                let body_str = String::from_utf8_lossy(body).into_owned();
                let (h, rest) = pop_url_encoded_param(&body_str, &self.config.hash_param);
                let (u, remaining_body) = pop_url_encoded_param(&rest, &self.config.url_param);
                body_hash = h;
                body_url = u;
                upstream_body = Some(Bytes::from(remaining_body.into_bytes()));
            }
        }

        let request_hash = query_hash.or(body_hash);
        let Some(mut target) = query_url.or(body_url) else {
            return self.serve_main_page(session, 200, None).await;
        };

        if let Some(key) = &self.config.key {
            let hash = request_hash.unwrap_or_default();
            if !sign::verify(target.as_bytes(), hash.as_bytes(), key) {
                warn!(url = %target, "signature verification failed");
                let err = MortyError::SignatureInvalid {
                    param: self.config.hash_param.clone(),
                };
                return self
                    .serve_main_page(session, err.status(), Some(&err.to_string()))
                    .await;
            }
        }

        // Residual client query args ride along to the upstream verbatim.
        if !remaining_query.is_empty() {
            target.push(if target.contains('?') { '&' } else { '?' });
            target.push_str(&remaining_query);
        }

        match self.dispatcher.process(&method, upstream_body, target).await {
            Ok(response) => serve_proxy_response(session, response).await,
            Err(MortyError::UnsafeProtocol(url)) => {
                debug!(url = %url, "serving exit page");
                serve_html(session, 403, pages::exit_page(&url)).await
            }
            Err(err) => {
                debug!(error = %err, "request failed");
                self.serve_main_page(session, err.status(), Some(&err.to_string()))
                    .await
            }
        }
    }

    async fn upstream_peer(
        &self,
        _session: &mut Session,
        _ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        // request_filter answers every request, so the proxy phase is never
        // entered.
        Err(Error::explain(
            ErrorType::HTTPStatus(404),
            "all requests are handled in request_filter",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_config;

    #[test]
    fn test_pop_param_from_query() {
        let (value, rest) = pop_url_encoded_param(
            "mortyurl=http%3A%2F%2Fx.com%2F&other=1",
            "mortyurl",
        );
        assert_eq!(value.as_deref(), Some("http://x.com/"));
        assert_eq!(rest, "other=1");
    }

    #[test]
    fn test_pop_param_missing() {
        let (value, rest) = pop_url_encoded_param("a=1&b=2", "mortyurl");
        assert!(value.is_none());
        assert_eq!(rest, "a=1&b=2");
    }

    #[test]
    fn test_pop_param_removes_duplicates_keeps_first() {
        let (value, rest) = pop_url_encoded_param("u=first&x=1&u=second", "u");
        assert_eq!(value.as_deref(), Some("first"));
        assert_eq!(rest, "x=1");
    }

    #[test]
    fn test_pop_param_plus_decodes_to_space() {
        let (value, _) = pop_url_encoded_param("q=hello+world", "q");
        assert_eq!(value.as_deref(), Some("hello world"));
    }

    #[test]
    fn test_pop_param_residue_stays_encoded() {
        let (_, rest) = pop_url_encoded_param("u=x&keep=a%20b%2Fc", "u");
        assert_eq!(rest, "keep=a%20b%2Fc");
    }

    #[test]
    fn test_service_construction() {
        let config = create_test_config();
        let client = reqwest::Client::new();
        let proxy = MortyProxy::new(config, client);
        proxy.new_ctx();
    }
}
