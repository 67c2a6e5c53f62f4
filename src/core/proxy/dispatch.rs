//! Response dispatching.
//!
//! Fetches the target resource and decides what becomes of it: sanitize
//! (HTML or CSS), force an attachment, pass through, or refuse. Also owns
//! the manual redirect loop and the UTF-8 normalization of text bodies.

use std::sync::{Arc, LazyLock};

use bytes::Bytes;
use encoding_rs::UTF_8;
use reqwest::Method;
use reqwest::header::{CONNECTION, CONTENT_DISPOSITION, CONTENT_TYPE, LOCATION};
use tracing::debug;
use url::Url;

use crate::config::{MortyError, ProxyConfig, Result};
use crate::core::proxy::charset;
use crate::sanitize::contenttype::{self, MediaType, MediaTypePredicate};
use crate::sanitize::css::rewrite_css;
use crate::sanitize::html::sanitize_html;
use crate::sanitize::proxify::{RequestContext, proxify_uri};
use crate::web::ui::pages;

/// Hop limit for followed redirects.
const MAX_REDIRECT_COUNT: usize = 5;

/// Upstream bodies are buffered in full, up to this cap.
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

/// Media types rewritten (or passed through inline) by the proxy.
static ALLOWED_CONTENTTYPE: LazyLock<MediaTypePredicate> = LazyLock::new(|| {
    contenttype::any_of(vec![
        // html
        contenttype::equals("text", "html", ""),
        contenttype::equals("application", "xhtml", "xml"),
        // css
        contenttype::equals("text", "css", ""),
        // images
        contenttype::equals("image", "gif", ""),
        contenttype::equals("image", "png", ""),
        contenttype::equals("image", "jpeg", ""),
        contenttype::equals("image", "pjpeg", ""),
        contenttype::equals("image", "webp", ""),
        contenttype::equals("image", "tiff", ""),
        contenttype::equals("image", "vnd.microsoft.icon", ""),
        contenttype::equals("image", "bmp", ""),
        contenttype::equals("image", "x-ms-bmp", ""),
        contenttype::equals("image", "x-icon", ""),
        // fonts
        contenttype::equals("application", "font-otf", ""),
        contenttype::equals("application", "font-ttf", ""),
        contenttype::equals("application", "font-woff", ""),
        contenttype::equals("application", "vnd.ms-fontobject", ""),
    ])
});

/// Media types forced to download as attachments.
static ALLOWED_CONTENTTYPE_ATTACHMENT: LazyLock<MediaTypePredicate> = LazyLock::new(|| {
    contenttype::any_of(vec![
        // texts
        contenttype::equals("text", "csv", ""),
        contenttype::equals("text", "tab-separated-values", ""),
        contenttype::equals("text", "plain", ""),
        // API
        contenttype::equals("application", "json", ""),
        // documents
        contenttype::equals("application", "x-latex", ""),
        contenttype::equals("application", "pdf", ""),
        contenttype::equals("application", "vnd.oasis.opendocument.text", ""),
        contenttype::equals("application", "vnd.oasis.opendocument.spreadsheet", ""),
        contenttype::equals("application", "vnd.oasis.opendocument.presentation", ""),
        contenttype::equals("application", "vnd.oasis.opendocument.graphics", ""),
        // compressed archives
        contenttype::equals("application", "zip", ""),
        contenttype::equals("application", "gzip", ""),
        contenttype::equals("application", "x-compressed", ""),
        contenttype::equals("application", "x-gtar", ""),
        contenttype::equals("application", "x-compress", ""),
        // generic binary
        contenttype::equals("application", "octet-stream", ""),
    ])
});

const ALLOWED_CONTENTTYPE_PARAMETERS: &[&str] = &["charset"];

/// A fully processed upstream response, ready to be written to the client.
#[derive(Debug, Default)]
pub struct ProxyResponse {
    pub status: u16,
    pub content_type: String,
    pub content_disposition: Option<String>,
    pub location: Option<String>,
    pub body: Vec<u8>,
}

/// Fetches targets and turns them into [`ProxyResponse`]s.
pub struct Dispatcher {
    config: Arc<ProxyConfig>,
    client: reqwest::Client,
}

impl Dispatcher {
    #[must_use]
    pub fn new(config: Arc<ProxyConfig>, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Fetches `target` and processes the response per the content-type
    /// gating rules. Follows GET redirects when configured, up to the hop
    /// limit; other redirects come back with a proxified `Location`.
    ///
    /// # Errors
    ///
    /// Every failure maps to a [`MortyError`] whose `status()` is the HTTP
    /// status to serve.
    pub async fn process(
        &self,
        method: &str,
        request_body: Option<Bytes>,
        target: String,
    ) -> Result<ProxyResponse> {
        let mut target = target;
        let mut redirect_count = 0;

        loop {
            let parsed = parse_target(&target)?;

            if !matches!(parsed.scheme(), "http" | "https")
                || parsed.host_str().is_some_and(|h| h.ends_with(".onion"))
            {
                return Err(MortyError::UnsafeProtocol(parsed.to_string()));
            }

            debug!(method, url = %parsed, "fetching upstream");

            let method = Method::from_bytes(method.as_bytes())
                .map_err(|e| MortyError::UpstreamTransport(e.to_string()))?;
            let mut request = self
                .client
                .request(method.clone(), parsed.clone())
                .header(CONNECTION, "close");
            if matches!(method, Method::POST | Method::PUT) {
                if let Some(body) = &request_body {
                    request = request.body(body.clone());
                }
            }

            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    MortyError::UpstreamTimeout
                } else {
                    MortyError::UpstreamTransport(e.to_string())
                }
            })?;

            let status = response.status().as_u16();
            if status == 200 {
                return self.process_response(response, &parsed, &target).await;
            }

            if matches!(status, 301 | 302 | 303 | 307 | 308) {
                if let Some(location) = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
                {
                    if self.config.follow_redirect && method == Method::GET {
                        if redirect_count < MAX_REDIRECT_COUNT {
                            debug!(location = %location, "follow redirect");
                            target = location;
                            redirect_count += 1;
                            continue;
                        }
                        return Err(MortyError::RedirectLimit);
                    }
                    let ctx = RequestContext::new(&self.config, parsed.clone());
                    if let Ok(rewritten) = proxify_uri(&ctx, location.as_bytes()) {
                        debug!(location = %location, "redirect to");
                        return Ok(ProxyResponse {
                            status,
                            location: Some(rewritten),
                            ..ProxyResponse::default()
                        });
                    }
                }
            }

            return Err(MortyError::UpstreamStatus {
                status,
                url: target,
            });
        }
    }

    async fn process_response(
        &self,
        response: reqwest::Response,
        base_url: &Url,
        target: &str,
    ) -> Result<ProxyResponse> {
        let content_type_header = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(MortyError::MissingContentType)?;

        let mut media_type =
            MediaType::parse(&content_type_header).map_err(|_| MortyError::MalformedContentType)?;

        let mut content_disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = read_body_capped(response).await?;

        if !(*ALLOWED_CONTENTTYPE)(&media_type) {
            if (*ALLOWED_CONTENTTYPE_ATTACHMENT)(&media_type) {
                content_disposition = Some(force_attachment(
                    content_disposition.as_deref(),
                    base_url,
                ));
            } else {
                return Err(MortyError::ForbiddenType(base_url.to_string()));
            }
        }

        // */xhtml is processed as plain HTML.
        if media_type.subtype == "xhtml" {
            media_type.top_level = "text".to_string();
            media_type.subtype = "html".to_string();
            media_type.suffix = String::new();
        }

        let mut body = body;
        if media_type.top_level == "text" {
            let declared = media_type.parameters.get("charset").map(String::as_str);
            let encoding = charset::detect(&body, declared);
            if encoding != UTF_8 {
                let (decoded, _, had_errors) = encoding.decode(&body);
                if had_errors {
                    return Err(MortyError::CharsetDecodeFailure(format!(
                        "{} ({})",
                        encoding.name(),
                        target
                    )));
                }
                body = decoded.into_owned().into_bytes();
            }
            media_type
                .parameters
                .insert("charset".to_string(), "UTF-8".to_string());
        }

        media_type.filter_parameters(ALLOWED_CONTENTTYPE_PARAMETERS);
        let content_type = media_type.to_string();

        if media_type.subtype == "css" && media_type.suffix.is_empty() {
            let ctx = RequestContext::new(&self.config, base_url.clone());
            let mut out = Vec::with_capacity(body.len());
            rewrite_css(&ctx, &mut out, &body);
            return Ok(ProxyResponse {
                status: 200,
                content_type,
                body: out,
                ..ProxyResponse::default()
            });
        }

        if media_type.subtype == "html" && media_type.suffix.is_empty() {
            let mut ctx = RequestContext::new(&self.config, base_url.clone());
            let mut out = sanitize_html(&mut ctx, &String::from_utf8_lossy(&body));
            if !ctx.body_injected {
                // Malformed input never produced </body>; the chrome still
                // has to appear exactly once.
                out.push_str(&pages::body_chrome(
                    ctx.base_url.as_str(),
                    ctx.key.is_some(),
                    ctx.url_param,
                ));
            }
            return Ok(ProxyResponse {
                status: 200,
                content_type,
                body: out.into_bytes(),
                ..ProxyResponse::default()
            });
        }

        Ok(ProxyResponse {
            status: 200,
            content_type,
            content_disposition,
            body,
            ..ProxyResponse::default()
        })
    }
}

/// Parses the requested target, defaulting schemeless input to `https://`.
fn parse_target(target: &str) -> Result<Url> {
    match Url::parse(target) {
        Ok(url) => Ok(url),
        Err(_) => Url::parse(&format!("https://{target}"))
            .map_err(|e| MortyError::MalformedUrl(e.to_string())),
    }
}

async fn read_body_capped(mut response: reqwest::Response) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| MortyError::UpstreamTransport(e.to_string()))?
    {
        if body.len() + chunk.len() > MAX_RESPONSE_SIZE {
            return Err(MortyError::UpstreamTransport(
                "response body exceeds size limit".to_string(),
            ));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Rewrites a Content-Disposition value to force an attachment, preserving
/// existing parameters. The fallback file name parameter keeps its
/// historical `fileName` spelling; an upstream `filename` is never
/// overwritten.
fn force_attachment(existing: Option<&str>, url: &Url) -> String {
    let mut disposition = existing
        .and_then(|value| MediaType::parse(value).ok())
        .unwrap_or_default();
    disposition.top_level = "attachment".to_string();
    disposition.subtype = String::new();
    disposition.suffix = String::new();

    if !disposition.parameters.contains_key("filename") {
        disposition
            .parameters
            .insert("fileName".to_string(), base_name(url.path()).to_string());
    }
    disposition.to_string()
}

/// Last path segment, with the Go `filepath.Base` edge cases.
fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
