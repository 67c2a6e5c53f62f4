//! HTTP response utilities.
//!
//! Shared functions for writing proxy-owned pages, static assets and
//! processed upstream responses to the client session.

use pingora::Result;
use pingora::http::ResponseHeader;
use pingora::proxy::Session;

use crate::core::proxy::dispatch::ProxyResponse;
use crate::core::proxy::headers::inject_proxy_headers;

/// Serves a proxy-owned HTML page (landing or exit page).
///
/// # Errors
///
/// Returns an error if headers cannot be built or the response cannot be
/// written.
pub async fn serve_html(session: &mut Session, status: u16, html: String) -> Result<bool> {
    let mut header = ResponseHeader::build(status, None)?;
    header.insert_header("Content-Type", "text/html; charset=UTF-8")?;
    header.insert_header("Content-Length", html.len().to_string())?;
    header.insert_header("Cache-Control", "no-store, no-cache, must-revalidate, max-age=0")?;
    inject_proxy_headers(&mut header)?;

    session
        .write_response_header(Box::new(header), false)
        .await?;
    session
        .write_response_body(Some(bytes::Bytes::from(html)), true)
        .await?;
    Ok(true)
}

/// Serves a static asset with a fixed content type.
///
/// # Errors
///
/// Returns an error if headers cannot be built or the response cannot be
/// written.
pub async fn serve_static(
    session: &mut Session,
    content_type: &str,
    body: &'static [u8],
) -> Result<bool> {
    let mut header = ResponseHeader::build(200, None)?;
    header.insert_header("Content-Type", content_type)?;
    header.insert_header("Content-Length", body.len().to_string())?;
    inject_proxy_headers(&mut header)?;

    session
        .write_response_header(Box::new(header), false)
        .await?;
    session
        .write_response_body(Some(bytes::Bytes::from_static(body)), true)
        .await?;
    Ok(true)
}

/// Writes a processed upstream response: rewritten content, passthrough
/// bytes, or a redirect with a proxified `Location`.
///
/// # Errors
///
/// Returns an error if headers cannot be built or the response cannot be
/// written.
pub async fn serve_proxy_response(session: &mut Session, response: ProxyResponse) -> Result<bool> {
    let mut header = ResponseHeader::build(response.status, None)?;
    if !response.content_type.is_empty() {
        header.insert_header("Content-Type", &response.content_type)?;
    }
    if let Some(disposition) = &response.content_disposition {
        header.insert_header("Content-Disposition", disposition)?;
    }
    if let Some(location) = &response.location {
        header.insert_header("Location", location)?;
    }
    header.insert_header("Content-Length", response.body.len().to_string())?;
    inject_proxy_headers(&mut header)?;

    session
        .write_response_header(Box::new(header), false)
        .await?;
    session
        .write_response_body(Some(bytes::Bytes::from(response.body)), true)
        .await?;
    Ok(true)
}
