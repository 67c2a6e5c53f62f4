//! Response header hygiene.

use pingora::Result;
use pingora::http::ResponseHeader;

/// Adds the proxy's fixed response headers.
///
/// The rewritten documents already carry a no-referrer meta tag; the header
/// covers non-HTML responses too.
///
/// # Errors
///
/// Returns an error if header insertion fails.
pub fn inject_proxy_headers(header: &mut ResponseHeader) -> Result<()> {
    header.insert_header("X-Content-Type-Options", "nosniff")?;
    header.insert_header("Referrer-Policy", "no-referrer")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_proxy_headers() {
        let mut header = ResponseHeader::build(200, None).unwrap();
        inject_proxy_headers(&mut header).unwrap();
        assert_eq!(
            header
                .headers
                .get("X-Content-Type-Options")
                .and_then(|v| v.to_str().ok()),
            Some("nosniff")
        );
        assert_eq!(
            header
                .headers
                .get("Referrer-Policy")
                .and_then(|v| v.to_str().ok()),
            Some("no-referrer")
        );
    }
}
