//! Error types and result aliases.
//!
//! Defines the core `MortyError` enumeration and common `Result` type.
//! Every variant that can surface to a client maps to an HTTP status via
//! [`MortyError::status`].

use thiserror::Error;

/// Proxy-specific errors.
#[derive(Debug, Error)]
pub enum MortyError {
    /// Configuration error (startup only).
    #[error("configuration error: {0}")]
    Config(String),

    /// Request signature missing or mismatched.
    #[error("invalid \"{param}\" parameter. hint: Hash URL Parameter")]
    SignatureInvalid { param: String },

    /// Upstream request exceeded the configured timeout.
    #[error("request timeout")]
    UpstreamTimeout,

    /// DNS, TCP or TLS failure while talking to the upstream.
    #[error("upstream request failed: {0}")]
    UpstreamTransport(String),

    /// Upstream answered with a status the proxy does not relay.
    #[error("invalid response: {status} ({url})")]
    UpstreamStatus { status: u16, url: String },

    /// Redirect chain exceeded the hop limit.
    #[error("Too many redirects")]
    RedirectLimit,

    /// Upstream response carried no Content-Type header.
    #[error("invalid content type")]
    MissingContentType,

    /// Upstream Content-Type header did not parse.
    #[error("invalid content type")]
    MalformedContentType,

    /// Media type is in neither allow-list.
    #[error("forbidden content type {0}")]
    ForbiddenType(String),

    /// Declared charset could not be transcoded to UTF-8.
    #[error("charset decode failure: {0}")]
    CharsetDecodeFailure(String),

    /// Target uses a non-HTTP(S) scheme or a .onion host; only the
    /// exit-confirmation page may link it.
    #[error("refusing to fetch non-HTTP(S) target {0}")]
    UnsafeProtocol(String),

    /// A URL failed to parse.
    #[error("malformed url: {0}")]
    MalformedUrl(String),
}

impl MortyError {
    /// HTTP status code served alongside this error.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Config(_) | Self::UpstreamTransport(_) | Self::MalformedUrl(_) => 500,
            Self::SignatureInvalid { .. } | Self::ForbiddenType(_) | Self::UnsafeProtocol(_) => 403,
            Self::UpstreamTimeout => 504,
            Self::UpstreamStatus { status, .. } => *status,
            Self::RedirectLimit => 310,
            Self::MissingContentType | Self::MalformedContentType | Self::CharsetDecodeFailure(_) => {
                503
            }
        }
    }
}

/// Result type alias for `MortyError`.
pub type Result<T> = std::result::Result<T, MortyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(MortyError::UpstreamTimeout.status(), 504);
        assert_eq!(MortyError::RedirectLimit.status(), 310);
        assert_eq!(MortyError::MissingContentType.status(), 503);
        assert_eq!(MortyError::ForbiddenType("x".into()).status(), 403);
        assert_eq!(
            MortyError::UpstreamStatus {
                status: 418,
                url: "http://x/".into()
            }
            .status(),
            418
        );
    }

    #[test]
    fn test_signature_message_names_parameter() {
        let err = MortyError::SignatureInvalid {
            param: "mortyhash".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid \"mortyhash\" parameter. hint: Hash URL Parameter"
        );
    }
}
