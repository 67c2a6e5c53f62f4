//! Media type parsing and predicates.
//!
//! Parses `type/subtype+suffix; k=v` header values into a [`MediaType`],
//! serializes them back, and builds the composable predicates used for the
//! inline and attachment allow-lists.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::{MortyError, Result};

/// A parsed media type. Name fields are stored lowercase; parameter keys are
/// unique and lowercase, parameter values keep their original case.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaType {
    pub top_level: String,
    pub subtype: String,
    pub suffix: String,
    pub parameters: BTreeMap<String, String>,
}

impl MediaType {
    /// Parses a `Content-Type`-shaped header value.
    ///
    /// # Errors
    ///
    /// Returns [`MortyError::MalformedContentType`] when the mime part is
    /// empty or a parameter is not a `k=v` pair.
    pub fn parse(value: &str) -> Result<Self> {
        let mut pieces = value.split(';');
        let mime = pieces
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        if mime.is_empty() {
            return Err(MortyError::MalformedContentType);
        }

        let mut parameters = BTreeMap::new();
        for piece in pieces {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            let (k, v) = piece
                .split_once('=')
                .ok_or(MortyError::MalformedContentType)?;
            let key = k.trim().to_ascii_lowercase();
            if key.is_empty() {
                return Err(MortyError::MalformedContentType);
            }
            parameters.insert(key, unquote(v.trim()).to_string());
        }

        let (top_level, rest) = match mime.split_once('/') {
            Some((t, r)) => (t.to_string(), r),
            None => (mime.clone(), ""),
        };
        let (subtype, suffix) = match rest.split_once('+') {
            Some((s, x)) => (s.to_string(), x.to_string()),
            None => (rest.to_string(), String::new()),
        };

        Ok(Self {
            top_level,
            subtype,
            suffix,
            parameters,
        })
    }

    /// Removes every parameter whose key is not in `allowed`.
    pub fn filter_parameters(&mut self, allowed: &[&str]) {
        self.parameters.retain(|k, _| allowed.contains(&k.as_str()));
    }
}

fn unquote(v: &str) -> &str {
    v.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(v)
}

fn is_token(v: &str) -> bool {
    !v.is_empty()
        && v.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subtype.is_empty() {
            write!(f, "{}", self.top_level)?;
        } else if self.suffix.is_empty() {
            write!(f, "{}/{}", self.top_level, self.subtype)?;
        } else {
            write!(f, "{}/{}+{}", self.top_level, self.subtype, self.suffix)?;
        }
        for (k, v) in &self.parameters {
            if is_token(v) {
                write!(f, "; {k}={v}")?;
            } else {
                write!(f, "; {k}=\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\""))?;
            }
        }
        Ok(())
    }
}

/// An opaque predicate over media types.
pub type MediaTypePredicate = Box<dyn Fn(&MediaType) -> bool + Send + Sync>;

/// Matches when `token` appears anywhere in one of the three name fields.
pub fn contains(token: &str) -> MediaTypePredicate {
    let token = token.to_string();
    Box::new(move |m| {
        m.top_level.contains(&token) || m.subtype.contains(&token) || m.suffix.contains(&token)
    })
}

/// Matches per-field equality, where `"*"` is a wildcard.
pub fn equals(top_level: &str, subtype: &str, suffix: &str) -> MediaTypePredicate {
    let (top_level, subtype, suffix) = (
        top_level.to_string(),
        subtype.to_string(),
        suffix.to_string(),
    );
    Box::new(move |m| {
        (top_level == "*" || top_level == m.top_level)
            && (subtype == "*" || subtype == m.subtype)
            && (suffix == "*" || suffix == m.suffix)
    })
}

/// Matches when any predicate in `predicates` matches.
pub fn any_of(predicates: Vec<MediaTypePredicate>) -> MediaTypePredicate {
    Box::new(move |m| predicates.iter().any(|p| p(m)))
}
