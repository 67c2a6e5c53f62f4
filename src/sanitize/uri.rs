//! URL pre-cleaning.
//!
//! Byte-level trimming and scheme extraction for untrusted URL-ish byte
//! strings. This defends against constructs like `  Ja\tvaScript:…` without
//! parsing a full URL, and is idempotent.

/// Strips control bytes and whitespace from an untrusted URL candidate and
/// extracts its scheme.
///
/// Trailing bytes `<= 0x20` are removed. Walking from the start, bytes
/// `<= 0x20` are dropped and ASCII uppercase is lowered, until either a `:`
/// (scheme terminator) or one of `/ ? \ #` (relative-URL sentinel) is seen.
///
/// Returns the cleaned bytes and the extracted scheme including the trailing
/// `:` (empty when no scheme terminator was found). When a scheme was found,
/// the returned bytes begin with the normalized lowercase scheme.
#[must_use]
pub fn sanitize_uri(uri: &[u8]) -> (Vec<u8>, String) {
    let end = uri
        .iter()
        .rposition(|&c| c > 0x20)
        .map_or(0, |i| i + 1);
    let uri = &uri[..end];

    let mut buffer: Vec<u8> = Vec::with_capacity(10);
    let mut first_kept = None;
    let mut scheme_end = None;

    for (i, &c) in uri.iter().enumerate() {
        if c <= 0x20 {
            continue;
        }
        let c = c.to_ascii_lowercase();
        buffer.push(c);
        if first_kept.is_none() {
            first_kept = Some(i);
        }
        if c == b':' {
            scheme_end = Some(i);
            break;
        }
        if matches!(c, b'/' | b'?' | b'\\' | b'#') {
            break;
        }
    }

    match scheme_end {
        Some(end) => {
            let scheme = String::from_utf8_lossy(&buffer).into_owned();
            buffer.extend_from_slice(&uri[end + 1..]);
            (buffer, scheme)
        }
        None => (
            uri[first_kept.unwrap_or(uri.len())..].to_vec(),
            String::new(),
        ),
    }
}
