//! Character encoding detection.
//!
//! Detection order follows the usual sniffing cascade: BOM, then the
//! charset declared in the Content-Type header, then a `charset=` prescan
//! of the body prefix, then windows-1252 as the legacy fallback.

use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE, WINDOWS_1252};

/// How much of the body prefix the meta prescan inspects.
const PRESCAN_BYTES: usize = 1024;

/// Picks the encoding of a text body.
#[must_use]
pub fn detect(body: &[u8], declared: Option<&str>) -> &'static Encoding {
    if let Some(encoding) = detect_bom(body) {
        return encoding;
    }
    if let Some(encoding) = declared
        .and_then(|label| Encoding::for_label(label.trim().as_bytes()))
    {
        return encoding;
    }
    if let Some(encoding) = prescan_meta(body) {
        return encoding;
    }
    WINDOWS_1252
}

fn detect_bom(bytes: &[u8]) -> Option<&'static Encoding> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        Some(UTF_8)
    } else if bytes.starts_with(&[0xFF, 0xFE]) {
        Some(UTF_16LE)
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        Some(UTF_16BE)
    } else {
        None
    }
}

/// Scans the body prefix for a `charset=` declaration, as found in
/// `<meta charset="...">`, `<meta http-equiv="Content-Type" ...>` or a CSS
/// `@charset` rule.
fn prescan_meta(body: &[u8]) -> Option<&'static Encoding> {
    let prefix = &body[..body.len().min(PRESCAN_BYTES)];
    let lowered = prefix.to_ascii_lowercase();

    let mut search_start = 0;
    while let Some(relative) = find(&lowered[search_start..], b"charset=") {
        let label_start = search_start + relative + b"charset=".len();
        if let Some(label) = read_label(&prefix[label_start..]) {
            if let Some(encoding) = Encoding::for_label(label) {
                return Some(encoding);
            }
        }
        search_start = label_start;
    }
    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn read_label(input: &[u8]) -> Option<&[u8]> {
    let (input, quote) = match input.first() {
        Some(&q @ (b'"' | b'\'')) => (&input[1..], Some(q)),
        Some(_) => (input, None),
        None => return None,
    };
    let end = input
        .iter()
        .position(|&c| match quote {
            Some(q) => c == q,
            None => matches!(c, b'"' | b'\'' | b'>' | b';' | b' ' | b'\t' | b'\r' | b'\n' | b'/'),
        })
        .unwrap_or(input.len());
    if end == 0 { None } else { Some(&input[..end]) }
}
