//! Document encoding detection
//!
//! The `Content-Type` charset wins; otherwise the first `charset=` found in
//! the head of the document is used. Unknown labels count as absent.

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};

/// Bytes of the document scanned for a `<meta charset>` declaration
const META_PREFIX_LEN: usize = 1024;

/// Encoding declared for an HTML document, if any.
pub fn declared_encoding(content: &[u8], content_type: Option<&str>) -> Option<&'static Encoding> {
    let from_header = content_type
        .and_then(charset_from_content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()));
    if from_header.is_some() {
        return from_header;
    }

    // A meta tag readable as ASCII cannot really be UTF-16
    charset_from_meta(content)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .map(|encoding| {
            if encoding == UTF_16LE || encoding == UTF_16BE {
                UTF_8
            } else {
                encoding
            }
        })
}

/// `charset` parameter of a media type, quotes removed.
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let label = value.trim().trim_matches('"').trim_matches('\'').trim();
        (!label.is_empty()).then(|| label.to_string())
    })
}

fn charset_from_meta(content: &[u8]) -> Option<String> {
    let prefix = &content[..content.len().min(META_PREFIX_LEN)];
    let prefix = String::from_utf8_lossy(prefix);
    let lower = prefix.to_ascii_lowercase();

    let mut search_from = 0;
    while let Some(found) = lower[search_from..].find("charset=") {
        let start = search_from + found + "charset=".len();
        if let Some(label) = parse_label(&prefix[start..]) {
            return Some(label);
        }
        search_from = start;
    }
    None
}

fn parse_label(input: &str) -> Option<String> {
    let trimmed = input.trim_start();
    let first = trimmed.chars().next()?;

    let label = if first == '"' || first == '\'' {
        let rest = &trimmed[1..];
        &rest[..rest.find(first)?]
    } else {
        let end = trimmed
            .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ';' | '>' | '/'))
            .unwrap_or(trimmed.len());
        &trimmed[..end]
    };

    let label = label.trim();
    (!label.is_empty()).then(|| label.to_string())
}

