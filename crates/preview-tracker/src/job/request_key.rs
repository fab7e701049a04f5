//! Canonical request keys.
//!
//! A request key identifies "the same logical request" independently of the
//! preview id the server assigned. The canonical form is
//! `v1:<url>|<source>|<target>|<email>` with every component percent-encoded,
//! so the delimiter can never appear inside a component. The legacy form is the
//! same four fields joined with a bare `|` and no prefix.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

pub const REQUEST_KEY_PREFIX: &str = "v1:";
pub const REQUEST_KEY_DELIMITER: char = '|';

/// Everything outside the RFC 3986 unreserved set is encoded.
pub(crate) const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// The four logical fields a request key is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKeyParts {
    pub source_url: String,
    pub source_lang: String,
    pub target_lang: String,
    pub email: Option<String>,
}

impl RequestKeyParts {
    /// Rebuilds the canonical key for these parts.
    pub fn to_key(&self) -> String {
        build_request_key(
            &self.source_url,
            &self.source_lang,
            &self.target_lang,
            self.email.as_deref(),
        )
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

fn normalize_email(email: Option<&str>) -> String {
    email.map(|e| e.trim().to_lowercase()).unwrap_or_default()
}

fn encode(component: &str) -> String {
    utf8_percent_encode(component, COMPONENT).to_string()
}

fn decode(component: &str) -> Option<String> {
    percent_decode_str(component)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Builds the canonical (versioned) request key.
pub fn build_request_key(
    source_url: &str,
    source_lang: &str,
    target_lang: &str,
    email: Option<&str>,
) -> String {
    let components = [
        encode(source_url.trim()),
        encode(&normalize_tag(source_lang)),
        encode(&normalize_tag(target_lang)),
        encode(&normalize_email(email)),
    ];
    let mut key = String::from(REQUEST_KEY_PREFIX);
    key.push_str(&components.join("|"));
    key
}

/// Parses a request key in either the versioned or the legacy encoding.
pub fn parse_request_key(key: &str) -> Option<RequestKeyParts> {
    match key.strip_prefix(REQUEST_KEY_PREFIX) {
        Some(body) => parse_versioned(body),
        None => parse_legacy(key),
    }
}

fn parse_versioned(body: &str) -> Option<RequestKeyParts> {
    let parts: Vec<&str> = body.split(REQUEST_KEY_DELIMITER).collect();
    let [url, source, target, email] = parts.as_slice() else {
        return None;
    };
    Some(RequestKeyParts {
        source_url: decode(url)?,
        source_lang: decode(source)?,
        target_lang: decode(target)?,
        email: non_empty(decode(email)?),
    })
}

/// Legacy keys were joined without escaping. When the URL itself contained the
/// delimiter the field boundaries are ambiguous; the trailing three fields are
/// taken as source, target and email and everything before them is the URL.
fn parse_legacy(key: &str) -> Option<RequestKeyParts> {
    let parts: Vec<&str> = key.split(REQUEST_KEY_DELIMITER).collect();
    match parts.len() {
        0..=2 => None,
        3 => Some(RequestKeyParts {
            source_url: parts[0].trim().to_string(),
            source_lang: normalize_tag(parts[1]),
            target_lang: normalize_tag(parts[2]),
            email: None,
        }),
        n => {
            let url = parts[..n - 3].join("|");
            Some(RequestKeyParts {
                source_url: url.trim().to_string(),
                source_lang: normalize_tag(parts[n - 3]),
                target_lang: normalize_tag(parts[n - 2]),
                email: non_empty(normalize_email(Some(parts[n - 1]))),
            })
        }
    }
}

/// Converts a key in any accepted encoding into the canonical one.
pub fn canonicalize_request_key(key: &str) -> Option<String> {
    parse_request_key(key).map(|parts| parts.to_key())
}
