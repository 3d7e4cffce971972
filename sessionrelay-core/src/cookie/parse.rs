use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedCookieError {
    #[error("set-cookie header has no name=value pair")]
    MissingPair,

    #[error("set-cookie header has an empty cookie name")]
    EmptyName,
}

/// One parsed `Set-Cookie` header line: the primary name/value pair plus its
/// attributes, keyed by canonical (camelCase) attribute name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieEntry {
    pub name: String,
    pub value: String,
    pub options: BTreeMap<String, String>,
}

/// Parse one raw `Set-Cookie`-style header line.
///
/// The first `;`-delimited segment must be the `name=value` pair; every
/// later segment is an attribute. A segment without `=` is a flag attribute
/// with an empty value, a blank segment is skipped. When the same attribute
/// key appears twice, the first occurrence wins (the wire format puts the
/// most specific value first). Cookie names across a batch of headers use
/// the opposite rule; see `TokenCodec::token_from_entries`.
pub fn parse_set_cookie(raw: &str) -> Result<CookieEntry, MalformedCookieError> {
    let mut segments = raw.split(';');

    // `split` always yields at least one segment.
    let first = segments.next().unwrap_or("");
    let (name, value) = first.split_once('=').ok_or(MalformedCookieError::MissingPair)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(MalformedCookieError::EmptyName);
    }

    let mut options = BTreeMap::new();
    for segment in segments {
        if segment.trim().is_empty() {
            continue;
        }
        let (key, attr_value) = segment.split_once('=').unwrap_or((segment, ""));
        let key = canonical_attribute(key);
        if key.is_empty() {
            continue;
        }
        options.entry(key).or_insert_with(|| attr_value.trim().to_string());
    }

    Ok(CookieEntry {
        name: name.to_string(),
        value: value.trim().to_string(),
        options,
    })
}

/// Map a wire-format attribute name to its canonical camelCase option name.
///
/// Attribute names are case- and surrounding-space-insensitive on the wire.
/// The known names go through an explicit table; anything else falls back to
/// lowercasing and merging hyphen-word boundaries.
pub fn canonical_attribute(raw: &str) -> String {
    let key = raw.trim().to_ascii_lowercase();
    match key.as_str() {
        "domain" => "domain".to_string(),
        "path" => "path".to_string(),
        "expires" => "expires".to_string(),
        "secure" => "secure".to_string(),
        "max-age" => "maxAge".to_string(),
        "httponly" | "http-only" => "httpOnly".to_string(),
        "samesite" | "same-site" => "sameSite".to_string(),
        _ => camelize(&key),
    }
}

fn camelize(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for ch in key.chars() {
        if ch == '-' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}
