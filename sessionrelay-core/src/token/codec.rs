use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cookie::CookieEntry;

#[derive(Debug, Error)]
pub enum TokenDecodeError {
    #[error("token is not valid url-safe base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("token payload is not a valid session mapping: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
#[error("failed to serialize session token: {0}")]
pub struct TokenEncodeError(#[from] serde_json::Error);

/// The attribute options carried by one session entry.
///
/// Known attributes live in typed fields; anything else survives the round
/// trip through `extra`. `expires` is an absolute timestamp and `maxAge` a
/// duration, both in milliseconds — the wire format's max-age seconds are
/// scaled on the encode path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CookieOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_only: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

/// One name-scoped value plus its options within the token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub value: String,
    pub options: CookieOptions,
}

/// The in-memory form of the opaque client-held token: a mapping of cookie
/// name to session entry. Owned by the client; the relay reconstructs it
/// fresh from the token header on every request and never persists it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(BTreeMap<String, SessionEntry>);

impl SessionToken {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, name: &str) -> Option<&SessionEntry> {
        self.0.get(name)
    }

    /// Inserts an entry, replacing any prior entry of the same name.
    pub fn insert(&mut self, name: String, entry: SessionEntry) {
        self.0.insert(name, entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &SessionEntry)> {
        self.0.iter()
    }

    pub fn retain(&mut self, keep: impl FnMut(&String, &mut SessionEntry) -> bool) {
        self.0.retain(keep);
    }

    /// The `Cookie` header value replayed to the upstream: `name=value`
    /// pairs joined with `"; "`. `None` when the token is empty — an empty
    /// forwarded-cookie header must never be sent.
    pub fn cookie_header(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .0
            .iter()
            .map(|(name, entry)| format!("{name}={}", entry.value))
            .collect();
        Some(pairs.join("; "))
    }
}

/// Derive the domain value substituted into session entries so the token
/// stays valid for calls made to the relay itself: the host portion when a
/// port is present, else the bare hostname with a leading `.`. An optional
/// `scheme://` prefix is stripped first.
pub fn canonical_relay_domain(hostname: &str) -> String {
    let host = hostname.split_once("://").map_or(hostname, |(_, rest)| rest);
    match host.split_once(':') {
        Some((name, _port)) => name.to_string(),
        None => format!(".{host}"),
    }
}

/// Packs batches of parsed cookie entries into the opaque token and back.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    canonical_domain: String,
}

impl TokenCodec {
    pub fn new(hostname: &str) -> Self {
        Self {
            canonical_domain: canonical_relay_domain(hostname),
        }
    }

    pub fn canonical_domain(&self) -> &str {
        &self.canonical_domain
    }

    /// Fold one response's parsed `Set-Cookie` entries into a token,
    /// normalizing each entry's options. Entries sharing a name: last write
    /// wins across the batch (unlike attribute precedence within one
    /// header, which is first-wins).
    pub fn token_from_entries(&self, entries: impl IntoIterator<Item = CookieEntry>) -> SessionToken {
        let mut token = SessionToken::default();
        for entry in entries {
            let options = self.normalize_options(entry.options);
            token.insert(
                entry.name,
                SessionEntry {
                    value: entry.value,
                    options,
                },
            );
        }
        token
    }

    /// Serialize a token to its opaque wire form: JSON bytes, then URL-safe
    /// padding-free base64. The opaque string is the only thing the client
    /// ever sees.
    pub fn encode(&self, token: &SessionToken) -> Result<String, TokenEncodeError> {
        let payload = serde_json::to_vec(token)?;
        Ok(URL_SAFE_NO_PAD.encode(payload))
    }

    /// Reverse of [`encode`](Self::encode). An absent or empty header value
    /// decodes to an empty token; a corrupt one is an error the caller is
    /// expected to degrade to "no session" rather than fail the request on.
    pub fn decode(&self, raw: Option<&str>) -> Result<SessionToken, TokenDecodeError> {
        let Some(raw) = raw else {
            return Ok(SessionToken::default());
        };
        if raw.is_empty() {
            return Ok(SessionToken::default());
        }
        let payload = URL_SAFE_NO_PAD.decode(raw)?;
        Ok(serde_json::from_slice(&payload)?)
    }

    fn normalize_options(&self, raw: BTreeMap<String, String>) -> CookieOptions {
        let mut options = CookieOptions::default();
        for (key, value) in raw {
            match key.as_str() {
                // The upstream's domain would pin the cookie to the wrong
                // origin; the token must stay valid for the relay's own.
                "domain" => options.domain = Some(self.canonical_domain.clone()),
                "path" => options.path = Some(value),
                "expires" => match httpdate::parse_http_date(&value) {
                    Ok(when) => options.expires = Some(epoch_millis(when)),
                    Err(err) => {
                        tracing::warn!(%err, value = %value, "dropping unparseable expires attribute");
                    }
                },
                "maxAge" => match value.parse::<i64>() {
                    Ok(seconds) => options.max_age = Some(seconds * 1000),
                    Err(err) => {
                        tracing::warn!(%err, value = %value, "dropping unparseable max-age attribute");
                    }
                },
                "httpOnly" => options.http_only = Some(value),
                "secure" => options.secure = Some(value),
                "sameSite" => options.same_site = Some(value),
                _ => {
                    options.extra.insert(key, value);
                }
            }
        }
        options
    }
}

fn epoch_millis(when: SystemTime) -> i64 {
    match when.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_millis() as i64,
        Err(before) => -(before.duration().as_millis() as i64),
    }
}
