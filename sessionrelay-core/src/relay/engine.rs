use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, header};
use serde::Serialize;
use serde_json::Value;

use crate::cookie::parse_set_cookie;
use crate::relay::client::{TransportError, UpstreamClient, UpstreamRequest, UpstreamResponse};
use crate::token::{SessionToken, TokenCodec};

/// One inbound request as the engine sees it: everything is taken verbatim
/// from the client except the token, which the gateway has already decoded.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub method: Method,
    pub path_and_query: String,
    pub token: SessionToken,
    pub body: Bytes,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ForwardedResponse {
    pub head: BTreeMap<String, String>,
    pub body: Value,
    pub status: u16,
}

/// The response envelope shipped to the caller.
#[derive(Debug, Serialize, PartialEq)]
pub struct ForwardEnvelope {
    pub from: String,
    pub forward: ForwardedResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Exactly one of these is produced per relay call and fully determines the
/// HTTP response sent to the caller.
#[derive(Debug)]
pub enum RelayOutcome {
    /// Upstream answered 2xx: relayed as 200.
    Success {
        envelope: ForwardEnvelope,
        token: Option<String>,
    },
    /// Upstream answered with an error status: relayed with that exact
    /// status, cookie re-encoding attempted the same as on success.
    UpstreamError {
        status: StatusCode,
        envelope: ForwardEnvelope,
        token: Option<String>,
    },
    /// No response obtained; no partial cookie relaying is attempted.
    Transport(TransportError),
}

pub struct RelayEngine {
    origin: String,
    codec: TokenCodec,
    client: Arc<dyn UpstreamClient>,
}

impl RelayEngine {
    pub fn new(origin: impl Into<String>, codec: TokenCodec, client: Arc<dyn UpstreamClient>) -> Self {
        let origin = origin.into().trim_end_matches('/').to_string();
        Self {
            origin,
            codec,
            client,
        }
    }

    /// Forward one request to the upstream origin and fold the result.
    pub async fn relay(&self, request: RelayRequest) -> RelayOutcome {
        let url = format!("{}{}", self.origin, request.path_and_query);
        let cookie = request.token.cookie_header();

        // A read-only GET never carries a forwarded body.
        let is_get = request.method.as_str().eq_ignore_ascii_case("GET");
        let body = (!request.body.is_empty() && !is_get).then(|| request.body.clone());

        if let Some(forwarded) = &cookie {
            let count = forwarded.split("; ").count();
            tracing::debug!(count, "forwarding session cookies to upstream");
        }

        let upstream_request = UpstreamRequest {
            method: request.method.clone(),
            url: url.clone(),
            cookie: cookie.clone(),
            body,
        };

        let response = match self.client.send(upstream_request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(%err, url = %url, "no response from upstream");
                return RelayOutcome::Transport(err);
            }
        };

        let token = self.encode_set_cookies(&response);
        let body_value = parse_body(&response.body);

        let data = if response.status.is_success() {
            self.fetch_secondary(&body_value, cookie.as_deref()).await
        } else {
            None
        };

        let status = response.status;
        let envelope = ForwardEnvelope {
            from: url,
            forward: ForwardedResponse {
                head: header_map(&response.headers),
                body: body_value,
                status: status.as_u16(),
            },
            data,
        };

        if status.is_success() {
            RelayOutcome::Success { envelope, token }
        } else {
            tracing::warn!(status = status.as_u16(), "error response from upstream");
            RelayOutcome::UpstreamError {
                status,
                envelope,
                token,
            }
        }
    }

    /// Re-encode the response's `Set-Cookie` headers into a fresh opaque
    /// token. A single malformed header is skipped, never fatal. `None` when
    /// the response set no cookie-equivalent state at all.
    fn encode_set_cookies(&self, response: &UpstreamResponse) -> Option<String> {
        let mut entries = Vec::new();
        let mut saw_any = false;

        for value in response.headers.get_all(header::SET_COOKIE) {
            saw_any = true;
            let Ok(raw) = value.to_str() else {
                tracing::warn!("skipping non-utf8 set-cookie header");
                continue;
            };
            match parse_set_cookie(raw) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    tracing::warn!(%err, raw = %raw, "skipping malformed set-cookie header");
                }
            }
        }

        if !saw_any {
            return None;
        }

        let token = self.codec.token_from_entries(entries);
        match self.codec.encode(&token) {
            Ok(opaque) => Some(opaque),
            Err(err) => {
                tracing::error!(%err, "failed to encode session token");
                None
            }
        }
    }

    /// One best-effort fetch of the secondary resource a success body points
    /// at via its `link` field. Failures are logged and swallowed; they must
    /// not turn an otherwise-successful relay into an error.
    async fn fetch_secondary(&self, body: &Value, cookie: Option<&str>) -> Option<Value> {
        let link = body.get("link")?.as_str()?;
        let url = if link.starts_with("http://") || link.starts_with("https://") {
            link.to_string()
        } else {
            format!("{}{}", self.origin, link)
        };

        let request = UpstreamRequest {
            method: Method::GET,
            url: url.clone(),
            cookie: cookie.map(str::to_owned),
            body: None,
        };

        match self.client.send(request).await {
            Ok(response) if response.status.is_success() => Some(parse_body(&response.body)),
            Ok(response) => {
                tracing::warn!(
                    url = %url,
                    status = response.status.as_u16(),
                    "secondary resource fetch failed"
                );
                None
            }
            Err(err) => {
                tracing::warn!(%err, url = %url, "secondary resource fetch failed");
                None
            }
        }
    }
}

/// Upstream bodies are relayed as JSON when they parse, verbatim text
/// otherwise.
fn parse_body(body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    map
}
