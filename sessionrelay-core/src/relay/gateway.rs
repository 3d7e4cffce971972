use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use http::{Method, StatusCode, header};
use pingora::prelude::*;
use pingora::{Custom, Error};
use pingora_http::ResponseHeader;
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::headers::{
    SESSION_TOKEN_REQUEST_HEADER, SESSION_TOKEN_RESPONSE_HEADER, STATUS_PAGE_BODY, VALIDATE_PATH,
};
use crate::relay::client::UpstreamClient;
use crate::relay::engine::{RelayEngine, RelayOutcome, RelayRequest};
use crate::token::{SessionToken, TokenCodec};
use crate::validate::validate_session;

/// Where one inbound request is handled.
#[derive(Debug, PartialEq, Eq)]
pub enum RouteDecision {
    /// Local expiry sweep over the caller's token.
    Validate,
    /// Direct (same-origin) call to `/`.
    StatusPage,
    /// Direct call to anything else local.
    NotFound,
    /// Forward to the upstream origin.
    Relay,
}

/// A request with no `Referer`, or one whose `Referer` matches the relay's
/// own hostname, is a direct call to the relay itself and is never
/// forwarded — forwarding it would relay the relay.
pub(crate) fn decide_route(
    method: &Method,
    path: &str,
    referer: Option<&str>,
    hostname: &str,
) -> RouteDecision {
    if method == Method::GET && path == VALIDATE_PATH {
        return RouteDecision::Validate;
    }

    let same_origin = match referer {
        None => true,
        Some(referer) => referer.contains(hostname),
    };
    if !same_origin {
        return RouteDecision::Relay;
    }

    if method == Method::GET && path == "/" {
        RouteDecision::StatusPage
    } else {
        RouteDecision::NotFound
    }
}

/// The relay's request-interception step, on pingora's `ProxyHttp` hooks.
/// Every request is answered inside `request_filter`: the upstream leg goes
/// through the engine's own HTTP client because the relay buffers and
/// re-wraps upstream bodies instead of streaming them.
pub struct RelayGateway {
    hostname: String,
    codec: TokenCodec,
    engine: RelayEngine,
}

impl RelayGateway {
    pub fn new(config: &RelayConfig, client: Arc<dyn UpstreamClient>) -> Self {
        let codec = TokenCodec::new(&config.server.hostname);
        let engine = RelayEngine::new(config.upstream_origin(), codec.clone(), client);
        Self {
            hostname: config.server.hostname.clone(),
            codec,
            engine,
        }
    }
}

#[async_trait]
impl ProxyHttp for RelayGateway {
    type CTX = ();

    fn new_ctx(&self) -> Self::CTX {}

    async fn upstream_peer(
        &self,
        _session: &mut Session,
        _ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        // request_filter answers every request; this hook is unreachable.
        Err(Error::new(Custom("sessionrelay never proxies via pingora")))
    }

    /// ACCEPT --> DECIDE --> (LOCAL RESPONSE | FORWARD)
    async fn request_filter(&self, session: &mut Session, _ctx: &mut Self::CTX) -> Result<bool> {
        let (method, path, path_and_query, referer, raw_token) = {
            let req = session.req_header();
            let method = req.method.clone();
            let path = req.uri.path().to_string();
            let path_and_query = req
                .uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string());
            let referer = req
                .headers
                .get(header::REFERER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let raw_token = req
                .headers
                .get(SESSION_TOKEN_REQUEST_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            (method, path, path_and_query, referer, raw_token)
        };

        match decide_route(&method, &path, referer.as_deref(), &self.hostname) {
            RouteDecision::Validate => {
                self.handle_validate(session, raw_token.as_deref()).await?;
            }

            RouteDecision::StatusPage => {
                tracing::debug!("direct call is not forwarded");
                self.send_text(session, StatusCode::OK, STATUS_PAGE_BODY)
                    .await?;
            }

            RouteDecision::NotFound => {
                tracing::debug!(path = %path, "direct call is not forwarded");
                self.send_empty(session, StatusCode::NOT_FOUND, None).await?;
            }

            RouteDecision::Relay => {
                let request_id = Uuid::new_v4();
                tracing::debug!(
                    %request_id,
                    referer = referer.as_deref(),
                    path = %path_and_query,
                    "forwarding request"
                );

                let body = read_request_body(session).await?;
                let token = match self.codec.decode(raw_token.as_deref()) {
                    Ok(token) => token,
                    Err(err) => {
                        // A corrupt or forged token degrades to "no session";
                        // it never hard-fails the request.
                        tracing::warn!(%request_id, %err, "unreadable session token");
                        SessionToken::default()
                    }
                };

                let outcome = self
                    .engine
                    .relay(RelayRequest {
                        method,
                        path_and_query,
                        token,
                        body,
                    })
                    .await;

                self.write_outcome(session, &request_id, outcome).await?;
            }
        }

        Ok(true)
    }
}

impl RelayGateway {
    async fn handle_validate(&self, session: &mut Session, raw_token: Option<&str>) -> Result<()> {
        let outcome = validate_session(&self.codec, raw_token, Utc::now().timestamp_millis());
        self.send_empty(session, outcome.status, outcome.refreshed_token.as_deref())
            .await
    }

    async fn write_outcome(
        &self,
        session: &mut Session,
        request_id: &Uuid,
        outcome: RelayOutcome,
    ) -> Result<()> {
        match outcome {
            RelayOutcome::Success { envelope, token } => {
                tracing::debug!(%request_id, "success response from upstream");
                let body = serde_json::to_vec(&envelope)
                    .map_err(|_| Error::new(Custom("envelope serialization failed")))?;
                self.send_json(session, StatusCode::OK, token.as_deref(), body)
                    .await
            }

            RelayOutcome::UpstreamError {
                status,
                envelope,
                token,
            } => {
                tracing::debug!(%request_id, status = status.as_u16(), "error response from upstream");
                let body = serde_json::to_vec(&envelope)
                    .map_err(|_| Error::new(Custom("envelope serialization failed")))?;
                self.send_json(session, status, token.as_deref(), body).await
            }

            RelayOutcome::Transport(err) => {
                tracing::error!(%request_id, %err, "local forwarding failure");
                self.send_empty(session, StatusCode::BAD_GATEWAY, None).await
            }
        }
    }

    async fn send_json(
        &self,
        session: &mut Session,
        status: StatusCode,
        token: Option<&str>,
        body: Vec<u8>,
    ) -> Result<()> {
        let mut resp = ResponseHeader::build(status, None)?;
        resp.insert_header(header::CONTENT_TYPE, "application/json")?;
        resp.insert_header(header::CONTENT_LENGTH, body.len().to_string())?;
        resp.insert_header(header::ACCESS_CONTROL_EXPOSE_HEADERS, "*")?;
        if let Some(token) = token {
            resp.insert_header(SESSION_TOKEN_RESPONSE_HEADER, token)?;
        }

        session.write_response_header(Box::new(resp), false).await?;
        session.write_response_body(Some(body.into()), true).await?;

        Ok(())
    }

    async fn send_text(&self, session: &mut Session, status: StatusCode, body: &str) -> Result<()> {
        let mut resp = ResponseHeader::build(status, None)?;
        resp.insert_header(header::CONTENT_TYPE, "text/plain; charset=utf-8")?;
        resp.insert_header(header::CONTENT_LENGTH, body.len().to_string())?;
        resp.insert_header(header::ACCESS_CONTROL_EXPOSE_HEADERS, "*")?;

        session.write_response_header(Box::new(resp), false).await?;
        session
            .write_response_body(Some(Bytes::copy_from_slice(body.as_bytes())), true)
            .await?;

        Ok(())
    }

    async fn send_empty(
        &self,
        session: &mut Session,
        status: StatusCode,
        token: Option<&str>,
    ) -> Result<()> {
        let mut resp = ResponseHeader::build(status, None)?;
        resp.insert_header(header::CONTENT_LENGTH, "0")?;
        resp.insert_header(header::ACCESS_CONTROL_EXPOSE_HEADERS, "*")?;
        if let Some(token) = token {
            resp.insert_header(SESSION_TOKEN_RESPONSE_HEADER, token)?;
        }

        session.write_response_header(Box::new(resp), true).await?;

        Ok(())
    }
}

async fn read_request_body(session: &mut Session) -> Result<Bytes> {
    let mut body = Vec::new();
    while let Some(chunk) = session.read_request_body().await? {
        body.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(body))
}
