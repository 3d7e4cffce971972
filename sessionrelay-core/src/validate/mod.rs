
use http::StatusCode;

use crate::token::{SessionToken, TokenCodec};

#[derive(Debug, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// 205 when zero live entries remain (discard and refetch), 204 when
    /// some remain.
    pub status: StatusCode,
    /// Re-encoded token, present only when entries were pruned, so the
    /// client can replace its stored copy.
    pub refreshed_token: Option<String>,
}

/// Sweep the caller's token for expired entries. A pure local check: no
/// upstream call, no body, just the token the client already presents.
pub fn validate_session(
    codec: &TokenCodec,
    raw_token: Option<&str>,
    now_ms: i64,
) -> ValidationOutcome {
    let mut token = match codec.decode(raw_token) {
        Ok(token) => token,
        Err(err) => {
            tracing::warn!(%err, "unreadable session token, treating as empty");
            SessionToken::default()
        }
    };

    let before = token.len();
    token.retain(|_, entry| match entry.options.expires {
        Some(expires) => expires >= now_ms,
        None => true,
    });

    let refreshed_token = if token.len() == before {
        None
    } else {
        match codec.encode(&token) {
            Ok(opaque) => Some(opaque),
            Err(err) => {
                tracing::error!(%err, "failed to re-encode pruned session token");
                None
            }
        }
    };

    let status = if token.is_empty() {
        StatusCode::RESET_CONTENT
    } else {
        StatusCode::NO_CONTENT
    };

    ValidationOutcome {
        status,
        refreshed_token,
    }
}
