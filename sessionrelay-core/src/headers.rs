//! Header names and fixed paths of the relay's client-facing protocol.

/// Request header carrying the opaque session token. The bare token is the
/// whole header value; no scheme prefix.
pub const SESSION_TOKEN_REQUEST_HEADER: &str = "authorization";

/// Response header carrying a fresh opaque token. Deliberately not
/// `Set-Cookie`: the browser would subject that name to third-party cookie
/// policy, which is exactly what the token exists to route around.
pub const SESSION_TOKEN_RESPONSE_HEADER: &str = "x-set-authorization";

/// Path of the local expiry-sweep endpoint. Served by the relay itself,
/// never forwarded.
pub const VALIDATE_PATH: &str = "/validate";

/// Body of the status page served on direct (same-origin) calls to `/`.
pub const STATUS_PAGE_BODY: &str = "sessionrelay is live";
