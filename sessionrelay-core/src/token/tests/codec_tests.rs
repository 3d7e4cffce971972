use crate::cookie::parse_set_cookie;
use crate::token::{
    CookieOptions, SessionEntry, SessionToken, TokenCodec, TokenDecodeError, canonical_relay_domain,
};
use pretty_assertions::assert_eq;

fn codec() -> TokenCodec {
    TokenCodec::new("relay.example.com")
}

fn entry(value: &str, options: CookieOptions) -> SessionEntry {
    SessionEntry {
        value: value.to_string(),
        options,
    }
}

//-----------------------------------------------------------------------------
// Canonical relay domain
//-----------------------------------------------------------------------------
#[test]
fn bare_hostname_gets_leading_dot() {
    assert_eq!(canonical_relay_domain("relay.example.com"), ".relay.example.com");
}

#[test]
fn hostname_with_port_keeps_host_only() {
    assert_eq!(canonical_relay_domain("localhost:9001"), "localhost");
}

#[test]
fn scheme_prefix_is_stripped() {
    assert_eq!(canonical_relay_domain("https://relay.example.com"), ".relay.example.com");
    assert_eq!(canonical_relay_domain("http://localhost:9001"), "localhost");
}

//-----------------------------------------------------------------------------
// Encode-path normalization
//-----------------------------------------------------------------------------
#[test]
fn domain_is_replaced_with_canonical_relay_domain() {
    let codec = codec();
    let parsed = parse_set_cookie("sid=x; Domain=.upstream.example.org").unwrap();

    let token = codec.token_from_entries([parsed]);

    assert_eq!(
        token.get("sid").unwrap().options.domain.as_deref(),
        Some(".relay.example.com")
    );
}

#[test]
fn max_age_is_scaled_to_milliseconds() {
    let codec = codec();
    let parsed = parse_set_cookie("sid=x; Max-Age=60").unwrap();

    let token = codec.token_from_entries([parsed]);

    assert_eq!(token.get("sid").unwrap().options.max_age, Some(60_000));
}

#[test]
fn expires_becomes_epoch_milliseconds() {
    let codec = codec();
    let parsed = parse_set_cookie("sid=x; Expires=Wed, 21 Oct 2015 07:28:00 GMT").unwrap();

    let token = codec.token_from_entries([parsed]);

    assert_eq!(
        token.get("sid").unwrap().options.expires,
        Some(1_445_412_480_000)
    );
}

#[test]
fn unparseable_expires_and_max_age_are_dropped() {
    let codec = codec();
    let parsed = parse_set_cookie("sid=x; Expires=soon; Max-Age=later").unwrap();

    let token = codec.token_from_entries([parsed]);

    let options = &token.get("sid").unwrap().options;
    assert_eq!(options.expires, None);
    assert_eq!(options.max_age, None);
}

#[test]
fn unknown_attributes_survive_in_extra() {
    let codec = codec();
    let parsed = parse_set_cookie("sid=x; Priority=High").unwrap();

    let token = codec.token_from_entries([parsed]);

    assert_eq!(
        token.get("sid").unwrap().options.extra.get("priority"),
        Some(&"High".to_string())
    );
}

#[test]
fn last_entry_wins_for_duplicate_cookie_names() {
    let codec = codec();
    let first = parse_set_cookie("sid=old").unwrap();
    let second = parse_set_cookie("sid=new; Path=/").unwrap();

    let token = codec.token_from_entries([first, second]);

    assert_eq!(token.len(), 1);
    assert_eq!(token.get("sid").unwrap().value, "new");
}

//-----------------------------------------------------------------------------
// Round trip
//-----------------------------------------------------------------------------
#[test]
fn round_trip_preserves_names_values_and_options() {
    let codec = codec();
    let raw = [
        "sid=abc123; Domain=.upstream.example.org; Path=/api; Max-Age=60; HttpOnly",
        "theme=dark; Expires=Wed, 21 Oct 2015 07:28:00 GMT; SameSite=Lax",
    ];
    let parsed: Vec<_> = raw.iter().map(|h| parse_set_cookie(h).unwrap()).collect();
    let token = codec.token_from_entries(parsed);

    let opaque = codec.encode(&token).unwrap();
    let decoded = codec.decode(Some(&opaque)).unwrap();

    assert_eq!(decoded, token);
}

#[test]
fn opaque_form_is_url_safe_and_unpadded() {
    let codec = codec();
    let parsed = parse_set_cookie("sid=x?>; Path=/a/b").unwrap();
    let token = codec.token_from_entries([parsed]);

    let opaque = codec.encode(&token).unwrap();

    assert!(
        opaque
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
        "unexpected character in {opaque:?}"
    );
}

#[test]
fn empty_token_round_trips_to_empty() {
    let codec = codec();

    let opaque = codec.encode(&SessionToken::default()).unwrap();
    let decoded = codec.decode(Some(&opaque)).unwrap();

    assert!(decoded.is_empty());
}

//-----------------------------------------------------------------------------
// Decode leniency and failure
//-----------------------------------------------------------------------------
#[test]
fn absent_and_empty_tokens_decode_to_empty() {
    let codec = codec();

    assert_eq!(codec.decode(None).unwrap(), SessionToken::default());
    assert_eq!(codec.decode(Some("")).unwrap(), SessionToken::default());
}

#[test]
fn corrupt_base64_is_an_encoding_error() {
    let result = codec().decode(Some("%%%not-base64%%%"));

    assert!(matches!(result, Err(TokenDecodeError::Encoding(_))));
}

#[test]
fn valid_base64_of_garbage_is_a_json_error() {
    use base64::Engine;
    let opaque = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"not json");

    let result = codec().decode(Some(&opaque));

    assert!(matches!(result, Err(TokenDecodeError::Json(_))));
}

//-----------------------------------------------------------------------------
// Cookie header reconstruction
//-----------------------------------------------------------------------------
#[test]
fn cookie_header_joins_entries() {
    let mut token = SessionToken::default();
    token.insert("a".to_string(), entry("1", CookieOptions::default()));
    token.insert("b".to_string(), entry("2", CookieOptions::default()));

    assert_eq!(token.cookie_header().as_deref(), Some("a=1; b=2"));
}

#[test]
fn empty_token_has_no_cookie_header() {
    assert_eq!(SessionToken::default().cookie_header(), None);
}
