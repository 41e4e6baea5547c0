use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use oidc_rp_security::{validate, Expectations, KeySet, ValidationFailure};
use serde_json::{json, Value};

const TEST_SECRET: &[u8] = b"oidc-rp-test-secret-do-not-use-in-production";
const ISSUER: &str = "https://accounts.example.com";
const CLIENT_ID: &str = "client-123";
const NONCE: &str = "abc123";
const NOW: i64 = 1_700_000_000;

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(NOW, 0).unwrap()
}

fn keys() -> KeySet {
    KeySet::from_static(DecodingKey::from_secret(TEST_SECRET))
}

fn expectations() -> Expectations {
    Expectations::new(NONCE, ISSUER, CLIENT_ID).with_allowed_algorithms([Algorithm::HS256])
}

fn claims() -> Value {
    json!({
        "iss": ISSUER,
        "sub": "user-42",
        "aud": CLIENT_ID,
        "exp": NOW + 300,
        "iat": NOW - 5,
        "nonce": NONCE,
        "email": "ada@example.com",
        "email_verified": true,
        "name": "Ada Lovelace",
        "picture": "https://example.com/ada.png",
        "hd": "example.com",
    })
}

fn sign(claims: &Value) -> String {
    sign_with(Header::new(Algorithm::HS256), claims, TEST_SECRET)
}

fn sign_with(header: Header, claims: &Value, secret: &[u8]) -> String {
    encode(&header, claims, &EncodingKey::from_secret(secret)).unwrap()
}

fn with(mut claims: Value, key: &str, value: Value) -> Value {
    claims[key] = value;
    claims
}

fn without(mut claims: Value, key: &str) -> Value {
    claims.as_object_mut().unwrap().remove(key);
    claims
}

fn check(token: &str) -> Result<oidc_rp_security::ValidatedClaims, ValidationFailure> {
    validate(token, &keys(), &expectations(), now())
}

// ── Success ──

#[test]
fn valid_token_yields_typed_claims() {
    let claims = check(&sign(&claims())).unwrap();
    assert_eq!(claims.subject, "user-42");
    assert_eq!(claims.issuer, ISSUER);
    assert_eq!(claims.audience, vec![CLIENT_ID.to_string()]);
    assert_eq!(claims.nonce, NONCE);
    assert_eq!(claims.email.as_deref(), Some("ada@example.com"));
    assert_eq!(claims.email_verified, Some(true));
    assert_eq!(claims.name.as_deref(), Some("Ada Lovelace"));
    assert_eq!(claims.expiry.timestamp(), NOW + 300);
    assert_eq!(claims.extra.get("hd"), Some(&json!("example.com")));
}

#[test]
fn audience_array_containing_client_is_accepted() {
    let token = sign(&with(claims(), "aud", json!(["other", CLIENT_ID])));
    assert!(check(&token).is_ok());
}

#[test]
fn iat_within_leeway_is_accepted() {
    let token = sign(&with(claims(), "iat", json!(NOW + 30)));
    assert!(check(&token).is_ok());
}

#[test]
fn expiry_relative_to_supplied_now() {
    let token = sign(&with(claims(), "exp", json!(NOW + 300)));
    assert!(check(&token).is_ok());

    let token = sign(&with(claims(), "exp", json!(NOW - 10)));
    assert_eq!(check(&token).unwrap_err(), ValidationFailure::TokenExpired);
}

// ── Each failure in isolation ──

#[test]
fn garbage_is_malformed() {
    assert_eq!(check("not-a-jwt").unwrap_err(), ValidationFailure::Malformed);
    assert_eq!(check("a.b").unwrap_err(), ValidationFailure::Malformed);
    assert_eq!(check("!!!.???.***").unwrap_err(), ValidationFailure::Malformed);
}

#[test]
fn missing_required_claim_is_malformed() {
    let token = sign(&without(claims(), "sub"));
    assert_eq!(check(&token).unwrap_err(), ValidationFailure::Malformed);
}

#[test]
fn wrong_key_is_bad_signature() {
    let token = sign_with(Header::new(Algorithm::HS256), &claims(), b"some-other-secret");
    assert_eq!(check(&token).unwrap_err(), ValidationFailure::BadSignature);
}

#[test]
fn tampered_payload_is_bad_signature() {
    let token = sign(&claims());
    let forged = sign(&with(claims(), "sub", json!("admin")));
    let parts: Vec<&str> = token.split('.').collect();
    let forged_parts: Vec<&str> = forged.split('.').collect();
    let spliced = format!("{}.{}.{}", parts[0], forged_parts[1], parts[2]);
    assert_eq!(check(&spliced).unwrap_err(), ValidationFailure::BadSignature);
}

#[test]
fn disallowed_algorithm_is_bad_signature() {
    let token = sign_with(Header::new(Algorithm::HS384), &claims(), TEST_SECRET);
    assert_eq!(check(&token).unwrap_err(), ValidationFailure::BadSignature);
}

#[test]
fn empty_algorithm_list_rejects_everything() {
    let expected = Expectations::new(NONCE, ISSUER, CLIENT_ID).with_allowed_algorithms(Vec::<Algorithm>::new());
    let result = validate(&sign(&claims()), &keys(), &expected, now());
    assert_eq!(result.unwrap_err(), ValidationFailure::BadSignature);
}

#[test]
fn unknown_kid_is_bad_signature() {
    let mut map = HashMap::new();
    map.insert("key-1".to_string(), DecodingKey::from_secret(TEST_SECRET));
    let set = KeySet::Jwks(Arc::new(map));

    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("key-2".into());
    let token = sign_with(header, &claims(), TEST_SECRET);
    let result = validate(&token, &set, &expectations(), now());
    assert_eq!(result.unwrap_err(), ValidationFailure::BadSignature);

    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("key-1".into());
    let token = sign_with(header, &claims(), TEST_SECRET);
    assert!(validate(&token, &set, &expectations(), now()).is_ok());
}

#[test]
fn issuer_mismatch() {
    let token = sign(&with(claims(), "iss", json!("https://evil.example.com")));
    assert_eq!(check(&token).unwrap_err(), ValidationFailure::IssuerMismatch);
}

#[test]
fn issuer_comparison_is_exact() {
    let token = sign(&with(claims(), "iss", json!(format!("{ISSUER}/"))));
    assert_eq!(check(&token).unwrap_err(), ValidationFailure::IssuerMismatch);
}

#[test]
fn audience_mismatch() {
    let token = sign(&with(claims(), "aud", json!("someone-else")));
    assert_eq!(check(&token).unwrap_err(), ValidationFailure::AudienceMismatch);

    let token = sign(&with(claims(), "aud", json!(["a", "b"])));
    assert_eq!(check(&token).unwrap_err(), ValidationFailure::AudienceMismatch);
}

#[test]
fn expiry_equal_to_now_is_expired() {
    let token = sign(&with(claims(), "exp", json!(NOW)));
    assert_eq!(check(&token).unwrap_err(), ValidationFailure::TokenExpired);
}

#[test]
fn issued_in_the_future_beyond_leeway_is_rejected() {
    let token = sign(&with(claims(), "iat", json!(NOW + 120)));
    assert_eq!(check(&token).unwrap_err(), ValidationFailure::TokenExpired);
}

#[test]
fn nonce_mismatch() {
    let token = sign(&with(claims(), "nonce", json!("different")));
    assert_eq!(check(&token).unwrap_err(), ValidationFailure::NonceMismatch);
}

#[test]
fn missing_nonce_mismatches() {
    let token = sign(&without(claims(), "nonce"));
    assert_eq!(check(&token).unwrap_err(), ValidationFailure::NonceMismatch);
}

// ── Ordering ──

#[test]
fn signature_is_checked_before_issuer() {
    let bad = with(claims(), "iss", json!("https://evil.example.com"));
    let token = sign_with(Header::new(Algorithm::HS256), &bad, b"wrong");
    assert_eq!(check(&token).unwrap_err(), ValidationFailure::BadSignature);
}

#[test]
fn issuer_is_checked_before_audience_and_expiry() {
    let bad = with(
        with(with(claims(), "iss", json!("x")), "aud", json!("y")),
        "exp",
        json!(NOW - 1),
    );
    assert_eq!(check(&sign(&bad)).unwrap_err(), ValidationFailure::IssuerMismatch);
}

#[test]
fn audience_is_checked_before_expiry() {
    let bad = with(with(claims(), "aud", json!("y")), "exp", json!(NOW - 1));
    assert_eq!(check(&sign(&bad)).unwrap_err(), ValidationFailure::AudienceMismatch);
}

#[test]
fn expiry_is_checked_before_nonce() {
    let bad = with(with(claims(), "nonce", json!("other")), "exp", json!(NOW - 1));
    assert_eq!(check(&sign(&bad)).unwrap_err(), ValidationFailure::TokenExpired);
}

#[test]
fn failure_kinds_are_stable() {
    assert_eq!(ValidationFailure::Malformed.kind(), "malformed");
    assert_eq!(ValidationFailure::BadSignature.kind(), "bad_signature");
    assert_eq!(ValidationFailure::IssuerMismatch.kind(), "issuer_mismatch");
    assert_eq!(ValidationFailure::AudienceMismatch.kind(), "audience_mismatch");
    assert_eq!(ValidationFailure::TokenExpired.kind(), "token_expired");
    assert_eq!(ValidationFailure::NonceMismatch.kind(), "nonce_mismatch");
}

#[test]
fn peek_kid_reads_header_only() {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some("key-9".into());
    let token = sign_with(header, &claims(), b"any-key");
    assert_eq!(oidc_rp_security::peek_kid(&token).unwrap().as_deref(), Some("key-9"));
    assert_eq!(
        oidc_rp_security::peek_kid("garbage").unwrap_err(),
        ValidationFailure::Malformed
    );
}
