use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use tracing::{debug, warn};

use crate::claims::{timestamp, RawClaims, ValidatedClaims};
use crate::error::ValidationFailure;
use crate::jwks::KeySet;

/// What the caller expects the ID token to assert.
#[derive(Debug, Clone)]
pub struct Expectations {
    /// Nonce bound to the login attempt.
    pub nonce: String,
    /// Issuer from the provider metadata.
    pub issuer: String,
    /// Client id of this relying party.
    pub audience: String,
    /// Algorithms accepted for the signature. Empty rejects everything.
    pub allowed_algorithms: Vec<Algorithm>,
    /// Tolerated clock skew for `iat`, in seconds (default: 60)
    pub iat_leeway_secs: u64,
}

impl Expectations {
    pub fn new(
        nonce: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            nonce: nonce.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            allowed_algorithms: vec![Algorithm::RS256],
            iat_leeway_secs: 60,
        }
    }

    pub fn with_allowed_algorithms(
        mut self,
        algorithms: impl IntoIterator<Item = Algorithm>,
    ) -> Self {
        self.allowed_algorithms = algorithms.into_iter().collect();
        self
    }

    pub fn with_iat_leeway(mut self, secs: u64) -> Self {
        self.iat_leeway_secs = secs;
        self
    }
}

/// Read the `kid` from a token header without verifying anything.
///
/// Used to pick which key set to load before calling [`validate`].
pub fn peek_kid(id_token: &str) -> Result<Option<String>, ValidationFailure> {
    decode_header(id_token)
        .map(|header| header.kid)
        .map_err(|_| ValidationFailure::Malformed)
}

/// Validate a raw ID token.
///
/// Checks run in a fixed order and stop at the first failure: structure,
/// signature, issuer, audience, expiry, nonce.
pub fn validate(
    id_token: &str,
    keys: &KeySet,
    expected: &Expectations,
    now: DateTime<Utc>,
) -> Result<ValidatedClaims, ValidationFailure> {
    let claims = verify_signature(id_token, keys, &expected.allowed_algorithms)
        .inspect_err(|failure| warn!(kind = failure.kind(), "ID token rejected"))?;
    check_claims(claims, expected, now)
        .inspect_err(|failure| warn!(kind = failure.kind(), "ID token rejected"))
}

fn verify_signature(
    id_token: &str,
    keys: &KeySet,
    allowed: &[Algorithm],
) -> Result<RawClaims, ValidationFailure> {
    if id_token.split('.').count() != 3 {
        return Err(ValidationFailure::Malformed);
    }
    let header = decode_header(id_token).map_err(|_| ValidationFailure::Malformed)?;
    debug!(algorithm = ?header.alg, kid = ?header.kid, "Decoded ID token header");

    if !allowed.contains(&header.alg) {
        return Err(ValidationFailure::BadSignature);
    }
    let key = keys
        .get(header.kid.as_deref())
        .ok_or(ValidationFailure::BadSignature)?;

    // Signature only; every claim is checked below in a fixed order.
    let mut validation = Validation::new(header.alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation.leeway = 0;

    let data = decode::<serde_json::Value>(id_token, key, &validation).map_err(|e| {
        match e.kind() {
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => ValidationFailure::Malformed,
            _ => ValidationFailure::BadSignature,
        }
    })?;

    serde_json::from_value(data.claims).map_err(|_| ValidationFailure::Malformed)
}

fn check_claims(
    raw: RawClaims,
    expected: &Expectations,
    now: DateTime<Utc>,
) -> Result<ValidatedClaims, ValidationFailure> {
    if raw.iss != expected.issuer {
        return Err(ValidationFailure::IssuerMismatch);
    }
    if !raw.aud.iter().any(|aud| aud == &expected.audience) {
        return Err(ValidationFailure::AudienceMismatch);
    }

    let expiry = timestamp(raw.exp).ok_or(ValidationFailure::Malformed)?;
    let issued_at = timestamp(raw.iat).ok_or(ValidationFailure::Malformed)?;
    let leeway = i64::try_from(expected.iat_leeway_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX);
    if expiry <= now {
        return Err(ValidationFailure::TokenExpired);
    }
    if issued_at > now.checked_add_signed(leeway).unwrap_or(DateTime::<Utc>::MAX_UTC) {
        return Err(ValidationFailure::TokenExpired);
    }

    let nonce = match raw.nonce {
        Some(nonce) if nonce == expected.nonce => nonce,
        _ => return Err(ValidationFailure::NonceMismatch),
    };

    debug!(sub = %raw.sub, "ID token validated");
    Ok(ValidatedClaims {
        subject: raw.sub,
        issuer: raw.iss,
        audience: raw.aud,
        expiry,
        issued_at,
        nonce,
        email: raw.email,
        email_verified: raw.email_verified,
        name: raw.name,
        picture: raw.picture,
        given_name: raw.given_name,
        family_name: raw.family_name,
        extra: raw.extra,
    })
}
