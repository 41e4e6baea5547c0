/// Why an ID token was rejected.
///
/// Variants carry no token material so they are safe to log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    /// Not a compact JWS, unreadable header, or claims missing required fields.
    Malformed,
    /// Disallowed algorithm, no key for the `kid`, or the signature does not verify.
    BadSignature,
    /// `iss` differs from the provider's issuer.
    IssuerMismatch,
    /// `aud` does not contain the client id.
    AudienceMismatch,
    /// `exp` is not in the future, or `iat` is too far in the future.
    TokenExpired,
    /// `nonce` is absent or differs from the one bound to the session.
    NonceMismatch,
}

impl ValidationFailure {
    /// Stable identifier for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationFailure::Malformed => "malformed",
            ValidationFailure::BadSignature => "bad_signature",
            ValidationFailure::IssuerMismatch => "issuer_mismatch",
            ValidationFailure::AudienceMismatch => "audience_mismatch",
            ValidationFailure::TokenExpired => "token_expired",
            ValidationFailure::NonceMismatch => "nonce_mismatch",
        }
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationFailure::Malformed => write!(f, "ID token is malformed"),
            ValidationFailure::BadSignature => write!(f, "ID token signature is invalid"),
            ValidationFailure::IssuerMismatch => write!(f, "ID token issuer mismatch"),
            ValidationFailure::AudienceMismatch => write!(f, "ID token audience mismatch"),
            ValidationFailure::TokenExpired => write!(f, "ID token expired"),
            ValidationFailure::NonceMismatch => write!(f, "ID token nonce mismatch"),
        }
    }
}

impl std::error::Error for ValidationFailure {}

/// Errors raised while loading the provider's signing keys.
#[derive(Debug)]
pub enum JwksError {
    /// The JWKS endpoint could not be reached or answered with an error status.
    Fetch(String),
    /// The JWKS document could not be parsed.
    Parse(String),
    /// No key set has been loaded yet and a refresh is currently rate-limited.
    NotLoaded,
}

impl std::fmt::Display for JwksError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwksError::Fetch(msg) => write!(f, "JWKS fetch error: {msg}"),
            JwksError::Parse(msg) => write!(f, "Failed to parse JWKS: {msg}"),
            JwksError::NotLoaded => write!(f, "JWKS not loaded yet"),
        }
    }
}

impl std::error::Error for JwksError {}
