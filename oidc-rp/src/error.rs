use oidc_rp_core::HttpError;
use oidc_rp_security::ValidationFailure;

/// Why a login could not start or complete.
///
/// Detail strings describe transport or parse problems only; they never
/// contain tokens, codes or claim values.
#[derive(Debug)]
pub enum AuthError {
    /// Discovery document or signing keys could not be loaded.
    MetadataUnavailable(String),
    /// The session backend failed.
    SessionUnavailable(String),
    /// The provider redirected back with `error`, or without a code.
    CallbackError(String),
    /// The code exchange was rejected or returned an unusable body.
    TokenExchangeFailed(String),
    /// No pending login attempt was bound to the session.
    MissingNonce,
    /// The ID token failed validation.
    Validation(ValidationFailure),
}

impl AuthError {
    /// Stable identifier for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MetadataUnavailable(_) => "metadata_unavailable",
            AuthError::SessionUnavailable(_) => "session_unavailable",
            AuthError::CallbackError(_) => "callback_error",
            AuthError::TokenExchangeFailed(_) => "token_exchange_failed",
            AuthError::MissingNonce => "missing_nonce",
            AuthError::Validation(failure) => failure.kind(),
        }
    }

    /// Text safe to show to the browser.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::MetadataUnavailable(_) | AuthError::SessionUnavailable(_) => {
                "Authentication temporarily unavailable"
            }
            _ => "Authentication failed",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MetadataUnavailable(msg) => write!(f, "Provider metadata unavailable: {msg}"),
            AuthError::SessionUnavailable(msg) => write!(f, "Session unavailable: {msg}"),
            AuthError::CallbackError(msg) => write!(f, "Provider callback error: {msg}"),
            AuthError::TokenExchangeFailed(msg) => write!(f, "Token exchange failed: {msg}"),
            AuthError::MissingNonce => write!(f, "No pending login attempt for this session"),
            AuthError::Validation(failure) => write!(f, "{failure}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<ValidationFailure> for AuthError {
    fn from(failure: ValidationFailure) -> Self {
        AuthError::Validation(failure)
    }
}

impl From<oidc_rp_session::SessionError> for AuthError {
    fn from(err: oidc_rp_session::SessionError) -> Self {
        AuthError::SessionUnavailable(err.to_string())
    }
}

impl From<AuthError> for HttpError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MetadataUnavailable(_) | AuthError::SessionUnavailable(_) => {
                HttpError::ServiceUnavailable(err.public_message().to_string())
            }
            _ => HttpError::Unauthorized(err.public_message().to_string()),
        }
    }
}
