//! ID token validation for the oidc-rp handshake.
//!
//! [`validate`] is a pure function over a token, a [`KeySet`], the
//! caller's [`Expectations`] and the current time. [`JwksCache`] is the
//! network-facing half that produces key sets from a provider's JWKS URI.

pub mod claims;
pub mod config;
pub mod error;
pub mod jwks;
pub mod validator;

pub use claims::ValidatedClaims;
pub use config::JwksConfig;
pub use error::{JwksError, ValidationFailure};
pub use jwks::{JwksCache, KeySet};
pub use validator::{peek_kid, validate, Expectations};

pub use jsonwebtoken::Algorithm;
