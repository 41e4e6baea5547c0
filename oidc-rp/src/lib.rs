//! OpenID Connect relying party: authorization code flow against a single
//! provider, with a session-bound nonce and full ID token validation.

pub mod discovery;
pub mod error;
pub mod handshake;
pub mod observer;
pub mod routes;
pub mod settings;

pub use discovery::{ProviderMetadata, ProviderMetadataResolver};
pub use error::AuthError;
pub use handshake::{
    generate_nonce, http_client, CallbackParams, HandshakeController, LoginAttempt,
    TokenResponse, LOGIN_ATTEMPT_KEY,
};
pub use observer::{LoginEvent, LoginObserver, TracingObserver};
pub use routes::{router, AppState, SESSION_COOKIE};
pub use settings::{RpSettings, TokenAuthMethod};
