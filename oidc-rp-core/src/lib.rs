//! Core runtime for `oidc-rp`: layered configuration, HTTP error responses,
//! and tracing setup shared by every crate in the workspace.

pub mod config;
pub mod error;
pub mod layers;

pub use config::{
    ConfigError, ConfigProperties, ConfigValue, DefaultSecretResolver, FromConfigValue,
    PropertyMeta, RpConfig, SecretResolver, SecretString,
};
pub use error::{error_response, HttpError};
pub use layers::{default_trace, init_tracing};
