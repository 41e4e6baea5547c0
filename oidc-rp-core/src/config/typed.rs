use super::{ConfigError, RpConfig};

/// Metadata about a single configuration property.
#[derive(Debug, Clone)]
pub struct PropertyMeta {
    /// Absolute key (e.g., `"client.id"`).
    pub key: &'static str,
    /// Rust type name (e.g., `"String"`).
    pub type_name: &'static str,
    /// Whether the property is required (no default and not `Option`).
    pub required: bool,
    /// Human-readable description.
    pub description: &'static str,
}

/// Trait for strongly-typed configuration sections.
///
/// ```ignore
/// impl ConfigProperties for RpSettings {
///     fn properties_metadata() -> Vec<PropertyMeta> { ... }
///     fn from_config(config: &RpConfig) -> Result<Self, ConfigError> {
///         Ok(Self { client_id: config.get("client.id")?, .. })
///     }
/// }
/// ```
pub trait ConfigProperties: Sized {
    /// Metadata about all expected properties.
    fn properties_metadata() -> Vec<PropertyMeta>;

    /// Construct from an `RpConfig` instance.
    fn from_config(config: &RpConfig) -> Result<Self, ConfigError>;

    /// Keys that are required but absent from `config`.
    fn missing_keys(config: &RpConfig) -> Vec<&'static str> {
        Self::properties_metadata()
            .into_iter()
            .filter(|p| p.required && !config.contains_key(p.key))
            .map(|p| p.key)
            .collect()
    }
}

/// Environment variable that overrides a dotted config key.
///
/// `client.secret` -> `CLIENT_SECRET`
pub fn env_var_for(key: &str) -> String {
    key.replace('.', "_").to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_hint() {
        assert_eq!(env_var_for("client.secret"), "CLIENT_SECRET");
        assert_eq!(env_var_for("oidc.discovery.url"), "OIDC_DISCOVERY_URL");
    }
}
