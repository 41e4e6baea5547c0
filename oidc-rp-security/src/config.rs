/// Settings for the JWKS key cache.
#[derive(Clone, Debug)]
pub struct JwksConfig {
    /// URL of the provider's JWKS document (`jwks_uri` from discovery).
    pub jwks_url: String,

    /// Cache TTL in seconds (default: 3600)
    pub cache_ttl_secs: u64,

    /// Minimum interval between refresh attempts in seconds (default: 10)
    pub min_refresh_interval_secs: u64,
}

impl JwksConfig {
    pub fn new(jwks_url: impl Into<String>) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            cache_ttl_secs: 3600,
            min_refresh_interval_secs: 10,
        }
    }

    /// Set the cache TTL in seconds.
    pub fn with_cache_ttl(mut self, ttl_secs: u64) -> Self {
        self.cache_ttl_secs = ttl_secs;
        self
    }

    /// Set the minimum interval between refresh attempts.
    pub fn with_min_refresh_interval(mut self, interval_secs: u64) -> Self {
        self.min_refresh_interval_secs = interval_secs;
        self
    }
}
