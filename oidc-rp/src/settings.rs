use oidc_rp_core::{
    ConfigError, ConfigProperties, ConfigValue, FromConfigValue, PropertyMeta, RpConfig,
    SecretString,
};
use oidc_rp_security::Algorithm;
use url::Url;

pub const DEFAULT_DISCOVERY_URL: &str =
    "https://accounts.google.com/.well-known/openid-configuration";

/// How the client authenticates at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenAuthMethod {
    /// HTTP Basic with the form-encoded client id and secret.
    #[default]
    ClientSecretBasic,
    /// `client_id` and `client_secret` in the form body.
    ClientSecretPost,
}

impl FromConfigValue for TokenAuthMethod {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        match String::from_config_value(value, key)?.as_str() {
            "client_secret_basic" => Ok(TokenAuthMethod::ClientSecretBasic),
            "client_secret_post" => Ok(TokenAuthMethod::ClientSecretPost),
            other => Err(ConfigError::Invalid {
                key: key.to_string(),
                message: format!(
                    "unknown method '{other}', expected client_secret_basic or client_secret_post"
                ),
            }),
        }
    }
}

/// Relying-party settings.
///
/// Only `client.id` and `client.secret` are required; everything else has a
/// default suited to local development.
#[derive(Debug, Clone)]
pub struct RpSettings {
    pub client_id: String,
    pub client_secret: SecretString,
    pub discovery_url: String,
    /// Externally visible base URL of this service.
    pub public_url: String,
    /// Overrides `public_url` + `/auth/callback`.
    pub redirect_url: Option<String>,
    pub bind: String,
    pub http_timeout_secs: u64,
    pub session_ttl_secs: u64,
    pub session_cookie_secure: bool,
    pub jwks_cache_ttl_secs: u64,
    pub jwks_min_refresh_secs: u64,
    pub clock_skew_secs: u64,
    pub token_auth_method: TokenAuthMethod,
    pub allowed_algorithms: Vec<Algorithm>,
    /// Where the browser goes after a failed callback.
    pub failure_redirect: String,
    pub login_max_age_secs: u64,
}

impl RpSettings {
    /// Settings with every optional value at its default.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        discovery_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret),
            discovery_url: discovery_url.into(),
            public_url: "http://localhost:3000".into(),
            redirect_url: None,
            bind: "127.0.0.1:3000".into(),
            http_timeout_secs: 10,
            session_ttl_secs: 1800,
            session_cookie_secure: false,
            jwks_cache_ttl_secs: 3600,
            jwks_min_refresh_secs: 10,
            clock_skew_secs: 60,
            token_auth_method: TokenAuthMethod::ClientSecretBasic,
            allowed_algorithms: vec![Algorithm::RS256],
            failure_redirect: "/".into(),
            login_max_age_secs: 600,
        }
    }

    /// The callback URL registered with the provider.
    pub fn redirect_uri(&self) -> String {
        match &self.redirect_url {
            Some(url) => url.clone(),
            None => format!("{}/auth/callback", self.public_url.trim_end_matches('/')),
        }
    }

    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = url.into();
        self
    }

    pub fn with_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = Some(url.into());
        self
    }

    pub fn with_token_auth_method(mut self, method: TokenAuthMethod) -> Self {
        self.token_auth_method = method;
        self
    }

    pub fn with_login_max_age(mut self, secs: u64) -> Self {
        self.login_max_age_secs = secs;
        self
    }
}

fn require_url(key: &str, value: &str) -> Result<(), ConfigError> {
    Url::parse(value).map(|_| ()).map_err(|e| ConfigError::Invalid {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn parse_algorithms(names: Vec<String>) -> Result<Vec<Algorithm>, ConfigError> {
    names
        .iter()
        .map(|name| {
            name.parse::<Algorithm>().map_err(|_| ConfigError::Invalid {
                key: "token.allowed.algs".into(),
                message: format!("unknown algorithm '{name}'"),
            })
        })
        .collect()
}

fn meta(
    key: &'static str,
    type_name: &'static str,
    required: bool,
    description: &'static str,
) -> PropertyMeta {
    PropertyMeta {
        key,
        type_name,
        required,
        description,
    }
}

impl ConfigProperties for RpSettings {
    fn properties_metadata() -> Vec<PropertyMeta> {
        vec![
            meta("client.id", "String", true, "Client identifier issued by the provider"),
            meta("client.secret", "SecretString", true, "Client secret issued by the provider"),
            meta("oidc.discovery.url", "String", false, "Provider discovery document URL"),
            meta("server.public.url", "String", false, "Externally visible base URL"),
            meta("oidc.redirect.url", "String", false, "Callback URL registered with the provider"),
            meta("server.bind", "String", false, "Listen address"),
            meta("http.timeout.secs", "u64", false, "Outbound request timeout"),
            meta("session.ttl.secs", "u64", false, "Session lifetime after last write"),
            meta("session.cookie.secure", "bool", false, "Mark the session cookie Secure"),
            meta("jwks.cache.ttl.secs", "u64", false, "Signing key cache TTL"),
            meta("jwks.min.refresh.secs", "u64", false, "Minimum spacing of JWKS refreshes"),
            meta("token.clock.skew.secs", "u64", false, "Tolerated iat skew"),
            meta("token.auth.method", "String", false, "client_secret_basic or client_secret_post"),
            meta("token.allowed.algs", "Vec<String>", false, "Accepted ID token algorithms"),
            meta("auth.failure.redirect", "String", false, "Redirect target after a failed login"),
            meta("login.max.age.secs", "u64", false, "Lifetime of a pending login attempt"),
        ]
    }

    fn from_config(config: &RpConfig) -> Result<Self, ConfigError> {
        let client_id: String = config.get("client.id")?;
        if client_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "client.id".into(),
                message: "must not be empty".into(),
            });
        }
        let defaults = RpSettings::new(client_id, "", DEFAULT_DISCOVERY_URL);

        let settings = RpSettings {
            client_secret: config.get("client.secret")?,
            discovery_url: config.get_or("oidc.discovery.url", defaults.discovery_url.clone())?,
            public_url: config.get_or("server.public.url", defaults.public_url.clone())?,
            redirect_url: config.get_or("oidc.redirect.url", None)?,
            bind: config.get_or("server.bind", defaults.bind.clone())?,
            http_timeout_secs: config.get_or("http.timeout.secs", defaults.http_timeout_secs)?,
            session_ttl_secs: config.get_or("session.ttl.secs", defaults.session_ttl_secs)?,
            session_cookie_secure: config
                .get_or("session.cookie.secure", defaults.session_cookie_secure)?,
            jwks_cache_ttl_secs: config
                .get_or("jwks.cache.ttl.secs", defaults.jwks_cache_ttl_secs)?,
            jwks_min_refresh_secs: config
                .get_or("jwks.min.refresh.secs", defaults.jwks_min_refresh_secs)?,
            clock_skew_secs: config.get_or("token.clock.skew.secs", defaults.clock_skew_secs)?,
            token_auth_method: config.get_or("token.auth.method", defaults.token_auth_method)?,
            allowed_algorithms: match config.get_or::<Option<Vec<String>>>("token.allowed.algs", None)? {
                Some(names) => parse_algorithms(names)?,
                None => defaults.allowed_algorithms.clone(),
            },
            failure_redirect: config
                .get_or("auth.failure.redirect", defaults.failure_redirect.clone())?,
            login_max_age_secs: config
                .get_or("login.max.age.secs", defaults.login_max_age_secs)?,
            ..defaults
        };

        require_url("oidc.discovery.url", &settings.discovery_url)?;
        require_url("server.public.url", &settings.public_url)?;
        if let Some(url) = &settings.redirect_url {
            require_url("oidc.redirect.url", url)?;
        }
        Ok(settings)
    }
}
