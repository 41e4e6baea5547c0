use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::JwksConfig;
use crate::error::JwksError;

/// Raw JWK as returned by a JWKS endpoint. Unknown members are ignored.
#[derive(Debug, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: String,
    #[serde(default, rename = "use")]
    usage: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
}

impl Jwk {
    fn to_decoding_key(&self) -> Result<DecodingKey, String> {
        match self.kty.as_str() {
            "RSA" => {
                let n = self.n.as_deref().ok_or("RSA key missing 'n' component")?;
                let e = self.e.as_deref().ok_or("RSA key missing 'e' component")?;
                DecodingKey::from_rsa_components(n, e).map_err(|err| err.to_string())
            }
            "EC" => {
                let x = self.x.as_deref().ok_or("EC key missing 'x' component")?;
                let y = self.y.as_deref().ok_or("EC key missing 'y' component")?;
                DecodingKey::from_ec_components(x, y).map_err(|err| err.to_string())
            }
            other => Err(format!("unsupported key type: {other}")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

/// A set of verification keys handed to [`validate`](crate::validate).
#[derive(Clone)]
pub enum KeySet {
    /// Keys from a JWKS document, indexed by `kid`.
    Jwks(Arc<HashMap<String, DecodingKey>>),
    /// A single key used regardless of `kid` (useful for testing).
    Static(DecodingKey),
}

impl KeySet {
    pub fn from_static(key: DecodingKey) -> Self {
        KeySet::Static(key)
    }

    /// Key for the given header `kid`.
    ///
    /// A token without `kid` is accepted only when the set holds exactly one key.
    pub fn get(&self, kid: Option<&str>) -> Option<&DecodingKey> {
        match (self, kid) {
            (KeySet::Static(key), _) => Some(key),
            (KeySet::Jwks(keys), Some(kid)) => keys.get(kid),
            (KeySet::Jwks(keys), None) if keys.len() == 1 => keys.values().next(),
            (KeySet::Jwks(_), None) => None,
        }
    }
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySet::Jwks(keys) => f
                .debug_tuple("Jwks")
                .field(&keys.keys().collect::<Vec<_>>())
                .finish(),
            KeySet::Static(_) => f.write_str("Static"),
        }
    }
}

struct CacheInner {
    keys: Arc<HashMap<String, DecodingKey>>,
    last_refresh: Option<Instant>,
    last_refresh_attempt: Option<Instant>,
}

/// Cache of the provider's signing keys.
///
/// Nothing is fetched until the first lookup. A lookup for an unknown `kid`
/// forces a refresh, a stale cache is refreshed opportunistically, and
/// refresh attempts are spaced by at least `min_refresh_interval_secs`.
pub struct JwksCache {
    inner: RwLock<CacheInner>,
    config: JwksConfig,
    client: reqwest::Client,
    refresh_lock: Mutex<()>,
}

impl JwksCache {
    pub fn new(config: JwksConfig, client: reqwest::Client) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                keys: Arc::new(HashMap::new()),
                last_refresh: None,
                last_refresh_attempt: None,
            }),
            config,
            client,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &JwksConfig {
        &self.config
    }

    /// Return the current key set, refreshing first when `kid` is unknown or
    /// the cache is stale.
    ///
    /// If the `kid` is still unknown after a refresh the set is returned as is;
    /// the validator rejects the token.
    pub async fn key_set(&self, kid: Option<&str>) -> Result<KeySet, JwksError> {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);

        let force = {
            let cache = self.inner.read().await;
            let known = match kid {
                Some(kid) => cache.keys.contains_key(kid),
                None => !cache.keys.is_empty(),
            };
            if known && !is_stale(cache.last_refresh, ttl) {
                return Ok(KeySet::Jwks(cache.keys.clone()));
            }
            !known
        };

        if let Err(err) = self.try_refresh(force).await {
            // A stale but loaded set is still better than nothing.
            let cache = self.inner.read().await;
            if cache.last_refresh.is_none() {
                return Err(err);
            }
            warn!(error = %err, "JWKS refresh failed, serving cached keys");
        }

        let cache = self.inner.read().await;
        if cache.last_refresh.is_none() {
            return Err(JwksError::NotLoaded);
        }
        Ok(KeySet::Jwks(cache.keys.clone()))
    }

    async fn refresh(&self) -> Result<(), JwksError> {
        let response = self
            .client
            .get(&self.config.jwks_url)
            .send()
            .await
            .map_err(|e| JwksError::Fetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| JwksError::Fetch(e.to_string()))?;

        let jwks: JwksResponse = response
            .json()
            .await
            .map_err(|e| JwksError::Parse(e.to_string()))?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            if jwk.usage.as_deref().is_some_and(|u| u != "sig") {
                continue;
            }
            let Some(kid) = jwk.kid.clone() else {
                continue;
            };
            match jwk.to_decoding_key() {
                Ok(key) => {
                    keys.insert(kid, key);
                }
                Err(reason) => warn!(kid = %kid, %reason, "Skipping unusable JWK"),
            }
        }
        debug!(count = keys.len(), "JWKS refreshed");

        let now = Instant::now();
        let mut cache = self.inner.write().await;
        cache.keys = Arc::new(keys);
        cache.last_refresh = Some(now);
        cache.last_refresh_attempt = Some(now);
        Ok(())
    }

    async fn try_refresh(&self, force: bool) -> Result<(), JwksError> {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        let min_interval = Duration::from_secs(self.config.min_refresh_interval_secs);

        {
            let cache = self.inner.read().await;
            if !force && !is_stale(cache.last_refresh, ttl) {
                return Ok(());
            }
            if !can_attempt(cache.last_refresh_attempt, min_interval) {
                return Ok(());
            }
        }

        let _guard = self.refresh_lock.lock().await;

        {
            let cache = self.inner.read().await;
            if !force && !is_stale(cache.last_refresh, ttl) {
                return Ok(());
            }
            if !can_attempt(cache.last_refresh_attempt, min_interval) {
                return Ok(());
            }
        }

        {
            let mut cache = self.inner.write().await;
            cache.last_refresh_attempt = Some(Instant::now());
        }

        self.refresh().await
    }
}

fn is_stale(last_refresh: Option<Instant>, ttl: Duration) -> bool {
    match last_refresh {
        None => true,
        Some(ts) => ts.elapsed() >= ttl,
    }
}

fn can_attempt(last_attempt: Option<Instant>, min_interval: Duration) -> bool {
    match last_attempt {
        None => true,
        Some(ts) => ts.elapsed() >= min_interval,
    }
}
