use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use oidc_rp_security::{
    peek_kid, validate, Expectations, JwksCache, JwksConfig, KeySet, ValidatedClaims,
};
use oidc_rp_session::{Session, SessionError};
use rand::rngs::OsRng;
use rand::RngCore;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

use crate::discovery::{ProviderMetadata, ProviderMetadataResolver};
use crate::error::AuthError;
use crate::observer::{LoginEvent, LoginObserver, TracingObserver};
use crate::settings::{RpSettings, TokenAuthMethod};

/// Session key holding the pending [`LoginAttempt`].
pub const LOGIN_ATTEMPT_KEY: &str = "oidc.login_attempt";

pub const SCOPE: &str = "openid profile email";

const NONCE_BYTES: usize = 16;

/// A login in flight: the nonce sent to the provider and when it was issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub nonce: String,
    pub created_at: DateTime<Utc>,
}

impl LoginAttempt {
    pub fn new() -> Self {
        Self {
            nonce: generate_nonce(),
            created_at: Utc::now(),
        }
    }

    fn is_older_than(&self, max_age_secs: u64, now: DateTime<Utc>) -> bool {
        let max_age = i64::try_from(max_age_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(self.created_at) > max_age
    }
}

impl Default for LoginAttempt {
    fn default() -> Self {
        Self::new()
    }
}

/// 16 bytes from the OS CSPRNG, base64url without padding.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Query parameters the provider redirects back with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub state: Option<String>,
}

impl CallbackParams {
    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::default()
        }
    }

    pub fn with_error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Successful token endpoint response.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub id_token: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Strict parse of a token endpoint body. Empty required tokens count as missing.
    pub fn parse(body: &[u8]) -> Result<Self, AuthError> {
        let response: TokenResponse = serde_json::from_slice(body).map_err(|e| {
            // serde messages can quote values; report position only
            AuthError::TokenExchangeFailed(format!(
                "malformed token response ({:?} error at line {} column {})",
                e.classify(),
                e.line(),
                e.column()
            ))
        })?;
        if response.id_token.is_empty() {
            return Err(AuthError::TokenExchangeFailed("empty id_token".into()));
        }
        if response.access_token.is_empty() {
            return Err(AuthError::TokenExchangeFailed("empty access_token".into()));
        }
        Ok(response)
    }
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("id_token", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Deserialize)]
struct OAuthErrorBody {
    error: String,
}

/// Build an HTTP client with the configured request timeout.
pub fn http_client(settings: &RpSettings) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.http_timeout_secs))
        .build()
}

/// The authorization code flow: `begin_login` then `complete_login`.
///
/// Holds no per-login state; everything about a login in flight lives in the
/// caller's [`Session`].
pub struct HandshakeController {
    settings: RpSettings,
    client: reqwest::Client,
    resolver: ProviderMetadataResolver,
    jwks: OnceCell<JwksCache>,
    observer: Arc<dyn LoginObserver>,
}

impl HandshakeController {
    pub fn new(settings: RpSettings, client: reqwest::Client) -> Self {
        let resolver = ProviderMetadataResolver::new(settings.discovery_url.clone(), client.clone());
        Self {
            settings,
            client,
            resolver,
            jwks: OnceCell::new(),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn LoginObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn settings(&self) -> &RpSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &ProviderMetadataResolver {
        &self.resolver
    }

    /// Bind a fresh login attempt to `session` and return the provider URL
    /// to redirect the browser to.
    ///
    /// Any attempt already bound to the session is replaced.
    pub async fn begin_login(&self, session: &Session) -> Result<Url, AuthError> {
        let metadata = self.resolver.resolve().await?;
        let attempt = LoginAttempt::new();
        session.put_json(LOGIN_ATTEMPT_KEY, &attempt).await?;

        let url = self.authorization_url(&metadata, &attempt.nonce);
        debug!(session = ?session.id(), "Login attempt bound");
        self.observer.observe(&LoginEvent::Started);
        Ok(url)
    }

    /// Handle the provider's redirect back.
    ///
    /// The pending attempt is consumed whatever the outcome, so a callback can
    /// never be replayed against the same nonce.
    pub async fn complete_login(
        &self,
        session: &Session,
        params: &CallbackParams,
    ) -> Result<ValidatedClaims, AuthError> {
        let result = self.finish(session, params).await;
        let event = match &result {
            Ok(claims) => LoginEvent::Succeeded {
                subject: claims.subject.clone(),
            },
            Err(err) => LoginEvent::Failed { kind: err.kind() },
        };
        self.observer.observe(&event);
        result
    }

    fn authorization_url(&self, metadata: &ProviderMetadata, nonce: &str) -> Url {
        let mut url = metadata.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", &self.settings.redirect_uri())
            .append_pair("scope", SCOPE)
            .append_pair("nonce", nonce)
            .append_pair("prompt", "select_account");
        url
    }

    async fn finish(
        &self,
        session: &Session,
        params: &CallbackParams,
    ) -> Result<ValidatedClaims, AuthError> {
        let attempt = match session.pop_json::<LoginAttempt>(LOGIN_ATTEMPT_KEY).await {
            Ok(attempt) => attempt,
            Err(SessionError::Codec(reason)) => {
                warn!(%reason, "Discarding undecodable login attempt");
                None
            }
            Err(err) => return Err(err.into()),
        };

        let code = callback_code(params)?;

        let now = Utc::now();
        let attempt = attempt
            .filter(|a| !a.is_older_than(self.settings.login_max_age_secs, now))
            .ok_or(AuthError::MissingNonce)?;

        let metadata = self.resolver.resolve().await?;
        let tokens = self.exchange_code(&metadata, code).await?;

        let kid = peek_kid(&tokens.id_token)?;
        let keys = self.key_set(&metadata, kid.as_deref()).await?;

        let expected = Expectations::new(
            attempt.nonce,
            metadata.issuer.clone(),
            self.settings.client_id.clone(),
        )
        .with_allowed_algorithms(self.settings.allowed_algorithms.iter().cloned())
        .with_iat_leeway(self.settings.clock_skew_secs);

        Ok(validate(&tokens.id_token, &keys, &expected, Utc::now())?)
    }

    async fn exchange_code(
        &self,
        metadata: &ProviderMetadata,
        code: &str,
    ) -> Result<TokenResponse, AuthError> {
        let redirect_uri = self.settings.redirect_uri();
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
        ];

        let mut request = self
            .client
            .post(metadata.token_endpoint.clone())
            .header(ACCEPT, "application/json");
        let secret = self.settings.client_secret.expose();
        match self.settings.token_auth_method {
            TokenAuthMethod::ClientSecretBasic => {
                // RFC 6749 §2.3.1: form-encode before base64
                request = request.basic_auth(
                    form_encode(&self.settings.client_id),
                    Some(form_encode(secret)),
                );
            }
            TokenAuthMethod::ClientSecretPost => {
                form.push(("client_id", self.settings.client_id.as_str()));
                form.push(("client_secret", secret));
            }
        }

        let response = request
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.without_url().to_string()))?;

        if !status.is_success() {
            let error = serde_json::from_slice::<OAuthErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_else(|_| "unknown".into());
            return Err(AuthError::TokenExchangeFailed(format!(
                "token endpoint returned {status} ({error})"
            )));
        }

        let tokens = TokenResponse::parse(&body)?;
        debug!(tokens = ?tokens, "Authorization code exchanged");
        Ok(tokens)
    }

    async fn key_set(
        &self,
        metadata: &ProviderMetadata,
        kid: Option<&str>,
    ) -> Result<KeySet, AuthError> {
        let cache = self
            .jwks
            .get_or_init(|| async {
                let config = JwksConfig::new(metadata.jwks_uri.as_str())
                    .with_cache_ttl(self.settings.jwks_cache_ttl_secs)
                    .with_min_refresh_interval(self.settings.jwks_min_refresh_secs);
                JwksCache::new(config, self.client.clone())
            })
            .await;
        cache
            .key_set(kid)
            .await
            .map_err(|e| AuthError::MetadataUnavailable(e.to_string()))
    }
}

fn callback_code(params: &CallbackParams) -> Result<&str, AuthError> {
    if let Some(error) = &params.error {
        return Err(AuthError::CallbackError(format!(
            "provider returned '{error}'"
        )));
    }
    match params.code.as_deref() {
        Some(code) if !code.is_empty() => Ok(code),
        _ => Err(AuthError::CallbackError("missing authorization code".into())),
    }
}

fn form_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
