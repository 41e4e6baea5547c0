use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use dashmap::DashMap;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::EncodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::debug;

const KID: &str = "mock-key-1";

/// RFC 6749 §5.1 required headers for token responses.
const TOKEN_HEADERS: [(header::HeaderName, &str); 2] = [
    (header::CACHE_CONTROL, "no-store"),
    (header::PRAGMA, "no-cache"),
];

struct SigningKey {
    encoding: EncodingKey,
    n: String,
    e: String,
}

/// One RSA-2048 key pair shared by every mock provider in the test binary.
fn signing_key() -> &'static SigningKey {
    static KEY: OnceLock<SigningKey> = OnceLock::new();
    KEY.get_or_init(|| {
        let private_key =
            RsaPrivateKey::new(&mut OsRng, 2048).expect("failed to generate RSA-2048 key");
        let public_key = RsaPublicKey::from(&private_key);
        let pem = private_key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .expect("failed to export RSA key as PKCS8 PEM");
        SigningKey {
            encoding: EncodingKey::from_rsa_pem(pem.as_bytes())
                .expect("failed to create EncodingKey from RSA PEM"),
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }
    })
}

/// What the relying party sent to the token endpoint.
#[derive(Debug, Clone, Default)]
pub struct TokenRequestRecord {
    /// Raw `Authorization` header, if any.
    pub authorization: Option<String>,
    /// Decoded form body.
    pub form: HashMap<String, String>,
}

struct IssuedCode {
    claims: Value,
    redirect_uri: String,
}

struct ProviderState {
    issuer: String,
    client_id: String,
    client_secret: String,
    codes: DashMap<String, IssuedCode>,
    discovery_hits: AtomicUsize,
    jwks_hits: AtomicUsize,
    token_hits: AtomicUsize,
    discovery_status: AtomicU16,
    discovery_delay_ms: AtomicU64,
    discovery_override: Mutex<Option<Value>>,
    token_status: AtomicU16,
    omit_id_token: AtomicBool,
    last_token_request: Mutex<Option<TokenRequestRecord>>,
}

/// In-process OpenID provider for tests.
///
/// Serves discovery, JWKS and token endpoints on `127.0.0.1:0`. The
/// authorization step is simulated by [`authorize`](Self::authorize), which
/// mints a one-time code bound to an ID token carrying the request's nonce.
pub struct MockProvider {
    base_url: String,
    state: Arc<ProviderState>,
    server: JoinHandle<()>,
}

impl MockProvider {
    /// Start a provider that accepts the given client credentials.
    pub async fn start(client_id: &str, client_secret: &str) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock provider");
        let addr = listener.local_addr().expect("mock provider has no address");
        let base_url = format!("http://{addr}");

        let state = Arc::new(ProviderState {
            issuer: base_url.clone(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            codes: DashMap::new(),
            discovery_hits: AtomicUsize::new(0),
            jwks_hits: AtomicUsize::new(0),
            token_hits: AtomicUsize::new(0),
            discovery_status: AtomicU16::new(200),
            discovery_delay_ms: AtomicU64::new(0),
            discovery_override: Mutex::new(None),
            token_status: AtomicU16::new(200),
            omit_id_token: AtomicBool::new(false),
            last_token_request: Mutex::new(None),
        });

        let router = Router::new()
            .route("/.well-known/openid-configuration", get(discovery_handler))
            .route("/jwks", get(jwks_handler))
            .route("/token", post(token_handler))
            .with_state(state.clone());

        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self {
            base_url,
            state,
            server,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn issuer(&self) -> &str {
        &self.state.issuer
    }

    pub fn client_id(&self) -> &str {
        &self.state.client_id
    }

    pub fn discovery_url(&self) -> String {
        format!("{}/.well-known/openid-configuration", self.base_url)
    }

    pub fn authorization_endpoint(&self) -> String {
        format!("{}/authorize", self.base_url)
    }

    pub fn discovery_hits(&self) -> usize {
        self.state.discovery_hits.load(Ordering::SeqCst)
    }

    pub fn jwks_hits(&self) -> usize {
        self.state.jwks_hits.load(Ordering::SeqCst)
    }

    pub fn token_hits(&self) -> usize {
        self.state.token_hits.load(Ordering::SeqCst)
    }

    /// Make the discovery endpoint answer with `status` and an error body.
    pub fn set_discovery_status(&self, status: u16) {
        self.state.discovery_status.store(status, Ordering::SeqCst);
    }

    /// Delay every discovery response.
    pub fn set_discovery_delay(&self, delay: Duration) {
        self.state
            .discovery_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Serve `document` instead of the generated discovery document.
    pub fn set_discovery_document(&self, document: Value) {
        *self.state.discovery_override.lock().unwrap() = Some(document);
    }

    /// Make the token endpoint answer with `status` and an error body.
    pub fn set_token_status(&self, status: u16) {
        self.state.token_status.store(status, Ordering::SeqCst);
    }

    /// Leave `id_token` out of token responses.
    pub fn omit_id_token(&self, omit: bool) {
        self.state.omit_id_token.store(omit, Ordering::SeqCst);
    }

    pub fn last_token_request(&self) -> Option<TokenRequestRecord> {
        self.state.last_token_request.lock().unwrap().clone()
    }

    /// The generated discovery document.
    pub fn discovery_document(&self) -> Value {
        discovery_json(&self.base_url)
    }

    /// Claims of a well-formed ID token for this provider and `nonce`.
    pub fn default_claims(&self, nonce: &str) -> Value {
        let now = unix_now();
        json!({
            "iss": self.state.issuer,
            "sub": "user-42",
            "aud": self.state.client_id,
            "exp": now + 300,
            "iat": now,
            "nonce": nonce,
            "email": "ada@example.com",
            "email_verified": true,
            "name": "Ada Lovelace",
            "picture": "https://example.com/ada.png",
        })
    }

    /// Simulate the user approving the authorization request.
    ///
    /// Reads `nonce` and `redirect_uri` from the URL the relying party
    /// redirected to and returns a fresh authorization code.
    pub fn authorize(&self, authorization_url: &str) -> String {
        self.authorize_with(authorization_url, |_| {})
    }

    /// Like [`authorize`](Self::authorize), letting the caller edit the ID
    /// token claims first.
    pub fn authorize_with(&self, authorization_url: &str, edit: impl FnOnce(&mut Value)) -> String {
        let url = url::Url::parse(authorization_url).expect("invalid authorization URL");
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let nonce = params.get("nonce").expect("authorization URL without nonce");
        let redirect_uri = params
            .get("redirect_uri")
            .expect("authorization URL without redirect_uri");

        let mut claims = self.default_claims(nonce);
        edit(&mut claims);
        self.issue_code(claims, redirect_uri)
    }

    /// Mint a one-time code that redeems for an ID token with `claims`.
    pub fn issue_code(&self, claims: Value, redirect_uri: &str) -> String {
        let code = random_token();
        self.state.codes.insert(
            code.clone(),
            IssuedCode {
                claims,
                redirect_uri: redirect_uri.to_string(),
            },
        );
        code
    }

    /// Sign `claims` as an RS256 ID token with the published key.
    pub fn sign(&self, claims: &Value) -> String {
        sign(claims)
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn sign(claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(KID.to_string());
    encode(&header, claims, &signing_key().encoding).expect("failed to sign ID token")
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn random_token() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn form_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn discovery_json(base: &str) -> Value {
    json!({
        "issuer": base,
        "authorization_endpoint": format!("{base}/authorize"),
        "token_endpoint": format!("{base}/token"),
        "jwks_uri": format!("{base}/jwks"),
        "userinfo_endpoint": format!("{base}/userinfo"),
        "id_token_signing_alg_values_supported": ["RS256"],
        "response_types_supported": ["code"],
        "subject_types_supported": ["public"],
    })
}

fn error_body(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "error": error }))).into_response()
}

/// GET /.well-known/openid-configuration
async fn discovery_handler(State(state): State<Arc<ProviderState>>) -> Response {
    state.discovery_hits.fetch_add(1, Ordering::SeqCst);
    let delay = state.discovery_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let status = StatusCode::from_u16(state.discovery_status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status != StatusCode::OK {
        return error_body(status, "temporarily_unavailable");
    }

    if let Some(document) = state.discovery_override.lock().unwrap().clone() {
        return Json(document).into_response();
    }

    Json(discovery_json(&state.issuer)).into_response()
}

/// GET /jwks
async fn jwks_handler(State(state): State<Arc<ProviderState>>) -> Json<Value> {
    state.jwks_hits.fetch_add(1, Ordering::SeqCst);
    let key = signing_key();
    Json(json!({
        "keys": [{
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "kid": KID,
            "n": key.n,
            "e": key.e,
        }]
    }))
}

/// POST /token
async fn token_handler(
    State(state): State<Arc<ProviderState>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.token_hits.fetch_add(1, Ordering::SeqCst);
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *state.last_token_request.lock().unwrap() = Some(TokenRequestRecord {
        authorization: authorization.clone(),
        form: form.clone(),
    });

    let status = StatusCode::from_u16(state.token_status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status != StatusCode::OK {
        return error_body(status, "server_error");
    }

    if !client_authenticated(&state, authorization.as_deref(), &form) {
        debug!("Mock provider rejected client credentials");
        return error_body(StatusCode::UNAUTHORIZED, "invalid_client");
    }
    if form.get("grant_type").map(String::as_str) != Some("authorization_code") {
        return error_body(StatusCode::BAD_REQUEST, "unsupported_grant_type");
    }

    let Some(code) = form.get("code") else {
        return error_body(StatusCode::BAD_REQUEST, "invalid_request");
    };
    let Some((_, issued)) = state.codes.remove(code) else {
        return error_body(StatusCode::BAD_REQUEST, "invalid_grant");
    };
    if form.get("redirect_uri") != Some(&issued.redirect_uri) {
        return error_body(StatusCode::BAD_REQUEST, "invalid_grant");
    }

    let mut body = json!({
        "access_token": random_token(),
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": "openid profile email",
    });
    if !state.omit_id_token.load(Ordering::SeqCst) {
        body["id_token"] = Value::String(sign(&issued.claims));
    }
    (TOKEN_HEADERS, Json(body)).into_response()
}

/// Accepts `client_secret_basic` or `client_secret_post`.
fn client_authenticated(
    state: &ProviderState,
    authorization: Option<&str>,
    form: &HashMap<String, String>,
) -> bool {
    if let Some(encoded) = authorization.and_then(|h| h.strip_prefix("Basic ")) {
        let expected = format!(
            "{}:{}",
            form_encode(&state.client_id),
            form_encode(&state.client_secret)
        );
        return STANDARD
            .decode(encoded)
            .ok()
            .and_then(|raw| String::from_utf8(raw).ok())
            .is_some_and(|decoded| decoded == expected);
    }
    form.get("client_id") == Some(&state.client_id)
        && form.get("client_secret") == Some(&state.client_secret)
}
