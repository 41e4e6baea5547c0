use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use oidc_rp::{http_client, router, AppState, HandshakeController, RpSettings, SESSION_COOKIE};
use oidc_rp_session::InMemorySessionStore;
use oidc_rp_test::{MockProvider, TestApp};

const CLIENT_ID: &str = "client-123";
const CLIENT_SECRET: &str = "s3cret";

fn app_with(settings: RpSettings) -> TestApp {
    let client = http_client(&settings).unwrap();
    let controller = Arc::new(HandshakeController::new(settings, client));
    let sessions = Arc::new(InMemorySessionStore::new(Duration::from_secs(60)));
    TestApp::new(router(AppState::new(controller, sessions)))
}

async fn setup() -> (MockProvider, TestApp) {
    let provider = MockProvider::start(CLIENT_ID, CLIENT_SECRET).await;
    let app = app_with(
        RpSettings::new(CLIENT_ID, CLIENT_SECRET, provider.discovery_url())
            .with_public_url("http://rp.test"),
    );
    (provider, app)
}

/// Run `/auth/start` and return (session cookie value, provider URL).
async fn start(app: &TestApp) -> (String, String) {
    let resp = app.get("/auth/start").send().await;
    let location = resp.assert_redirect();
    let cookie = resp.cookie(SESSION_COOKIE).expect("session cookie not set");
    (cookie, location)
}

fn callback_path(code: &str) -> String {
    format!("/auth/callback?code={code}")
}

#[tokio::test]
async fn landing_page_links_to_start() {
    let (_provider, app) = setup().await;
    let resp = app.get("/").send().await.assert_ok();
    assert!(resp.text().contains("href=\"/auth/start\""));
}

#[tokio::test]
async fn health_is_ok() {
    let (_provider, app) = setup().await;
    let resp = app.get("/health").send().await.assert_ok();
    assert_eq!(resp.text(), "OK");
}

#[tokio::test]
async fn start_redirects_to_provider_and_sets_session_cookie() {
    let (provider, app) = setup().await;
    let resp = app.get("/auth/start").send().await;
    let location = resp.assert_redirect();
    assert!(location.starts_with(&provider.authorization_endpoint()));
    assert!(location.contains("response_type=code"));
    assert!(location.contains("prompt=select_account"));

    let cookie = resp.set_cookie(SESSION_COOKIE).unwrap();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Path=/"));
    assert!(!cookie.contains("Secure"));
    assert_eq!(resp.cookie(SESSION_COOKIE).unwrap().len(), 43);
}

#[tokio::test]
async fn start_reuses_existing_session_cookie() {
    let (_provider, app) = setup().await;
    let (cookie, _) = start(&app).await;
    let resp = app
        .get("/auth/start")
        .cookie(SESSION_COOKIE, &cookie)
        .send()
        .await;
    resp.assert_redirect();
    assert!(resp.set_cookie(SESSION_COOKIE).is_none());
}

#[tokio::test]
async fn garbage_session_cookie_is_replaced() {
    let (_provider, app) = setup().await;
    let resp = app
        .get("/auth/start")
        .cookie(SESSION_COOKIE, "not-a-session-id")
        .send()
        .await;
    resp.assert_redirect();
    assert!(resp.set_cookie(SESSION_COOKIE).is_some());
}

#[tokio::test]
async fn secure_cookie_when_configured() {
    let provider = MockProvider::start(CLIENT_ID, CLIENT_SECRET).await;
    let mut settings = RpSettings::new(CLIENT_ID, CLIENT_SECRET, provider.discovery_url());
    settings.session_cookie_secure = true;
    let app = app_with(settings);
    let resp = app.get("/auth/start").send().await;
    assert!(resp.set_cookie(SESSION_COOKIE).unwrap().contains("Secure"));
}

#[tokio::test]
async fn start_is_503_when_provider_is_down() {
    let (provider, app) = setup().await;
    provider.set_discovery_status(502);
    app.get("/auth/start")
        .send()
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE)
        .assert_json_path("error", "Authentication temporarily unavailable");
}

#[tokio::test]
async fn successful_callback_returns_claims_summary() {
    let (provider, app) = setup().await;
    let (cookie, location) = start(&app).await;
    let code = provider.authorize(&location);

    let resp = app
        .get(&callback_path(&code))
        .cookie(SESSION_COOKIE, &cookie)
        .send()
        .await
        .assert_ok()
        .assert_json_path("authenticated", true)
        .assert_json_path("subject", "user-42")
        .assert_json_path("email", "ada@example.com")
        .assert_json_path("name", "Ada Lovelace")
        .assert_json_path("picture", "https://example.com/ada.png");

    let body = resp.text();
    assert!(!body.contains("id_token"));
    assert!(!body.contains("access_token"));
    assert!(!body.contains("nonce"));
}

#[tokio::test]
async fn provider_error_redirects_to_landing() {
    let (provider, app) = setup().await;
    let (cookie, _) = start(&app).await;

    let resp = app
        .get("/auth/callback?error=access_denied&error_description=User+cancelled")
        .cookie(SESSION_COOKIE, &cookie)
        .send()
        .await;
    assert_eq!(resp.assert_redirect(), "/");
    assert!(resp.body.is_empty());
    assert_eq!(provider.token_hits(), 0);
}

#[tokio::test]
async fn replayed_callback_redirects_to_landing() {
    let (provider, app) = setup().await;
    let (cookie, location) = start(&app).await;
    let code = provider.authorize(&location);
    let path = callback_path(&code);

    app.get(&path)
        .cookie(SESSION_COOKIE, &cookie)
        .send()
        .await
        .assert_ok();
    let replay = app.get(&path).cookie(SESSION_COOKIE, &cookie).send().await;
    assert_eq!(replay.assert_redirect(), "/");
}

#[tokio::test]
async fn unparseable_callback_query_redirects_and_consumes_attempt() {
    let (provider, app) = setup().await;
    let (cookie, location) = start(&app).await;

    let resp = app
        .get("/auth/callback?code=a&code=b")
        .cookie(SESSION_COOKIE, &cookie)
        .send()
        .await;
    assert_eq!(resp.assert_redirect(), "/");
    assert!(resp.body.is_empty());

    // The nonce is gone, so the genuine code is refused without an exchange.
    let code = provider.authorize(&location);
    let resp = app
        .get(&callback_path(&code))
        .cookie(SESSION_COOKIE, &cookie)
        .send()
        .await;
    assert_eq!(resp.assert_redirect(), "/");
    assert_eq!(provider.token_hits(), 0);
}

#[tokio::test]
async fn callback_without_session_redirects_to_landing() {
    let (provider, app) = setup().await;
    let (_, location) = start(&app).await;
    let code = provider.authorize(&location);

    let resp = app.get(&callback_path(&code)).send().await;
    assert_eq!(resp.assert_redirect(), "/");
    assert_eq!(provider.token_hits(), 0);
}

#[tokio::test]
async fn failed_validation_never_leaks_token_material() {
    let (provider, app) = setup().await;
    let (cookie, location) = start(&app).await;
    let code = provider.authorize_with(&location, |claims| {
        claims["aud"] = serde_json::json!("someone-else");
    });

    let resp = app
        .get(&callback_path(&code))
        .cookie(SESSION_COOKIE, &cookie)
        .send()
        .await;
    assert_eq!(resp.assert_redirect(), "/");
    assert!(resp.body.is_empty());
    assert_eq!(provider.token_hits(), 1);
}

#[tokio::test]
async fn failure_redirect_is_configurable() {
    let provider = MockProvider::start(CLIENT_ID, CLIENT_SECRET).await;
    let mut settings = RpSettings::new(CLIENT_ID, CLIENT_SECRET, provider.discovery_url());
    settings.failure_redirect = "/login?failed=1".into();
    let app = app_with(settings);

    let resp = app.get("/auth/callback?error=access_denied").send().await;
    assert_eq!(resp.assert_redirect(), "/login?failed=1");
}
