use oidc_rp_test::MockProvider;
use serde_json::{json, Value};

const CLIENT_ID: &str = "client-123";
const CLIENT_SECRET: &str = "s3cret";

#[tokio::test]
async fn serves_discovery_document_and_counts_hits() {
    let provider = MockProvider::start(CLIENT_ID, CLIENT_SECRET).await;
    let doc: Value = reqwest::get(provider.discovery_url())
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(doc["issuer"], json!(provider.issuer()));
    assert_eq!(doc["jwks_uri"], json!(format!("{}/jwks", provider.base_url())));
    assert_eq!(provider.discovery_hits(), 1);
}

#[tokio::test]
async fn discovery_status_can_be_forced() {
    let provider = MockProvider::start(CLIENT_ID, CLIENT_SECRET).await;
    provider.set_discovery_status(503);
    let resp = reqwest::get(provider.discovery_url()).await.unwrap();
    assert_eq!(resp.status().as_u16(), 503);
}

#[tokio::test]
async fn code_redeems_once_with_post_credentials() {
    let provider = MockProvider::start(CLIENT_ID, CLIENT_SECRET).await;
    let auth_url = format!(
        "{}?nonce=n-1&redirect_uri=http%3A%2F%2Frp%2Fcb",
        provider.authorization_endpoint()
    );
    let code = provider.authorize(&auth_url);
    let client = reqwest::Client::new();
    let form = [
        ("grant_type", "authorization_code"),
        ("code", code.as_str()),
        ("redirect_uri", "http://rp/cb"),
        ("client_id", CLIENT_ID),
        ("client_secret", CLIENT_SECRET),
    ];

    let resp = client
        .post(format!("{}/token", provider.base_url()))
        .form(&form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.headers()["cache-control"], "no-store");
    let body: Value = resp.json().await.unwrap();
    assert!(body["id_token"].is_string());
    assert!(body["access_token"].is_string());

    let replay = client
        .post(format!("{}/token", provider.base_url()))
        .form(&form)
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status().as_u16(), 400);
    assert_eq!(provider.token_hits(), 2);
}

#[tokio::test]
async fn wrong_client_secret_is_rejected() {
    let provider = MockProvider::start(CLIENT_ID, CLIENT_SECRET).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/token", provider.base_url()))
        .basic_auth(CLIENT_ID, Some("wrong"))
        .form(&[("grant_type", "authorization_code"), ("code", "x")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
    let record = provider.last_token_request().unwrap();
    assert!(record.authorization.unwrap().starts_with("Basic "));
}
