use std::sync::Arc;
use std::time::Duration;

use oidc_rp::{AuthError, ProviderMetadataResolver};
use oidc_rp_test::MockProvider;

fn resolver(provider: &MockProvider) -> ProviderMetadataResolver {
    ProviderMetadataResolver::new(provider.discovery_url(), reqwest::Client::new())
}

#[tokio::test]
async fn resolves_once_and_caches() {
    let provider = MockProvider::start("client", "secret").await;
    let resolver = resolver(&provider);
    assert!(resolver.cached().is_none());

    let first = resolver.resolve().await.unwrap();
    let second = resolver.resolve().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.issuer, provider.issuer());
    assert_eq!(
        first.token_endpoint.as_str(),
        format!("{}/token", provider.base_url())
    );
    assert_eq!(first.id_token_signing_alg_values_supported, vec!["RS256"]);
    assert!(resolver.cached().is_some());
    assert_eq!(provider.discovery_hits(), 1);
}

#[tokio::test]
async fn concurrent_first_calls_share_one_fetch() {
    let provider = MockProvider::start("client", "secret").await;
    provider.set_discovery_delay(Duration::from_millis(150));
    let resolver = Arc::new(resolver(&provider));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let resolver = resolver.clone();
        handles.push(tokio::spawn(async move { resolver.resolve().await.is_ok() }));
    }
    for h in handles {
        assert!(h.await.unwrap());
    }
    assert_eq!(provider.discovery_hits(), 1);
}

#[tokio::test]
async fn failed_fetch_is_retried_by_next_call() {
    let provider = MockProvider::start("client", "secret").await;
    provider.set_discovery_status(503);
    let resolver = resolver(&provider);

    let err = resolver.resolve().await.unwrap_err();
    assert!(matches!(err, AuthError::MetadataUnavailable(_)));
    assert!(resolver.cached().is_none());

    provider.set_discovery_status(200);
    assert!(resolver.resolve().await.is_ok());
    assert_eq!(provider.discovery_hits(), 2);
}

#[tokio::test]
async fn missing_required_field_is_unavailable() {
    let provider = MockProvider::start("client", "secret").await;
    let mut doc = provider.discovery_document();
    doc.as_object_mut().unwrap().remove("jwks_uri");
    provider.set_discovery_document(doc);

    let err = resolver(&provider).resolve().await.unwrap_err();
    assert_eq!(err.kind(), "metadata_unavailable");
    assert!(err.to_string().contains("jwks_uri"));
}

#[tokio::test]
async fn non_json_body_is_unavailable() {
    let provider = MockProvider::start("client", "secret").await;
    provider.set_discovery_document(serde_json::json!("just a string"));
    let err = resolver(&provider).resolve().await.unwrap_err();
    assert!(matches!(err, AuthError::MetadataUnavailable(_)));
}

#[tokio::test]
async fn slow_provider_times_out() {
    let provider = MockProvider::start("client", "secret").await;
    provider.set_discovery_delay(Duration::from_millis(500));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let resolver = ProviderMetadataResolver::new(provider.discovery_url(), client);

    let err = resolver.resolve().await.unwrap_err();
    assert!(matches!(err, AuthError::MetadataUnavailable(_)));
}
