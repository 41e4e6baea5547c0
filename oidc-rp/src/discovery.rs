use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{info, warn};
use url::Url;

use crate::error::AuthError;

/// Provider endpoints from the discovery document.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub jwks_uri: Url,
    pub userinfo_endpoint: Option<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
}

/// Discovery document as served. Required members are optional here so a
/// missing one can be reported by name.
#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    issuer: Option<String>,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    jwks_uri: Option<String>,
    #[serde(default)]
    userinfo_endpoint: Option<String>,
    #[serde(default)]
    id_token_signing_alg_values_supported: Vec<String>,
}

fn required(value: Option<String>, field: &str) -> Result<String, AuthError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AuthError::MetadataUnavailable(format!(
            "discovery document is missing '{field}'"
        ))),
    }
}

fn required_url(value: Option<String>, field: &str) -> Result<Url, AuthError> {
    let raw = required(value, field)?;
    Url::parse(&raw).map_err(|e| {
        AuthError::MetadataUnavailable(format!("discovery field '{field}' is not a URL: {e}"))
    })
}

impl TryFrom<DiscoveryDocument> for ProviderMetadata {
    type Error = AuthError;

    fn try_from(doc: DiscoveryDocument) -> Result<Self, Self::Error> {
        Ok(ProviderMetadata {
            issuer: required(doc.issuer, "issuer")?,
            authorization_endpoint: required_url(
                doc.authorization_endpoint,
                "authorization_endpoint",
            )?,
            token_endpoint: required_url(doc.token_endpoint, "token_endpoint")?,
            jwks_uri: required_url(doc.jwks_uri, "jwks_uri")?,
            userinfo_endpoint: doc.userinfo_endpoint,
            id_token_signing_alg_values_supported: doc.id_token_signing_alg_values_supported,
        })
    }
}

/// Lazily fetches the discovery document once and serves it for the rest of
/// the process lifetime.
///
/// Concurrent first calls share a single fetch. A failed fetch caches
/// nothing, so the next call tries again.
pub struct ProviderMetadataResolver {
    discovery_url: String,
    client: reqwest::Client,
    cell: OnceCell<Arc<ProviderMetadata>>,
}

impl ProviderMetadataResolver {
    pub fn new(discovery_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            discovery_url: discovery_url.into(),
            client,
            cell: OnceCell::new(),
        }
    }

    pub async fn resolve(&self) -> Result<Arc<ProviderMetadata>, AuthError> {
        self.cell
            .get_or_try_init(|| self.fetch())
            .await
            .cloned()
    }

    /// The metadata if it has already been resolved.
    pub fn cached(&self) -> Option<Arc<ProviderMetadata>> {
        self.cell.get().cloned()
    }

    async fn fetch(&self) -> Result<Arc<ProviderMetadata>, AuthError> {
        let result = self.fetch_document().await.and_then(ProviderMetadata::try_from);
        match result {
            Ok(metadata) => {
                info!(issuer = %metadata.issuer, "Provider metadata resolved");
                Ok(Arc::new(metadata))
            }
            Err(err) => {
                warn!(url = %self.discovery_url, error = %err, "Provider discovery failed");
                Err(err)
            }
        }
    }

    async fn fetch_document(&self) -> Result<DiscoveryDocument, AuthError> {
        let response = self
            .client
            .get(&self.discovery_url)
            .send()
            .await
            .map_err(|e| AuthError::MetadataUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| AuthError::MetadataUnavailable(e.to_string()))?;

        response
            .json::<DiscoveryDocument>()
            .await
            .map_err(|e| AuthError::MetadataUnavailable(format!("invalid discovery document: {e}")))
    }
}
