//! Access tokens for Google APIs

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{GcpError, Result};

const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before they actually expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// A fixed bearer token, e.g. from `gcloud auth print-access-token`
#[derive(Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(GcpError::Config("access token is empty".to_string()));
        }
        Ok(Self { token })
    }
}

impl std::fmt::Debug for StaticTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenSource").finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Default service-account token from the compute metadata server
pub struct MetadataTokenSource {
    client: Client,
    endpoint: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataTokenSource {
    pub fn new(client: Client, metadata_host: &str) -> Self {
        Self {
            client,
            endpoint: format!("http://{}{}", metadata_host, TOKEN_PATH),
            cached: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn cached_token(&self) -> Option<String> {
        self.cached
            .lock()
            .as_ref()
            .filter(|c| Instant::now() < c.refresh_at)
            .map(|c| c.token.clone())
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let response = self
            .client
            .get(&self.endpoint)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        if !response.status().is_success() {
            let err = GcpError::from_response(response).await;
            return Err(GcpError::Auth(err.to_string()));
        }

        let body: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(EXPIRY_MARGIN);
        debug!(expires_in = body.expires_in, "Fetched metadata access token");

        *self.cached.lock() = Some(CachedToken {
            token: body.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(body.access_token)
    }
}

/// Pick a token source from the environment: `GOOGLE_OAUTH_ACCESS_TOKEN`
/// when set, the metadata server (`GCE_METADATA_HOST` overrides its host) otherwise.
pub fn token_source_from_env(client: Client) -> Result<Arc<dyn TokenSource>> {
    if let Ok(token) = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN") {
        return Ok(Arc::new(StaticTokenSource::new(token)?));
    }

    let host = std::env::var("GCE_METADATA_HOST")
        .unwrap_or_else(|_| DEFAULT_METADATA_HOST.to_string());
    Ok(Arc::new(MetadataTokenSource::new(client, &host)))
}
