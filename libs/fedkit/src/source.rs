//! Where manifest bytes come from.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use fedkit_http::{HttpClient, HttpError};
use thiserror::Error;

use crate::descriptor::RemoteDescriptor;
use crate::manifest::RemoteManifest;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FetchError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("manifest unavailable: {0}")]
    Unavailable(String),
}

/// Retrieves the raw manifest published at a remote's locator.
///
/// Implementations report transport problems only; parsing is left to the
/// loader so every source shares the same validation.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch(&self, remote: &RemoteDescriptor) -> Result<Bytes, FetchError>;
}

/// Fetches manifests over HTTP(S) with [`HttpClient`].
#[derive(Clone)]
pub struct HttpManifestSource {
    client: HttpClient,
}

impl HttpManifestSource {
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch(&self, remote: &RemoteDescriptor) -> Result<Bytes, FetchError> {
        tracing::debug!(remote = %remote.name, locator = %remote.locator, "fetching manifest");
        let bytes = self
            .client
            .get(&remote.locator)
            .header("accept", "application/json")
            .send()
            .await?
            .checked_bytes()
            .await
            .inspect_err(|err| {
                if err.is_response_error() {
                    tracing::debug!(
                        remote = %remote.name,
                        status = ?err.status(),
                        "remote answered with an unusable manifest response"
                    );
                }
            })?;
        Ok(bytes)
    }
}

/// In-memory manifests keyed by locator, for embedding and tests.
#[derive(Default, Clone)]
pub struct StaticManifestSource {
    entries: HashMap<String, Result<Bytes, String>>,
}

impl StaticManifestSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `manifest` at `locator`.
    ///
    /// # Errors
    /// Returns the serialization error if the manifest cannot be encoded.
    pub fn with_manifest(
        self,
        locator: impl Into<String>,
        manifest: &RemoteManifest,
    ) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_vec(manifest)?;
        Ok(self.with_raw(locator, json))
    }

    /// Serve arbitrary bytes at `locator`.
    #[must_use]
    pub fn with_raw(mut self, locator: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.entries.insert(locator.into(), Ok(body.into()));
        self
    }

    /// Make every fetch of `locator` fail as a transport error.
    #[must_use]
    pub fn with_failure(mut self, locator: impl Into<String>, message: impl Into<String>) -> Self {
        self.entries.insert(locator.into(), Err(message.into()));
        self
    }
}

#[async_trait]
impl ManifestSource for StaticManifestSource {
    async fn fetch(&self, remote: &RemoteDescriptor) -> Result<Bytes, FetchError> {
        match self.entries.get(&remote.locator) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(message)) => Err(FetchError::Unavailable(message.clone())),
            None => Err(FetchError::Unavailable(format!(
                "nothing published at {}",
                remote.locator
            ))),
        }
    }
}
