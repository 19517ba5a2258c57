//! # Asset Uploader Module
//!
//! Wrapper attorno all'`AssetStore` che rende l'upload atomico dal punto di vista
//! del chiamante.
//!
//! ## Responsabilità:
//! - Valida il descrittore restituito dallo store (id e url non vuoti,
//!   dimensioni positive): un asset parziale non arriva mai all'`AssociationWriter`
//! - Retry opzionale con backoff lineare (`upload_retries`, default nessuno)
//! - Le dimensioni usate a valle sono SEMPRE quelle restituite dallo store,
//!   mai quelle dell'originale prima della riduzione

use crate::asset_store::{AssetStore, ProcessedAsset, UploadRequest};
use crate::config::Config;
use crate::error::{IngestError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Uploads bytes to the asset store and validates the returned descriptor
#[derive(Clone)]
pub struct AssetUploader {
    store: Arc<dyn AssetStore>,
    retries: u32,
    backoff: Duration,
}

impl AssetUploader {
    pub fn new(store: Arc<dyn AssetStore>) -> Self {
        Self {
            store,
            retries: 0,
            backoff: Duration::from_millis(0),
        }
    }

    pub fn from_config(store: Arc<dyn AssetStore>, config: &Config) -> Self {
        Self::new(store).with_retries(config.upload_retries, Duration::from_millis(config.retry_backoff_ms))
    }

    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    /// Upload and return a fully valid asset, or an error
    pub async fn upload(&self, request: UploadRequest) -> Result<ProcessedAsset> {
        let mut attempt = 0;
        loop {
            let result = self
                .store
                .upload(request.clone())
                .await
                .and_then(Self::validate);

            match result {
                Ok(asset) => return Ok(asset),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "⚠️ Upload of {} failed (attempt {}/{}): {}",
                        request.file_name,
                        attempt,
                        self.retries + 1,
                        e
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn validate(asset: ProcessedAsset) -> Result<ProcessedAsset> {
        if asset.id.trim().is_empty() {
            return Err(IngestError::InvalidAsset("empty id".to_string()));
        }
        if asset.url.trim().is_empty() {
            return Err(IngestError::InvalidAsset(format!("asset {} has an empty url", asset.id)));
        }
        if asset.width == 0 || asset.height == 0 {
            return Err(IngestError::InvalidAsset(format!(
                "asset {} has invalid dimensions {}x{}",
                asset.id, asset.width, asset.height
            )));
        }
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_store::UploadHints;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store finto: fallisce le prime `failures` chiamate, poi restituisce `asset`
    struct ScriptedStore {
        failures: usize,
        calls: AtomicUsize,
        asset: ProcessedAsset,
    }

    #[async_trait]
    impl AssetStore for ScriptedStore {
        async fn upload(&self, _request: UploadRequest) -> Result<ProcessedAsset> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(IngestError::Upload("connection reset".to_string()));
            }
            Ok(self.asset.clone())
        }
    }

    fn asset(width: u32) -> ProcessedAsset {
        ProcessedAsset {
            id: "ns/a/1".to_string(),
            url: "https://cdn/ns/a/1.jpg".to_string(),
            width,
            height: 10,
            bytes: 100,
        }
    }

    fn request() -> UploadRequest {
        UploadRequest {
            bytes: vec![1, 2, 3],
            folder: "ns/a".to_string(),
            file_name: "a.jpg".to_string(),
            hints: UploadHints::default(),
        }
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let store = Arc::new(ScriptedStore {
            failures: 1,
            calls: AtomicUsize::new(0),
            asset: asset(10),
        });
        let uploader = AssetUploader::new(store.clone());

        assert!(uploader.upload(request()).await.is_err());
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_transient_failure() {
        let store = Arc::new(ScriptedStore {
            failures: 2,
            calls: AtomicUsize::new(0),
            asset: asset(10),
        });
        let uploader = AssetUploader::new(store.clone()).with_retries(2, Duration::from_millis(1));

        let uploaded = uploader.upload(request()).await.unwrap();
        assert_eq!(uploaded, asset(10));
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalid_descriptor_is_an_error() {
        let store = Arc::new(ScriptedStore {
            failures: 0,
            calls: AtomicUsize::new(0),
            asset: asset(0),
        });
        let uploader = AssetUploader::new(store);

        let result = uploader.upload(request()).await;
        assert!(matches!(result, Err(IngestError::InvalidAsset(_))));
    }
}
