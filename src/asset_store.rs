//! # Asset Store Module
//!
//! Astrazione dello store remoto che ospita le immagini pubblicate.
//!
//! ## Responsabilità:
//! - Definisce il trait `AssetStore`: `(bytes, folder, hints) -> {id, url, width, height}`
//! - `LocalAssetStore`: store su directory, un file per asset con id content-addressed
//! - `MemoryAssetStore`: store in memoria per dry run e test
//!
//! ## Convenzione dei path:
//! L'id di un asset è `folder/<hash>`, quindi chiunque ispezioni lo store può
//! ricostruire il path della collezione proprietaria (`namespace/antenati.../slug`)
//! dalla sola stringa.
//!
//! ## Atomicità:
//! `LocalAssetStore` scrive prima il sidecar JSON, poi l'asset su file temporaneo
//! seguito da rename: un asset è visibile solo quando è completo, e un upload
//! fallito non lascia asset nello store.

use crate::error::{IngestError, Result};
use crate::metadata::ExtractedMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

/// Uploaded asset descriptor as returned by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedAsset {
    pub id: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub bytes: u64,
}

/// Everything the store needs for one upload
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Vec<u8>,
    pub folder: String,
    pub file_name: String,
    pub hints: UploadHints,
}

/// Informazioni opzionali passate allo store insieme ai bytes
#[derive(Debug, Clone, Default)]
pub struct UploadHints {
    pub mime: Option<String>,
    pub metadata: Option<ExtractedMetadata>,
}

/// Remote asset store (external collaborator)
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> Result<ProcessedAsset>;
}

/// Dimensioni lette dall'header dell'immagine
pub fn image_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    let reader = image::io::Reader::new(Cursor::new(bytes)).with_guessed_format()?;
    Ok(reader.into_dimensions()?)
}

/// Prime 16 cifre hex dello SHA-256 del contenuto
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Estensione dedotta dal contenuto, poi dal nome file
fn extension_for(bytes: &[u8], file_name: &str) -> String {
    if let Ok(format) = image::guess_format(bytes) {
        if let Some(ext) = format.extensions_str().first() {
            return (*ext).to_string();
        }
    }
    Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

/// Asset store backed by a local directory (`<root>/<folder>/<hash>.<ext>`)
pub struct LocalAssetStore {
    root: PathBuf,
    base_url: Option<String>,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    fn url_for(&self, relative: &str, path: &Path) -> String {
        match &self.base_url {
            Some(base) => format!("{}/{}", base, relative),
            None => format!("file://{}", path.display()),
        }
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn upload(&self, request: UploadRequest) -> Result<ProcessedAsset> {
        let (width, height) = image_dimensions(&request.bytes)
            .map_err(|e| IngestError::Upload(format!("{}: not a decodable image: {}", request.file_name, e)))?;

        let folder = request.folder.trim_matches('/');
        let hash = content_hash(&request.bytes);
        let ext = extension_for(&request.bytes, &request.file_name);
        let relative = format!("{}/{}.{}", folder, hash, ext);

        let dir = self.root.join(folder);
        fs::create_dir_all(&dir).await?;

        // Sidecar con nome originale e metadata EXIF, scritto prima dell'asset
        let sidecar = serde_json::json!({
            "original_name": request.file_name,
            "mime": request.hints.mime,
            "metadata": request.hints.metadata,
        });
        let sidecar_path = dir.join(format!("{}.json", hash));
        fs::write(&sidecar_path, serde_json::to_vec_pretty(&sidecar)?).await?;

        let final_path = dir.join(format!("{}.{}", hash, ext));
        let replacing = final_path.exists();
        let tmp_path = dir.join(format!(".{}.{}.part", hash, uuid::Uuid::new_v4()));
        let stored = match fs::write(&tmp_path, &request.bytes).await {
            Ok(()) => fs::rename(&tmp_path, &final_path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            let _ = fs::remove_file(&tmp_path).await;
            if !replacing {
                let _ = fs::remove_file(&sidecar_path).await;
            }
            return Err(e.into());
        }

        debug!("Stored asset {} ({}x{})", relative, width, height);

        Ok(ProcessedAsset {
            id: format!("{}/{}", folder, hash),
            url: self.url_for(&relative, &final_path),
            width,
            height,
            bytes: request.bytes.len() as u64,
        })
    }
}

/// Asset store kept in memory
#[derive(Default)]
pub struct MemoryAssetStore {
    assets: Mutex<HashMap<String, (ProcessedAsset, Vec<u8>)>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.assets.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.assets.lock().await.is_empty()
    }

    pub async fn get(&self, id: &str) -> Option<(ProcessedAsset, Vec<u8>)> {
        self.assets.lock().await.get(id).cloned()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn upload(&self, request: UploadRequest) -> Result<ProcessedAsset> {
        let (width, height) = image_dimensions(&request.bytes)
            .map_err(|e| IngestError::Upload(format!("{}: not a decodable image: {}", request.file_name, e)))?;

        let folder = request.folder.trim_matches('/');
        let id = format!("{}/{}", folder, content_hash(&request.bytes));
        let asset = ProcessedAsset {
            url: format!("memory://{}", id),
            id: id.clone(),
            width,
            height,
            bytes: request.bytes.len() as u64,
        };

        self.assets.lock().await.insert(id, (asset.clone(), request.bytes));
        Ok(asset)
    }
}
