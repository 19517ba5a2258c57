//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione della pipeline di ingestione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri di ingestione
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `batch_width`: File elaborati in parallelo per batch (default: 3)
//! - `byte_budget`: Sotto questa dimensione nessuna ricompressione (default: 4 MiB)
//! - `max_long_edge`: Lato lungo massimo dopo la riduzione (default: 2560)
//! - `jpeg_quality`: Qualità JPEG della ricompressione (1-100, default: 85)
//! - `namespace`: Radice dei folder sull'asset store (default: "portfolio")
//! - `asset_root` / `asset_base_url`: Dove e come vengono pubblicati gli asset
//! - `catalog_path`: File JSON del catalogo collezioni
//! - `upload_retries` / `retry_backoff_ms`: Retry sugli upload falliti (default: nessuno)
//! - `reorder_retries`: Tentativi di un riordino completo (default: 2)
//! - `file_timeout_secs`: Timeout per la pipeline di un singolo file (default: 300)
//! - `json_output`: Eventi JSON su stdout invece della progress bar
//! - `dry_run`: Asset store in memoria, nessun file scritto
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     batch_width: 4,
//!     jpeg_quality: 90,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for media ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of files processed concurrently in one batch
    pub batch_width: usize,
    /// Files at or below this size are uploaded untouched
    pub byte_budget: u64,
    /// Long edge cap (pixels) applied when a file is re-encoded
    pub max_long_edge: u32,
    /// JPEG quality used for re-encoding (1-100)
    pub jpeg_quality: u8,
    /// Root folder on the asset store
    pub namespace: String,
    /// Directory backing the local asset store
    pub asset_root: PathBuf,
    /// Public URL prefix for uploaded assets (None = file path)
    pub asset_base_url: Option<String>,
    /// JSON catalog with collections and associations
    pub catalog_path: PathBuf,
    /// Extra upload attempts after a failure
    pub upload_retries: u32,
    /// Linear backoff between upload attempts
    pub retry_backoff_ms: u64,
    /// Extra attempts for a whole reorder operation
    pub reorder_retries: u32,
    /// Per-file pipeline timeout
    pub file_timeout_secs: u64,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
    /// Dry run - keep uploads in memory
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        let base = default_base_dir();
        Self {
            batch_width: 3,
            byte_budget: 4 * 1024 * 1024,
            max_long_edge: 2560,
            jpeg_quality: 85,
            namespace: "portfolio".to_string(),
            asset_root: base.join("assets"),
            asset_base_url: None,
            catalog_path: base.join("catalog.json"),
            upload_retries: 0,
            retry_backoff_ms: 500,
            reorder_retries: 2,
            file_timeout_secs: 300,
            json_output: false,
            dry_run: false,
        }
    }
}

/// `~/.photo-ingest`, oppure la directory corrente se la home non è disponibile
fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".photo-ingest")
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.batch_width == 0 {
            return Err(anyhow::anyhow!("Batch width must be greater than 0"));
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(anyhow::anyhow!("JPEG quality must be between 1 and 100"));
        }

        if self.byte_budget == 0 {
            return Err(anyhow::anyhow!("Byte budget must be greater than 0"));
        }

        if self.max_long_edge == 0 {
            return Err(anyhow::anyhow!("Max long edge must be greater than 0"));
        }

        if self.file_timeout_secs == 0 {
            return Err(anyhow::anyhow!("File timeout must be greater than 0"));
        }

        let namespace = self.namespace.trim_matches('/');
        if namespace.is_empty() || namespace.contains("//") {
            return Err(anyhow::anyhow!("Namespace must be a non-empty folder path"));
        }

        Ok(())
    }

    /// Namespace senza slash iniziali/finali
    pub fn namespace(&self) -> &str {
        self.namespace.trim_matches('/')
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
