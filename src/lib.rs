//! # Portfolio Ingest Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche
//! della pipeline di ingestione foto del portfolio.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom dell'ingestione
//! - `metadata`: Estrazione EXIF (camera, lente, esposizione, GPS, data)
//! - `reducer`: Ricompressione dei file oltre il budget di byte
//! - `asset_store` / `uploader`: Store remoto degli asset e upload validato
//! - `collections`: Albero delle collezioni e catalogo delle associazioni
//! - `association`: Collegamento ordinato, riordino e rimozione
//! - `pipeline`: Pipeline per file e orchestratore a batch
//! - `ingest`: Servizio di alto livello e report finale
//! - `file_manager`, `progress`, `json_output`: Supporto alla CLI
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use portfolio_ingest::{Config, IngestService, JsonCatalog, LocalAssetStore};
//!
//! let config = Config::default();
//! let store = Arc::new(LocalAssetStore::new(&config.asset_root, config.asset_base_url.clone()));
//! let catalog = Arc::new(JsonCatalog::open(&config.catalog_path).await?);
//! let service = IngestService::new(&config, store, catalog);
//! let report = service.ingest_into_collection(&collection_id, files).await?;
//! println!("{}", report.summary());
//! ```

pub mod asset_store;
pub mod association;
pub mod collections;
pub mod config;
pub mod error;
pub mod file_manager;
pub mod ingest;
pub mod json_output;
pub mod metadata;
pub mod pipeline;
pub mod progress;
pub mod reducer;
pub mod uploader;

pub use asset_store::{AssetStore, LocalAssetStore, MemoryAssetStore, ProcessedAsset};
pub use association::{AssociationWriter, AttachOutcome};
pub use collections::{CatalogStore, CollectionNode, CollectionTree, JsonCatalog, PhotoAssetAssociation};
pub use config::Config;
pub use error::IngestError;
pub use ingest::{IngestReport, IngestService};
pub use metadata::{ExtractedMetadata, MetadataExtractor};
pub use pipeline::{BatchOrchestrator, ProgressSink, SourceFile, UploadRecord, UploadStatus};
pub use reducer::SizeReducer;
pub use uploader::AssetUploader;
