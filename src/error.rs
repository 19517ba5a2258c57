//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della pipeline di ingestione.
//!
//! ## Responsabilità:
//! - Definisce `IngestError` enum per categorizzare tutti gli errori possibili
//! - Fornisce messaggi di errore descrittivi e strutturati
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `Io`, `Image`, `Serialization`: errori delle librerie sottostanti
//! - `Upload`, `InvalidAsset`: fallimenti dell'asset store (errori "hard" per il record)
//! - `Catalog`, `OrderConflict`, `InvalidPermutation`: errori del catalogo collezioni
//! - `UnknownCollection`, `CycleDetected`: errori dell'albero delle collezioni
//! - `InvalidTransition`: violazione della state machine di un `UploadRecord`
//! - `Validation`: errori di validazione input
//!
//! ## Errori "soft":
//! Estrazione EXIF e compressione non producono mai un `IngestError` verso il chiamante:
//! il fallback (metadata vuoti / bytes originali) viene deciso nel modulo stesso.

use crate::pipeline::record::UploadStatus;

/// Custom error types for media ingestion
#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Asset store returned an invalid asset: {0}")]
    InvalidAsset(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Order {order} already used in collection {collection_id}")]
    OrderConflict { collection_id: String, order: i64 },

    #[error("Invalid reorder for collection {collection_id}: {reason}")]
    InvalidPermutation { collection_id: String, reason: String },

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Collection tree contains a cycle through {0}")]
    CycleDetected(String),

    #[error("Invalid record transition {from:?} -> {to:?}")]
    InvalidTransition { from: UploadStatus, to: UploadStatus },

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, IngestError>;
