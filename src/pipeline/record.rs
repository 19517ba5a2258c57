//! # Upload Record Module
//!
//! File sorgente e record di upload con la relativa state machine.
//!
//! ```text
//! pending → extracting → (compressing) → uploading → done
//!     \_________\______________\______________\____→ failed
//! ```
//!
//! `done` e `failed` sono terminali: nessuna transizione ne esce.

use crate::asset_store::ProcessedAsset;
use crate::error::{IngestError, Result};
use crate::metadata::ExtractedMetadata;
use serde::{Deserialize, Serialize};

/// A file submitted for ingestion. Lives only for the duration of one call.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Mime dedotto dall'estensione del nome file
    pub fn from_name(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime = mime_guess::from_path(&name)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();
        Self { name, mime, bytes }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Controllo sul tipo immagine: mime dichiarato, poi estensione se il mime è generico
    pub fn is_image(&self) -> bool {
        let declared = self.mime.trim().to_ascii_lowercase();
        if declared.starts_with("image/") {
            return true;
        }
        if !declared.is_empty() && declared != "application/octet-stream" {
            return false;
        }
        mime_guess::from_path(&self.name)
            .first()
            .map(|m| m.type_() == mime_guess::mime::IMAGE)
            .unwrap_or(false)
    }
}

/// Lifecycle state of one upload record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Extracting,
    Compressing,
    Uploading,
    Done,
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Transizioni consentite dalla state machine
    pub fn can_transition_to(self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Pending, Extracting) => true,
            (Extracting, Compressing) | (Extracting, Uploading) => true,
            (Compressing, Uploading) => true,
            (Uploading, Done) => true,
            _ => false,
        }
    }
}

/// Per-file result of an ingestion call. `ordinal` is the submission position
/// and never changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub ordinal: usize,
    pub file_name: String,
    pub mime: String,
    pub original_size: u64,
    pub metadata: ExtractedMetadata,
    pub asset: Option<ProcessedAsset>,
    pub status: UploadStatus,
    pub error: Option<String>,
}

impl UploadRecord {
    pub fn new(ordinal: usize, file: &SourceFile) -> Self {
        Self {
            ordinal,
            file_name: file.name.clone(),
            mime: file.mime.clone(),
            original_size: file.size(),
            metadata: ExtractedMetadata::default(),
            asset: None,
            status: UploadStatus::Pending,
            error: None,
        }
    }

    pub fn advance(&mut self, next: UploadStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(IngestError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Stato `done` con l'asset caricato
    pub fn complete(&mut self, asset: ProcessedAsset) -> Result<()> {
        self.advance(UploadStatus::Done)?;
        self.asset = Some(asset);
        Ok(())
    }

    /// Porta il record in `failed`. Su un record già terminale non fa nulla.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = UploadStatus::Failed;
        self.error = Some(message.into());
    }

    pub fn is_done(&self) -> bool {
        self.status == UploadStatus::Done
    }
}
