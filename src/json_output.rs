//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per il pannello admin del CMS.
//!
//! ## Responsabilità:
//! - Emette messaggi JSON strutturati (una riga per evento) su stdout
//! - Riusa `UploadRecord` e `IngestStats` come sorgente dei dati
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio ingestione con folder di destinazione
//! - `file_start`: Inizio elaborazione di un file
//! - `file_complete`: Fine elaborazione di un file (done o failed)
//! - `progress`: Progresso corrente (completed/total, file in corso)
//! - `complete`: Fine ingestione con riepilogo e asset orfani
//! - `error`: Errore generale

use crate::pipeline::record::{UploadRecord, UploadStatus};
use crate::progress::IngestStats;
use serde::{Deserialize, Serialize};

/// Tipo di messaggio JSON
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    #[serde(rename = "start")]
    Start {
        folder: String,
        total_files: usize,
        skipped_files: Vec<String>,
        batch_width: usize,
    },

    #[serde(rename = "file_start")]
    FileStart {
        name: String,
        size: u64,
        index: usize,
        total: usize,
    },

    #[serde(rename = "file_complete")]
    FileComplete {
        name: String,
        index: usize,
        status: UploadStatus,
        asset_id: Option<String>,
        url: Option<String>,
        error: Option<String>,
    },

    #[serde(rename = "progress")]
    Progress {
        completed: usize,
        total: usize,
        percentage: f64,
        failed: usize,
        current_files: Vec<String>,
    },

    #[serde(rename = "complete")]
    Complete {
        summary: String,
        files_uploaded: usize,
        files_failed: usize,
        files_skipped: usize,
        bytes_saved: u64,
        associations_created: usize,
        failed_files: Vec<String>,
        orphaned_assets: Vec<String>,
        cancelled: bool,
    },

    #[serde(rename = "error")]
    Error {
        message: String,
        details: Option<String>,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(folder: String, total_files: usize, skipped_files: Vec<String>, batch_width: usize) -> Self {
        Self::Start {
            folder,
            total_files,
            skipped_files,
            batch_width,
        }
    }

    pub fn file_start(name: String, size: u64, index: usize, total: usize) -> Self {
        Self::FileStart {
            name,
            size,
            index,
            total,
        }
    }

    pub fn file_complete(record: &UploadRecord) -> Self {
        Self::FileComplete {
            name: record.file_name.clone(),
            index: record.ordinal,
            status: record.status,
            asset_id: record.asset.as_ref().map(|a| a.id.clone()),
            url: record.asset.as_ref().map(|a| a.url.clone()),
            error: record.error.clone(),
        }
    }

    pub fn progress(completed: usize, total: usize, failed: usize, current_files: Vec<String>) -> Self {
        let percentage = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        Self::Progress {
            completed,
            total,
            percentage,
            failed,
            current_files,
        }
    }

    pub fn complete(
        summary: String,
        stats: &IngestStats,
        associations_created: usize,
        failed_files: Vec<String>,
        orphaned_assets: Vec<String>,
        cancelled: bool,
    ) -> Self {
        Self::Complete {
            summary,
            files_uploaded: stats.files_uploaded,
            files_failed: stats.files_failed,
            files_skipped: stats.files_skipped,
            bytes_saved: stats.bytes_saved(),
            associations_created,
            failed_files,
            orphaned_assets,
            cancelled,
        }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}
