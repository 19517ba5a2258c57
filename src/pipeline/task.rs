//! # File Pipeline Module
//!
//! Worker per l'ingestione di un singolo file: extract → reduce → upload.
//! Pipeline lineare async/await, i punti di sospensione sono solo ai confini I/O
//! (handoff al blocking pool per la compressione, upload verso lo store).
//!
//! Qualsiasi errore viene catturato qui, al confine del file, e diventa un record
//! `failed`: la pipeline di un file non può interrompere le altre.

use crate::asset_store::{UploadHints, UploadRequest};
use crate::config::Config;
use crate::error::Result;
use crate::metadata::MetadataExtractor;
use crate::pipeline::progress_tracker::ProgressTracker;
use crate::pipeline::record::{SourceFile, UploadRecord, UploadStatus};
use crate::reducer::{ReductionOutcome, SizeReducer, REENCODED_MIME};
use crate::uploader::AssetUploader;
use std::time::Duration;
use tracing::{debug, error};

/// Pipeline per singolo file, condivisa (in lettura) da tutto il batch
#[derive(Clone)]
pub struct FilePipeline {
    reducer: SizeReducer,
    uploader: AssetUploader,
    timeout: Duration,
}

impl FilePipeline {
    pub fn new(reducer: SizeReducer, uploader: AssetUploader, timeout: Duration) -> Self {
        Self {
            reducer,
            uploader,
            timeout,
        }
    }

    pub fn from_config(config: &Config, uploader: AssetUploader) -> Self {
        Self::new(
            SizeReducer::from_config(config),
            uploader,
            Duration::from_secs(config.file_timeout_secs),
        )
    }

    /// Processa un singolo file e restituisce il suo record in stato terminale
    pub async fn run(
        &self,
        ordinal: usize,
        file: SourceFile,
        folder: &str,
        progress: &ProgressTracker,
    ) -> UploadRecord {
        let mut record = UploadRecord::new(ordinal, &file);
        progress.file_started(ordinal, &file.name, file.size()).await;

        let result = tokio::time::timeout(self.timeout, self.process(&mut record, file, folder)).await;

        match result {
            Ok(Ok(())) => debug!("[OK] {} -> {:?}", record.file_name, record.asset.as_ref().map(|a| &a.id)),
            Ok(Err(e)) => {
                error!("Failed to ingest {}: {}", record.file_name, e);
                record.fail(e.to_string());
            }
            Err(_) => {
                error!("File processing timed out after {:?}: {}", self.timeout, record.file_name);
                record.fail(format!("processing timed out after {}s", self.timeout.as_secs()));
            }
        }

        progress.file_finished(&record).await;
        record
    }

    async fn process(&self, record: &mut UploadRecord, file: SourceFile, folder: &str) -> Result<()> {
        // EXIF prima di qualsiasi ricompressione
        record.advance(UploadStatus::Extracting)?;
        record.metadata = MetadataExtractor::extract(&file.bytes);

        let SourceFile { name, mut mime, bytes } = file;

        let bytes = if self.reducer.needs_reduction(bytes.len() as u64) {
            record.advance(UploadStatus::Compressing)?;
            let reduction = self.reducer.reduce(bytes).await;
            match &reduction.outcome {
                ReductionOutcome::Reencoded { width, height } => {
                    debug!(
                        "Reduced {} {} -> {} bytes ({}x{})",
                        name,
                        record.original_size,
                        reduction.bytes.len(),
                        width,
                        height
                    );
                    mime = REENCODED_MIME.to_string();
                }
                ReductionOutcome::Fallback(reason) => {
                    debug!("Uploading original bytes of {}: {}", name, reason);
                }
                ReductionOutcome::Passthrough => {}
            }
            reduction.bytes
        } else {
            bytes
        };

        record.advance(UploadStatus::Uploading)?;
        let asset = self
            .uploader
            .upload(UploadRequest {
                bytes,
                folder: folder.to_string(),
                file_name: name,
                hints: UploadHints {
                    mime: Some(mime),
                    metadata: (!record.metadata.is_empty()).then(|| record.metadata.clone()),
                },
            })
            .await?;

        record.complete(asset)
    }
}
