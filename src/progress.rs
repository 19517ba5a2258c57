//! # Progress Bar and Statistics Module
//!
//! Questo modulo gestisce la progress bar e le statistiche di un'ingestione.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` per feedback real-time
//! - Statistiche aggregate a partire dai record di upload
//! - Riepilogo finale ("8 of 10 succeeded")
//!
//! ## Componenti principali:
//! - `ProgressManager`: Gestisce la progress bar principale
//! - `IngestStats`: Statistiche cumulative calcolate dai record
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [========================>---------------] 6/10 (60%) [OK] IMG_0042.jpg
//! ```

use crate::file_manager::FileManager;
use crate::pipeline::record::{UploadRecord, UploadStatus};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Manages progress reporting for an ingestion run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Set a custom message without incrementing
    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Statistics computed from the records of one run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestStats {
    pub files_submitted: usize,
    pub files_skipped: usize,
    pub files_uploaded: usize,
    pub files_failed: usize,
    pub total_original_size: u64,
    pub total_uploaded_size: u64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: &[UploadRecord], skipped: usize) -> Self {
        let mut stats = Self::new();
        stats.files_skipped = skipped;
        for record in records {
            stats.add_record(record);
        }
        stats
    }

    pub fn add_record(&mut self, record: &UploadRecord) {
        self.files_submitted += 1;
        match (&record.status, &record.asset) {
            (UploadStatus::Done, Some(asset)) => {
                self.files_uploaded += 1;
                self.total_original_size += record.original_size;
                self.total_uploaded_size += asset.bytes;
            }
            _ => self.files_failed += 1,
        }
    }

    /// Byte risparmiati dalla riduzione sui file caricati
    pub fn bytes_saved(&self) -> u64 {
        self.total_original_size.saturating_sub(self.total_uploaded_size)
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        if self.total_original_size > 0 {
            (self.bytes_saved() as f64 / self.total_original_size as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Uploaded: {} of {} | Failed: {} | Skipped: {} | Saved by reduction: {} ({:.2}%)",
            self.files_uploaded,
            self.files_submitted,
            self.files_failed,
            self.files_skipped,
            FileManager::format_size(self.bytes_saved()),
            self.overall_reduction_percent()
        )
    }
}
