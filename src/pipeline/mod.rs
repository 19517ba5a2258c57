//! # Ingestion Pipeline Module
//!
//! Orchestratore principale dell'ingestione, diviso in moduli specializzati.
//!
//! - `record`: file sorgente, record di upload e state machine
//! - `folder`: strategia di risoluzione del folder di destinazione
//! - `task`: pipeline per singolo file (extract → reduce → upload)
//! - `orchestrator`: esecuzione a batch con larghezza limitata e cancellazione
//! - `progress_tracker`: progresso condiviso e thread-safe

pub mod folder;
pub mod orchestrator;
pub mod progress_tracker;
pub mod record;
pub mod task;

pub use folder::{CollectionFolder, FixedFolder, FolderStrategy};
pub use orchestrator::{BatchOrchestrator, BatchOutcome};
pub use progress_tracker::{ProgressSink, ProgressSnapshot, ProgressTracker};
pub use record::{SourceFile, UploadRecord, UploadStatus};
pub use task::FilePipeline;
