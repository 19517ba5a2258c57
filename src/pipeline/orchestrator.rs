//! # Batch Orchestrator
//!
//! Esegue le pipeline per file in batch a larghezza limitata.
//!
//! ## Responsabilità:
//! - Filtra i file non immagine prima di qualsiasi lavoro (vengono segnalati come `skipped`)
//! - Risolve il folder di destinazione una sola volta per chiamata
//! - Avvia al massimo `batch_width` pipeline alla volta; il batch successivo parte
//!   solo quando tutte le pipeline del precedente sono terminali
//! - Raccoglie i record in ordine di sottomissione, indipendentemente dall'ordine
//!   di completamento
//! - Supporta la cancellazione via broadcast channel: controllata prima di ogni batch.
//!   Uno stop che arriva durante l'ultimo batch non cancella nulla: tutti i file
//!   sono già stati avviati e il risultato è quello di una chiamata completa

use crate::config::Config;
use crate::error::{IngestError, Result};
use crate::pipeline::folder::FolderStrategy;
use crate::pipeline::progress_tracker::{ProgressSink, ProgressSnapshot, ProgressTracker};
use crate::pipeline::record::{SourceFile, UploadRecord};
use crate::pipeline::task::FilePipeline;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Result of one orchestrated run
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Folder risolto per tutti i file della chiamata
    pub folder: String,
    /// Un record per ogni file immagine accettato, in ordine di sottomissione
    pub records: Vec<UploadRecord>,
    /// Nomi dei file scartati perché non immagini
    pub skipped: Vec<String>,
    pub cancelled: bool,
}

pub struct BatchOrchestrator {
    pipeline: FilePipeline,
    batch_width: usize,
    stop_receiver: Option<broadcast::Receiver<()>>,
    stopped: bool,
    sink: ProgressSink,
    snapshots: Arc<watch::Sender<ProgressSnapshot>>,
}

impl BatchOrchestrator {
    pub fn new(pipeline: FilePipeline, batch_width: usize) -> Self {
        let (snapshots, _) = watch::channel(ProgressSnapshot::default());
        Self {
            pipeline,
            batch_width: batch_width.max(1),
            stop_receiver: None,
            stopped: false,
            sink: ProgressSink::Silent,
            snapshots: Arc::new(snapshots),
        }
    }

    pub fn from_config(config: &Config, pipeline: FilePipeline) -> Self {
        Self::new(pipeline, config.batch_width)
    }

    pub fn with_cancellation(mut self, stop_receiver: broadcast::Receiver<()>) -> Self {
        self.stop_receiver = Some(stop_receiver);
        self
    }

    pub fn with_progress_sink(mut self, sink: ProgressSink) -> Self {
        self.sink = sink;
        self
    }

    /// Osservatore unico dello stato di avanzamento
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn batch_width(&self) -> usize {
        self.batch_width
    }

    // Il segnale viene memorizzato: una volta fermi si resta fermi
    fn should_stop(&mut self) -> bool {
        if self.stopped {
            return true;
        }
        if let Some(ref mut receiver) = self.stop_receiver {
            match receiver.try_recv() {
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    self.stopped = true;
                }
                Err(broadcast::error::TryRecvError::Empty) | Err(broadcast::error::TryRecvError::Closed) => {}
            }
        }
        self.stopped
    }

    /// Run every image in `files` through the pipeline.
    ///
    /// Fails only if the destination folder cannot be resolved, in which case no
    /// file is touched. Per-file failures end up in the returned records.
    pub async fn run(&mut self, files: Vec<SourceFile>, folder: &dyn FolderStrategy) -> Result<BatchOutcome> {
        let (accepted, skipped): (Vec<SourceFile>, Vec<SourceFile>) = files.into_iter().partition(|f| f.is_image());
        let skipped: Vec<String> = skipped.into_iter().map(|f| f.name).collect();

        for name in &skipped {
            warn!("⚠️ Skipping non-image file: {}", name);
        }

        let folder = folder.resolve().await?;
        if folder.is_empty() {
            return Err(IngestError::Validation("destination folder is empty".to_string()));
        }

        info!(
            "📦 Ingesting {} files into {} ({} per batch, {} skipped)",
            accepted.len(),
            folder,
            self.batch_width,
            skipped.len()
        );

        let total = accepted.len();
        let tracker = ProgressTracker::new(total, self.sink.clone(), Arc::clone(&self.snapshots));
        let mut slots: Vec<Option<UploadRecord>> = vec![None; total];

        let mut pending = accepted.into_iter().enumerate().peekable();
        let mut batch_index = 0;

        while pending.peek().is_some() {
            if self.should_stop() {
                info!("🛑 Stop signal received, no further batches will start");
                break;
            }

            let batch: Vec<(usize, SourceFile)> = pending.by_ref().take(self.batch_width).collect();
            batch_index += 1;
            debug!("Starting batch {} with {} files", batch_index, batch.len());

            let pipeline = &self.pipeline;
            let tracker_ref = &tracker;
            let folder_ref = folder.as_str();
            let finished = join_all(
                batch
                    .into_iter()
                    .map(|(ordinal, file)| async move { pipeline.run(ordinal, file, folder_ref, tracker_ref).await }),
            )
            .await;

            for record in finished {
                let ordinal = record.ordinal;
                slots[ordinal] = Some(record);
            }
        }

        // Cancellata solo se lo stop ha lasciato file non avviati
        let cancelled = pending.peek().is_some();

        // I file mai avviati restano nel risultato come falliti
        let records: Vec<UploadRecord> = pending
            .map(|(ordinal, file)| {
                let mut record = UploadRecord::new(ordinal, &file);
                record.fail("cancelled before start");
                (ordinal, record)
            })
            .fold(slots, |mut slots, (ordinal, record)| {
                slots[ordinal] = Some(record);
                slots
            })
            .into_iter()
            .flatten()
            .collect();

        let done = records.iter().filter(|r| r.is_done()).count();
        let summary = format!("{} of {} succeeded", done, records.len());
        tracker.finish(&summary);

        if cancelled {
            warn!("⚠️ Ingestion cancelled: {}", summary);
        } else {
            info!("✅ Ingestion finished: {}", summary);
        }

        Ok(BatchOutcome {
            folder,
            records,
            skipped,
            cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_store::{AssetStore, MemoryAssetStore, ProcessedAsset, UploadRequest};
    use crate::pipeline::folder::FixedFolder;
    use crate::pipeline::record::UploadStatus;
    use crate::reducer::SizeReducer;
    use crate::uploader::AssetUploader;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageOutputFormat, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn png(seed: u8) -> Vec<u8> {
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 6, image::Rgb([seed, 10, 20])))
            .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
            .unwrap();
        out
    }

    fn image_file(name: &str, seed: u8) -> SourceFile {
        SourceFile::new(name, "image/png", png(seed))
    }

    fn orchestrator(store: Arc<dyn AssetStore>, width: usize) -> BatchOrchestrator {
        let pipeline = FilePipeline::new(
            SizeReducer::new(10 * 1024 * 1024, 2560, 85),
            AssetUploader::new(store),
            Duration::from_secs(30),
        );
        BatchOrchestrator::new(pipeline, width)
    }

    /// Store che tiene traccia della concorrenza massima osservata e fallisce
    /// sui nomi che contengono "bad"
    #[derive(Default)]
    struct ObservedStore {
        inner: MemoryAssetStore,
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        stop: Option<broadcast::Sender<()>>,
    }

    #[async_trait]
    impl AssetStore for ObservedStore {
        async fn upload(&self, request: UploadRequest) -> crate::error::Result<ProcessedAsset> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);

            // Completamenti in ordine inverso rispetto alla sottomissione
            let delay = if request.file_name.starts_with('0') { 30 } else { 5 };
            tokio::time::sleep(Duration::from_millis(delay)).await;

            if let Some(stop) = &self.stop {
                let _ = stop.send(());
            }

            self.active.fetch_sub(1, Ordering::SeqCst);
            if request.file_name.contains("bad") {
                return Err(IngestError::Upload("rejected by store".to_string()));
            }
            self.inner.upload(request).await
        }
    }

    #[tokio::test]
    async fn test_records_keep_submission_order() {
        let store = Arc::new(ObservedStore::default());
        let mut orchestrator = orchestrator(store.clone(), 3);

        let files = vec![image_file("0.png", 1), image_file("1.png", 2), image_file("2.png", 3)];
        let outcome = orchestrator
            .run(files, &FixedFolder("ns/a".to_string()))
            .await
            .unwrap();

        let names: Vec<_> = outcome.records.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["0.png", "1.png", "2.png"]);
        let ordinals: Vec<_> = outcome.records.iter().map(|r| r.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert!(outcome.records.iter().all(|r| r.is_done()));
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn test_non_images_are_skipped_before_work() {
        let store = Arc::new(ObservedStore::default());
        let mut orchestrator = orchestrator(store.clone(), 3);

        let files = vec![
            image_file("a.png", 1),
            SourceFile::new("notes.txt", "text/plain", b"hello".to_vec()),
            image_file("b.png", 2),
            SourceFile::new("clip.mp4", "video/mp4", vec![0; 16]),
            image_file("c.png", 3),
        ];
        let outcome = orchestrator
            .run(files, &FixedFolder("ns/a".to_string()))
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.skipped, vec!["notes.txt".to_string(), "clip.mp4".to_string()]);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        let ordinals: Vec<_> = outcome.records.iter().map(|r| r.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_siblings() {
        let store = Arc::new(ObservedStore::default());
        let mut orchestrator = orchestrator(store.clone(), 3);

        let files = vec![image_file("a.png", 1), image_file("bad.png", 2), image_file("c.png", 3)];
        let outcome = orchestrator
            .run(files, &FixedFolder("ns/a".to_string()))
            .await
            .unwrap();

        let statuses: Vec<_> = outcome.records.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![UploadStatus::Done, UploadStatus::Failed, UploadStatus::Done]);
        assert!(outcome.records[1].error.as_deref().unwrap().contains("rejected"));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded_by_batch_width() {
        let store = Arc::new(ObservedStore::default());
        let mut orchestrator = orchestrator(store.clone(), 2);

        let files = (0..7).map(|i| image_file(&format!("f{}.png", i), i as u8)).collect();
        let outcome = orchestrator
            .run(files, &FixedFolder("ns/a".to_string()))
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 7);
        assert!(store.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(store.calls.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_next_batch() {
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let store = Arc::new(ObservedStore {
            stop: Some(stop_tx),
            ..Default::default()
        });
        let mut orchestrator = orchestrator(store.clone(), 1).with_cancellation(stop_rx);

        let files = vec![image_file("a.png", 1), image_file("b.png", 2), image_file("c.png", 3)];
        let outcome = orchestrator
            .run(files, &FixedFolder("ns/a".to_string()))
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.records.len(), 3);
        assert!(outcome.records[0].is_done());
        for record in &outcome.records[1..] {
            assert_eq!(record.status, UploadStatus::Failed);
            assert_eq!(record.error.as_deref(), Some("cancelled before start"));
        }
    }

    #[tokio::test]
    async fn test_stop_during_last_batch_is_not_a_cancellation() {
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let store = Arc::new(ObservedStore {
            stop: Some(stop_tx),
            ..Default::default()
        });
        let mut orchestrator = orchestrator(store.clone(), 2).with_cancellation(stop_rx);

        let files = vec![image_file("a.png", 1), image_file("b.png", 2)];
        let outcome = orchestrator
            .run(files, &FixedFolder("ns/a".to_string()))
            .await
            .unwrap();

        assert!(!outcome.cancelled);
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
        assert!(outcome.records.iter().all(|r| r.is_done()));
    }

    #[tokio::test]
    async fn test_snapshots_reach_the_observer() {
        let store = Arc::new(ObservedStore::default());
        let mut orchestrator = orchestrator(store, 2);
        let observer = orchestrator.subscribe();

        let files = vec![image_file("a.png", 1), image_file("b.png", 2)];
        orchestrator
            .run(files, &FixedFolder("ns/a".to_string()))
            .await
            .unwrap();

        let last = observer.borrow().clone();
        assert_eq!(last.completed, 2);
        assert_eq!(last.total, 2);
        assert!(last.current_files.is_empty());
    }
}
