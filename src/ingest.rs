//! # Ingest Service
//!
//! Punto d'ingresso dell'ingestione: compone orchestratore e association writer.
//!
//! ## Flussi:
//! - `ingest_into_collection`: folder derivato dall'albero, upload a batch, poi
//!   associazione dei record `done` in ordine di sottomissione
//! - `upload_to_folder`: uploader generico su folder fisso, nessuna associazione
//!
//! ## Garanzie del report:
//! - Un record per ogni file immagine accettato, in ordine di sottomissione
//! - Gli asset caricati ma non collegati (errore di associazione o cancellazione)
//!   sono elencati esplicitamente come orfani

use crate::asset_store::{AssetStore, ProcessedAsset};
use crate::association::{AssociationFailure, AssociationWriter, AttachOutcome};
use crate::collections::{CatalogStore, PhotoAssetAssociation};
use crate::config::Config;
use crate::error::Result;
use crate::json_output::JsonMessage;
use crate::pipeline::{
    BatchOrchestrator, BatchOutcome, CollectionFolder, FilePipeline, FixedFolder, FolderStrategy, ProgressSink,
    ProgressSnapshot, SourceFile, UploadRecord,
};
use crate::progress::IngestStats;
use crate::uploader::AssetUploader;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// An uploaded asset that could not be linked to its collection
#[derive(Debug, Clone, Serialize)]
pub struct UnlinkedAsset {
    pub ordinal: usize,
    pub file_name: String,
    pub asset: ProcessedAsset,
    pub message: String,
}

/// Risultato completo di una chiamata di ingestione
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub folder: String,
    pub records: Vec<UploadRecord>,
    pub skipped: Vec<String>,
    pub associations: Vec<PhotoAssetAssociation>,
    pub association_failures: Vec<UnlinkedAsset>,
    pub cancelled: bool,
    /// True se la chiamata doveva collegare gli asset a una collezione
    pub linked: bool,
}

impl IngestReport {
    fn from_outcome(outcome: BatchOutcome, linked: bool) -> Self {
        Self {
            folder: outcome.folder,
            records: outcome.records,
            skipped: outcome.skipped,
            associations: Vec::new(),
            association_failures: Vec::new(),
            cancelled: outcome.cancelled,
            linked,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.records.iter().filter(|r| r.is_done()).count()
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }

    /// "8 of 10 succeeded"
    pub fn summary(&self) -> String {
        format!("{} of {} succeeded", self.succeeded(), self.total())
    }

    pub fn failed_files(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| !r.is_done())
            .map(|r| match &r.error {
                Some(e) => format!("{}: {}", r.file_name, e),
                None => r.file_name.clone(),
            })
            .collect()
    }

    /// Asset presenti nello store senza un'associazione corrispondente
    pub fn orphaned_assets(&self) -> Vec<ProcessedAsset> {
        if !self.linked {
            return Vec::new();
        }
        self.records
            .iter()
            .filter_map(|r| r.asset.as_ref())
            .filter(|asset| !self.associations.iter().any(|a| a.asset_id == asset.id))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats::from_records(&self.records, self.skipped.len())
    }

    pub fn emit_json(&self) {
        JsonMessage::complete(
            self.summary(),
            &self.stats(),
            self.associations.len(),
            self.failed_files(),
            self.orphaned_assets().into_iter().map(|a| a.id).collect(),
            self.cancelled,
        )
        .emit();
    }
}

pub struct IngestService {
    config: Config,
    uploader: AssetUploader,
    writer: AssociationWriter,
    catalog: Arc<dyn CatalogStore>,
    stop_sender: Option<broadcast::Sender<()>>,
    sink: ProgressSink,
    snapshots: Arc<watch::Sender<ProgressSnapshot>>,
}

impl IngestService {
    pub fn new(config: &Config, store: Arc<dyn AssetStore>, catalog: Arc<dyn CatalogStore>) -> Self {
        let (snapshots, _) = watch::channel(ProgressSnapshot::default());
        Self {
            config: config.clone(),
            uploader: AssetUploader::from_config(store, config),
            writer: AssociationWriter::from_config(Arc::clone(&catalog), config),
            catalog,
            stop_sender: None,
            sink: ProgressSink::Silent,
            snapshots: Arc::new(snapshots),
        }
    }

    /// Ogni chiamata ottiene un proprio receiver dal sender condiviso
    pub fn with_cancellation(mut self, stop_sender: broadcast::Sender<()>) -> Self {
        self.stop_sender = Some(stop_sender);
        self
    }

    pub fn with_progress_sink(mut self, sink: ProgressSink) -> Self {
        self.sink = sink;
        self
    }

    /// Snapshot dell'ultima chiamata; l'osservatore viene aggiornato a ogni file
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn catalog(&self) -> Arc<dyn CatalogStore> {
        Arc::clone(&self.catalog)
    }

    pub fn writer(&self) -> &AssociationWriter {
        &self.writer
    }

    /// Upload `files` into the collection's folder and link every successful
    /// upload to it, in submission order.
    pub async fn ingest_into_collection(&self, collection_id: &str, files: Vec<SourceFile>) -> Result<IngestReport> {
        let folder = CollectionFolder::new(self.catalog(), collection_id, self.config.namespace());
        let outcome = self.run_batches(files, &folder).await?;
        let mut report = IngestReport::from_outcome(outcome, true);

        if report.cancelled {
            warn!("⚠️ Ingestion cancelled, uploaded assets are left unlinked");
            return Ok(report);
        }

        // Asset e record restano allineati per indice: due file identici
        // producono lo stesso id di asset
        let done: Vec<(&UploadRecord, ProcessedAsset)> = report
            .records
            .iter()
            .filter(|r| r.is_done())
            .filter_map(|r| r.asset.clone().map(|asset| (r, asset)))
            .collect();
        let assets: Vec<ProcessedAsset> = done.iter().map(|(_, asset)| asset.clone()).collect();

        // Gli asset sono già nello store: anche un errore globale finisce nel report
        let attached = match self.writer.attach(collection_id, &assets).await {
            Ok(attached) => attached,
            Err(e) => AttachOutcome {
                created: Vec::new(),
                failed: assets
                    .iter()
                    .enumerate()
                    .map(|(index, asset)| AssociationFailure {
                        index,
                        asset: asset.clone(),
                        message: e.to_string(),
                    })
                    .collect(),
            },
        };

        let failures = attached
            .failed
            .into_iter()
            .map(|failure| {
                let record = done.get(failure.index).map(|(record, _)| *record);
                UnlinkedAsset {
                    ordinal: record.map(|r| r.ordinal).unwrap_or_default(),
                    file_name: record.map(|r| r.file_name.clone()).unwrap_or_default(),
                    asset: failure.asset,
                    message: failure.message,
                }
            })
            .collect();

        report.associations = attached.created;
        report.association_failures = failures;

        for unlinked in &report.association_failures {
            warn!(
                "⚠️ Asset {} ({}) uploaded but not linked: {}",
                unlinked.asset.id, unlinked.file_name, unlinked.message
            );
        }
        info!("📸 {} into collection {}", report.summary(), collection_id);

        Ok(report)
    }

    /// Generic uploader: same pipeline, fixed folder, no association
    pub async fn upload_to_folder(&self, folder: &str, files: Vec<SourceFile>) -> Result<IngestReport> {
        let folder = FixedFolder(folder.to_string());
        let outcome = self.run_batches(files, &folder).await?;
        let report = IngestReport::from_outcome(outcome, false);
        info!("📤 {} into folder {}", report.summary(), report.folder);
        Ok(report)
    }

    async fn run_batches(&self, files: Vec<SourceFile>, folder: &dyn FolderStrategy) -> Result<BatchOutcome> {
        let pipeline = FilePipeline::from_config(&self.config, self.uploader.clone());
        let mut orchestrator =
            BatchOrchestrator::from_config(&self.config, pipeline).with_progress_sink(self.sink.clone());

        if let Some(sender) = &self.stop_sender {
            orchestrator = orchestrator.with_cancellation(sender.subscribe());
        }

        // Inoltra gli snapshot della chiamata all'osservatore del servizio
        let mut observer = orchestrator.subscribe();
        let forward = Arc::clone(&self.snapshots);
        let relay = tokio::spawn(async move {
            while observer.changed().await.is_ok() {
                let snapshot = observer.borrow_and_update().clone();
                forward.send_replace(snapshot);
            }
        });

        let result = orchestrator.run(files, folder).await;
        drop(orchestrator);
        let _ = relay.await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_store::{MemoryAssetStore, UploadRequest};
    use crate::collections::{JsonCatalog, NewCollection};
    use crate::error::IngestError;
    use crate::pipeline::UploadStatus;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageOutputFormat, RgbImage};
    use std::io::Cursor;
    use std::time::Duration;

    fn png(seed: u8) -> Vec<u8> {
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 8, image::Rgb([seed, 40, 90])))
            .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
            .unwrap();
        out
    }

    fn image_file(name: &str, seed: u8) -> SourceFile {
        SourceFile::new(name, "image/png", png(seed))
    }

    /// Store che rifiuta i file con "bad" nel nome e può emettere il segnale di stop
    #[derive(Default)]
    struct TestStore {
        inner: MemoryAssetStore,
        stop: Option<broadcast::Sender<()>>,
    }

    #[async_trait]
    impl AssetStore for TestStore {
        async fn upload(&self, request: UploadRequest) -> Result<ProcessedAsset> {
            if let Some(stop) = &self.stop {
                let _ = stop.send(());
            }
            if request.file_name.contains("bad") {
                return Err(IngestError::Upload("quota exceeded".to_string()));
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.inner.upload(request).await
        }
    }

    async fn collection(catalog: &JsonCatalog, slug: &str, parent: Option<String>) -> String {
        catalog
            .create_collection(NewCollection {
                title: slug.to_string(),
                slug: slug.to_string(),
                parent_id: parent,
            })
            .await
            .unwrap()
            .id
    }

    fn config() -> Config {
        Config {
            namespace: "portfolio".to_string(),
            batch_width: 2,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_partial_failure_links_only_successes() {
        let catalog = Arc::new(JsonCatalog::in_memory());
        let italy = collection(&catalog, "italy", None).await;
        let rome = collection(&catalog, "rome", Some(italy)).await;
        let store = Arc::new(TestStore::default());

        let service = IngestService::new(&config(), store.clone(), catalog.clone());
        let files = vec![image_file("1.png", 1), image_file("bad.png", 2), image_file("3.png", 3)];
        let report = service.ingest_into_collection(&rome, files).await.unwrap();

        assert_eq!(report.folder, "portfolio/italy/rome");
        assert_eq!(report.total(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.summary(), "2 of 3 succeeded");
        assert_eq!(report.records[1].status, UploadStatus::Failed);
        assert_eq!(report.failed_files(), vec!["bad.png: Upload failed: quota exceeded".to_string()]);

        let links = catalog.associations(&rome).await.unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].asset_id, report.records[0].asset.as_ref().unwrap().id);
        assert_eq!(links[1].asset_id, report.records[2].asset.as_ref().unwrap().id);
        assert_eq!(links.iter().map(|l| l.order).collect::<Vec<_>>(), vec![0, 1]);
        assert!(report.orphaned_assets().is_empty());
    }

    #[tokio::test]
    async fn test_done_records_carry_valid_assets() {
        let catalog = Arc::new(JsonCatalog::in_memory());
        let italy = collection(&catalog, "italy", None).await;
        let service = IngestService::new(&config(), Arc::new(TestStore::default()), catalog);

        let files = vec![
            image_file("a.png", 1),
            SourceFile::new("readme.md", "text/markdown", b"# hi".to_vec()),
            image_file("b.png", 2),
        ];
        let report = service.ingest_into_collection(&italy, files).await.unwrap();

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.skipped, vec!["readme.md".to_string()]);
        for record in report.records.iter().filter(|r| r.is_done()) {
            let asset = record.asset.as_ref().unwrap();
            assert!(asset.id.starts_with("portfolio/italy/"));
            assert!(!asset.url.is_empty());
            assert_eq!((asset.width, asset.height), (12, 8));
        }
    }

    #[tokio::test]
    async fn test_cancelled_run_writes_no_associations() {
        let catalog = Arc::new(JsonCatalog::in_memory());
        let italy = collection(&catalog, "italy", None).await;
        let (stop_tx, _) = broadcast::channel(4);
        let store = Arc::new(TestStore {
            stop: Some(stop_tx.clone()),
            ..Default::default()
        });

        let service = IngestService::new(&config(), store, catalog.clone()).with_cancellation(stop_tx);
        let files = (0..5).map(|i| image_file(&format!("{}.png", i), i as u8)).collect();
        let report = service.ingest_into_collection(&italy, files).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.records.len(), 5);
        assert_eq!(report.succeeded(), 2);
        assert!(report.associations.is_empty());
        assert!(catalog.associations(&italy).await.unwrap().is_empty());
        assert_eq!(report.orphaned_assets().len(), 2);
        assert!(report.records[2..]
            .iter()
            .all(|r| r.error.as_deref() == Some("cancelled before start")));
    }

    #[tokio::test]
    async fn test_stop_during_last_batch_still_links() {
        let catalog = Arc::new(JsonCatalog::in_memory());
        let italy = collection(&catalog, "italy", None).await;
        let (stop_tx, _) = broadcast::channel(4);
        let store = Arc::new(TestStore {
            stop: Some(stop_tx.clone()),
            ..Default::default()
        });

        let service = IngestService::new(&config(), store, catalog.clone()).with_cancellation(stop_tx);
        let files = vec![image_file("a.png", 1), image_file("b.png", 2)];
        let report = service.ingest_into_collection(&italy, files).await.unwrap();

        assert!(!report.cancelled);
        assert_eq!(report.associations.len(), 2);
        assert!(report.orphaned_assets().is_empty());
    }

    #[tokio::test]
    async fn test_identical_files_blame_the_right_record() {
        let catalog = Arc::new(JsonCatalog::in_memory());
        let italy = collection(&catalog, "italy", None).await;
        let service = IngestService::new(&config(), Arc::new(TestStore::default()), catalog.clone());

        let files = vec![image_file("first.png", 7), image_file("second.png", 7)];
        let report = service.ingest_into_collection(&italy, files).await.unwrap();

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.associations.len(), 1);
        assert_eq!(report.association_failures.len(), 1);
        let failure = &report.association_failures[0];
        assert_eq!(failure.ordinal, 1);
        assert_eq!(failure.file_name, "second.png");
        assert_eq!(catalog.associations(&italy).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_collection_touches_nothing() {
        let catalog = Arc::new(JsonCatalog::in_memory());
        let store = Arc::new(TestStore::default());
        let service = IngestService::new(&config(), store.clone(), catalog);

        let result = service
            .ingest_into_collection("missing", vec![image_file("a.png", 1)])
            .await;

        assert!(matches!(result, Err(IngestError::UnknownCollection(_))));
        assert!(store.inner.is_empty().await);
    }

    #[tokio::test]
    async fn test_upload_to_folder_never_links() {
        let catalog = Arc::new(JsonCatalog::in_memory());
        let service = IngestService::new(&config(), Arc::new(TestStore::default()), catalog.clone());

        let report = service
            .upload_to_folder("portfolio/misc", vec![image_file("a.png", 1)])
            .await
            .unwrap();

        assert_eq!(report.folder, "portfolio/misc");
        assert_eq!(report.succeeded(), 1);
        assert!(report.associations.is_empty());
        assert!(report.orphaned_assets().is_empty());
        assert!(catalog.all_associations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_observer_sees_final_snapshot() {
        let catalog = Arc::new(JsonCatalog::in_memory());
        let service = IngestService::new(&config(), Arc::new(TestStore::default()), catalog);
        let observer = service.subscribe();

        service
            .upload_to_folder("portfolio/misc", vec![image_file("a.png", 1), image_file("b.png", 2)])
            .await
            .unwrap();

        let last = observer.borrow().clone();
        assert_eq!(last.completed, 2);
        assert_eq!(last.total, 2);
    }
}
