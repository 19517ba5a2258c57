//! # Progress Tracking Module
//!
//! Tracker thread-safe condiviso dalle pipeline di un batch.
//! I contatori sono atomici, il cursore dei file in corso è protetto da un mutex
//! e ogni aggiornamento pubblica uno snapshot su un canale `watch`: un solo
//! osservatore, nessuno stato globale.
//! Gestisce sia output JSON che progress bar tradizionale.

use crate::json_output::JsonMessage;
use crate::pipeline::record::UploadRecord;
use crate::progress::ProgressManager;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Dove finiscono gli aggiornamenti di progresso
#[derive(Clone)]
pub enum ProgressSink {
    Bar,
    Json,
    Silent,
}

/// Point-in-time view of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub failed: usize,
    pub current_files: Vec<String>,
}

struct TrackerInner {
    total: usize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    in_flight: Mutex<BTreeMap<usize, String>>,
    snapshots: Arc<watch::Sender<ProgressSnapshot>>,
    sink: ProgressSink,
    bar: Option<ProgressManager>,
}

/// Tracker condiviso (clone economico)
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<TrackerInner>,
}

impl ProgressTracker {
    pub fn new(total: usize, sink: ProgressSink, snapshots: Arc<watch::Sender<ProgressSnapshot>>) -> Self {
        let bar = match sink {
            ProgressSink::Bar => Some(ProgressManager::new(total as u64)),
            _ => None,
        };

        snapshots.send_replace(ProgressSnapshot {
            total,
            ..Default::default()
        });

        Self {
            inner: Arc::new(TrackerInner {
                total,
                completed: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
                in_flight: Mutex::new(BTreeMap::new()),
                snapshots,
                sink,
                bar,
            }),
        }
    }

    /// Tracker che pubblica solo sul proprio canale, utile nei test
    pub fn detached(total: usize) -> Self {
        let (tx, _rx) = watch::channel(ProgressSnapshot::default());
        Self::new(total, ProgressSink::Silent, Arc::new(tx))
    }

    pub fn total(&self) -> usize {
        self.inner.total
    }

    /// Registra l'inizio di un file
    pub async fn file_started(&self, ordinal: usize, name: &str, size: u64) {
        let mut in_flight = self.inner.in_flight.lock().await;
        in_flight.insert(ordinal, name.to_string());

        match self.inner.sink {
            ProgressSink::Json => {
                JsonMessage::file_start(name.to_string(), size, ordinal, self.inner.total).emit();
            }
            ProgressSink::Bar => {
                if let Some(bar) = &self.inner.bar {
                    bar.set_message(&format!("[UPLOAD] {}", name));
                }
            }
            ProgressSink::Silent => {}
        }

        self.publish(&in_flight);
    }

    /// Registra un record arrivato in uno stato terminale
    pub async fn file_finished(&self, record: &UploadRecord) {
        let mut in_flight = self.inner.in_flight.lock().await;
        in_flight.remove(&record.ordinal);

        self.inner.completed.fetch_add(1, Ordering::SeqCst);
        if !record.is_done() {
            self.inner.failed.fetch_add(1, Ordering::SeqCst);
        }

        match self.inner.sink {
            ProgressSink::Json => {
                JsonMessage::file_complete(record).emit();
                let snapshot = self.snapshot_locked(&in_flight);
                JsonMessage::progress(snapshot.completed, snapshot.total, snapshot.failed, snapshot.current_files)
                    .emit();
            }
            ProgressSink::Bar => {
                if let Some(bar) = &self.inner.bar {
                    let message = match &record.error {
                        None => format!("[OK] {}", record.file_name),
                        Some(e) => format!("[ERROR] {}: {}", record.file_name, e),
                    };
                    bar.update(&message);
                }
            }
            ProgressSink::Silent => {}
        }

        self.publish(&in_flight);
    }

    pub async fn snapshot(&self) -> ProgressSnapshot {
        let in_flight = self.inner.in_flight.lock().await;
        self.snapshot_locked(&in_flight)
    }

    /// Chiude la progress bar
    pub fn finish(&self, summary: &str) {
        if let Some(bar) = &self.inner.bar {
            bar.finish(summary);
        }
    }

    fn snapshot_locked(&self, in_flight: &BTreeMap<usize, String>) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.inner.completed.load(Ordering::SeqCst),
            total: self.inner.total,
            failed: self.inner.failed.load(Ordering::SeqCst),
            current_files: in_flight.values().cloned().collect(),
        }
    }

    // Chiamato sempre con il lock di in_flight: gli snapshot escono serializzati
    fn publish(&self, in_flight: &BTreeMap<usize, String>) {
        self.inner.snapshots.send_replace(self.snapshot_locked(in_flight));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::record::{SourceFile, UploadStatus};

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let (tx, rx) = watch::channel(ProgressSnapshot::default());
        let tracker = ProgressTracker::new(64, ProgressSink::Silent, Arc::new(tx));

        let mut handles = Vec::new();
        for ordinal in 0..64 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                let name = format!("{}.jpg", ordinal);
                tracker.file_started(ordinal, &name, 1).await;
                let mut record = UploadRecord::new(ordinal, &SourceFile::new(name, "image/jpeg", vec![]));
                if ordinal % 4 == 0 {
                    record.fail("boom");
                } else {
                    record.status = UploadStatus::Done;
                }
                tracker.file_finished(&record).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.completed, 64);
        assert_eq!(snapshot.failed, 16);
        assert!(snapshot.current_files.is_empty());
        assert_eq!(*rx.borrow(), snapshot);
    }

    #[tokio::test]
    async fn test_current_files_follow_ordinal_order() {
        let tracker = ProgressTracker::detached(3);
        tracker.file_started(2, "c.jpg", 1).await;
        tracker.file_started(0, "a.jpg", 1).await;

        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.current_files, vec!["a.jpg".to_string(), "c.jpg".to_string()]);
        assert_eq!(snapshot.completed, 0);
        assert_eq!(snapshot.total, 3);
    }
}
