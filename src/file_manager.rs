//! # File Management Module
//!
//! Questo modulo gestisce la raccolta dei file da ingerire dal filesystem locale.
//!
//! ## Responsabilità:
//! - Espansione degli input della CLI: file singoli e directory (ricorsiva)
//! - Scarto di file nascosti e duplicati, ordine stabile
//! - Lettura dei file in `SourceFile` con mime dedotto dall'estensione
//! - Formattazione human-readable delle dimensioni
//!
//! Il filtro immagine / non immagine NON avviene qui: i file non immagine vengono
//! passati all'orchestratore, che li segnala come `skipped` nel report.
//!
//! ## Esempio:
//! ```rust,ignore
//! let paths = FileManager::collect_inputs(&[PathBuf::from("/path/to/shoot")])?;
//! let files = FileManager::load_all(&paths).await?;
//! ```

use crate::pipeline::record::SourceFile;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// File discovery and loading for the CLI
pub struct FileManager;

impl FileManager {
    /// Expand files and directories into a sorted, de-duplicated list of files
    pub fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for input in inputs {
            if input.is_file() {
                if seen.insert(input.clone()) {
                    files.push(input.clone());
                }
                continue;
            }

            if !input.is_dir() {
                anyhow::bail!("Input not found: {}", input.display());
            }

            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !Self::is_hidden(e.path()))
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .collect();
            found.sort();

            for path in found {
                if seen.insert(path.clone()) {
                    files.push(path);
                }
            }
        }

        Ok(files)
    }

    pub fn is_hidden(path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().starts_with('.'))
            .unwrap_or(false)
    }

    /// Read one file into a `SourceFile`
    pub async fn load_source_file(path: &Path) -> Result<SourceFile> {
        let bytes = fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(SourceFile::from_name(name, bytes))
    }

    pub async fn load_all(paths: &[PathBuf]) -> Result<Vec<SourceFile>> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            files.push(Self::load_source_file(path).await?);
        }
        Ok(files)
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }
}
