//! # Folder Resolution Module
//!
//! Centralizza il calcolo del folder di destinazione sull'asset store.
//! È l'unico asse di variazione tra l'uploader generico (folder fisso) e
//! l'upload dentro una collezione (folder derivato dall'albero).

use crate::collections::{CatalogStore, CollectionTree};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Strategy used by the orchestrator to pick the destination folder
#[async_trait]
pub trait FolderStrategy: Send + Sync {
    async fn resolve(&self) -> Result<String>;
}

/// Folder fisso, già calcolato dal chiamante
pub struct FixedFolder(pub String);

#[async_trait]
impl FolderStrategy for FixedFolder {
    async fn resolve(&self) -> Result<String> {
        Ok(self.0.trim_matches('/').to_string())
    }
}

/// Folder of a collection: `namespace/ancestors.../slug`, resolved over the
/// full ancestor chain from the catalog.
pub struct CollectionFolder {
    catalog: Arc<dyn CatalogStore>,
    collection_id: String,
    namespace: String,
}

impl CollectionFolder {
    pub fn new(catalog: Arc<dyn CatalogStore>, collection_id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            catalog,
            collection_id: collection_id.into(),
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl FolderStrategy for CollectionFolder {
    async fn resolve(&self) -> Result<String> {
        let tree = CollectionTree::build(self.catalog.collections().await?)?;
        let folder = tree.folder_path(&self.namespace, &self.collection_id)?;
        debug!("Collection {} resolves to folder {}", self.collection_id, folder);
        Ok(folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{JsonCatalog, NewCollection};
    use crate::error::IngestError;

    #[tokio::test]
    async fn test_collection_folder_uses_full_chain() {
        let catalog = Arc::new(JsonCatalog::in_memory());
        let a = catalog
            .create_collection(NewCollection {
                title: "A".to_string(),
                slug: "a".to_string(),
                parent_id: None,
            })
            .await
            .unwrap();
        let b = catalog
            .create_collection(NewCollection {
                title: "B".to_string(),
                slug: "b".to_string(),
                parent_id: Some(a.id.clone()),
            })
            .await
            .unwrap();

        let strategy = CollectionFolder::new(catalog.clone(), b.id.clone(), "ns");
        assert_eq!(strategy.resolve().await.unwrap(), "ns/a/b");

        let missing = CollectionFolder::new(catalog, "nope", "ns");
        assert!(matches!(missing.resolve().await, Err(IngestError::UnknownCollection(_))));
    }

    #[test]
    fn test_fixed_folder_is_trimmed() {
        let strategy = FixedFolder("/ns/uploads/".to_string());
        let folder = tokio_test::block_on(strategy.resolve()).unwrap();
        assert_eq!(folder, "ns/uploads");
    }
}
