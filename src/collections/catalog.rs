//! # Catalog Store Module
//!
//! Questo modulo gestisce la persistenza di collezioni e associazioni foto.
//!
//! ## Responsabilità:
//! - Definisce il trait `CatalogStore` (insert, update ordini in blocco,
//!   delete per associazione, letture)
//! - Fornisce `JsonCatalog`, uno store persistito su file JSON
//! - Garantisce ordini univoci per collezione
//!
//! ## Strategia di persistence:
//! - Stato completo in memoria dietro un `RwLock`
//! - Ogni mutazione lavora su una copia, la scrive su file temporaneo + rename,
//!   e solo dopo la sostituisce allo stato corrente (sotto write lock)
//! - Un lettore vede quindi sempre lo stato precedente o quello successivo,
//!   mai uno intermedio: un riordino è tutto-o-niente
//!
//! ## Esempio struttura catalog file:
//! ```json
//! {
//!   "collections": [
//!     { "id": "7f1c...", "title": "Italy", "slug": "italy", "parent_id": null, "order": 0 }
//!   ],
//!   "associations": [
//!     { "collection_id": "7f1c...", "asset_id": "portfolio/italy/3fa2...", "order": 0 }
//!   ]
//! }
//! ```

use crate::collections::model::{CollectionNode, NewCollection, PhotoAssetAssociation};
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

/// Relational store for collections and photo associations
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn collections(&self) -> Result<Vec<CollectionNode>>;

    async fn create_collection(&self, new: NewCollection) -> Result<CollectionNode>;

    /// Associations of one collection sorted by `order`
    async fn associations(&self, collection_id: &str) -> Result<Vec<PhotoAssetAssociation>>;

    async fn all_associations(&self) -> Result<Vec<PhotoAssetAssociation>>;

    async fn max_order(&self, collection_id: &str) -> Result<Option<i64>>;

    /// Fails with `OrderConflict` if the order is already taken in the collection
    async fn insert_association(&self, association: PhotoAssetAssociation) -> Result<()>;

    /// Replace the order of every association of the collection in one step.
    /// `orders` must name every existing asset exactly once.
    async fn reorder(&self, collection_id: &str, orders: &[(String, i64)]) -> Result<()>;

    /// Returns false if the association did not exist
    async fn delete_association(&self, collection_id: &str, asset_id: &str) -> Result<bool>;
}

/// Contenuto del file di catalogo
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogState {
    pub collections: Vec<CollectionNode>,
    pub associations: Vec<PhotoAssetAssociation>,
}

/// Catalog persisted as a single JSON document
pub struct JsonCatalog {
    path: Option<PathBuf>,
    state: RwLock<CatalogState>,
}

impl JsonCatalog {
    /// Apre (o crea al primo salvataggio) il catalogo su file
    pub async fn open(path: &Path) -> Result<Self> {
        let state = if path.exists() {
            let content = fs::read_to_string(path).await?;
            serde_json::from_str(&content)?
        } else {
            CatalogState::default()
        };

        debug!("Catalog loaded from {}", path.display());
        Ok(Self {
            path: Some(path.to_path_buf()),
            state: RwLock::new(state),
        })
    }

    /// Catalogo solo in memoria (dry run e test)
    pub fn in_memory() -> Self {
        Self::with_state(CatalogState::default())
    }

    pub fn with_state(state: CatalogState) -> Self {
        Self {
            path: None,
            state: RwLock::new(state),
        }
    }

    /// Applica una mutazione su una copia dello stato, la persiste e la pubblica
    async fn commit<T, F>(&self, mutation: F) -> Result<T>
    where
        F: FnOnce(&mut CatalogState) -> Result<T> + Send,
        T: Send,
    {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let output = mutation(&mut next)?;
        self.persist(&next).await?;
        *guard = next;
        Ok(output)
    }

    async fn persist(&self, state: &CatalogState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(state)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, path).await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for JsonCatalog {
    async fn collections(&self) -> Result<Vec<CollectionNode>> {
        Ok(self.state.read().await.collections.clone())
    }

    async fn create_collection(&self, new: NewCollection) -> Result<CollectionNode> {
        let slug = new.slug.trim().to_string();
        if slug.is_empty() || slug.contains('/') {
            return Err(IngestError::Validation(format!("invalid slug '{}'", new.slug)));
        }

        self.commit(move |state| {
            if let Some(parent) = new.parent_id.as_deref() {
                if !state.collections.iter().any(|c| c.id == parent) {
                    return Err(IngestError::UnknownCollection(parent.to_string()));
                }
            }

            let siblings: Vec<&CollectionNode> = state
                .collections
                .iter()
                .filter(|c| c.parent_id == new.parent_id)
                .collect();

            if siblings.iter().any(|c| c.slug == slug) {
                return Err(IngestError::Validation(format!(
                    "slug '{}' already used at this level",
                    slug
                )));
            }

            let order = siblings.iter().map(|c| c.order + 1).max().unwrap_or(0);
            let node = CollectionNode {
                id: uuid::Uuid::new_v4().to_string(),
                title: new.title,
                slug,
                parent_id: new.parent_id,
                order,
            };
            state.collections.push(node.clone());
            Ok(node)
        })
        .await
    }

    async fn associations(&self, collection_id: &str) -> Result<Vec<PhotoAssetAssociation>> {
        let state = self.state.read().await;
        let mut associations: Vec<PhotoAssetAssociation> = state
            .associations
            .iter()
            .filter(|a| a.collection_id == collection_id)
            .cloned()
            .collect();
        associations.sort_by_key(|a| a.order);
        Ok(associations)
    }

    async fn all_associations(&self) -> Result<Vec<PhotoAssetAssociation>> {
        Ok(self.state.read().await.associations.clone())
    }

    async fn max_order(&self, collection_id: &str) -> Result<Option<i64>> {
        let state = self.state.read().await;
        Ok(state
            .associations
            .iter()
            .filter(|a| a.collection_id == collection_id)
            .map(|a| a.order)
            .max())
    }

    async fn insert_association(&self, association: PhotoAssetAssociation) -> Result<()> {
        self.commit(move |state| {
            if !state.collections.iter().any(|c| c.id == association.collection_id) {
                return Err(IngestError::UnknownCollection(association.collection_id.clone()));
            }

            let in_collection = state
                .associations
                .iter()
                .filter(|a| a.collection_id == association.collection_id);

            for existing in in_collection {
                if existing.order == association.order {
                    return Err(IngestError::OrderConflict {
                        collection_id: association.collection_id.clone(),
                        order: association.order,
                    });
                }
                if existing.asset_id == association.asset_id {
                    return Err(IngestError::Catalog(format!(
                        "asset {} already linked to collection {}",
                        association.asset_id, association.collection_id
                    )));
                }
            }

            state.associations.push(association);
            Ok(())
        })
        .await
    }

    async fn reorder(&self, collection_id: &str, orders: &[(String, i64)]) -> Result<()> {
        self.commit(|state| {
            let invalid = |reason: String| IngestError::InvalidPermutation {
                collection_id: collection_id.to_string(),
                reason,
            };

            let current: HashSet<&str> = state
                .associations
                .iter()
                .filter(|a| a.collection_id == collection_id)
                .map(|a| a.asset_id.as_str())
                .collect();

            if orders.len() != current.len() {
                return Err(invalid(format!(
                    "expected {} assets, got {}",
                    current.len(),
                    orders.len()
                )));
            }

            let mut seen_assets = HashSet::new();
            let mut seen_orders = HashSet::new();
            for (asset_id, order) in orders {
                if !current.contains(asset_id.as_str()) {
                    return Err(invalid(format!("asset {} is not in the collection", asset_id)));
                }
                if !seen_assets.insert(asset_id.as_str()) {
                    return Err(invalid(format!("asset {} listed twice", asset_id)));
                }
                if !seen_orders.insert(*order) {
                    return Err(invalid(format!("order {} assigned twice", order)));
                }
            }

            for association in state
                .associations
                .iter_mut()
                .filter(|a| a.collection_id == collection_id)
            {
                if let Some((_, order)) = orders.iter().find(|(id, _)| *id == association.asset_id) {
                    association.order = *order;
                }
            }
            Ok(())
        })
        .await
    }

    async fn delete_association(&self, collection_id: &str, asset_id: &str) -> Result<bool> {
        self.commit(|state| {
            let before = state.associations.len();
            state
                .associations
                .retain(|a| !(a.collection_id == collection_id && a.asset_id == asset_id));
            Ok(state.associations.len() != before)
        })
        .await
    }
}
