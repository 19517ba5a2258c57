//! # Association Writer Module
//!
//! Collega gli asset caricati a una collezione come associazioni ordinate e
//! gestisce riordino e rimozione.
//!
//! ## Responsabilità:
//! - `attach`: ordini `max + 1 + posizione`, strettamente crescenti e univoci
//! - Conflitti d'ordine (scrittore concorrente): rilegge il massimo e prosegue
//! - Errori per singolo asset raccolti e restituiti in modo esplicito, così il
//!   chiamante sa esattamente quali asset caricati sono rimasti orfani
//! - `reorder`: permutazione completa → ordini densi `0..N-1` in un'unica
//!   scrittura tutto-o-niente, ritentata per intero
//! - `detach`: elimina il solo collegamento, l'asset resta nello store

use crate::asset_store::ProcessedAsset;
use crate::collections::{CatalogStore, PhotoAssetAssociation};
use crate::config::Config;
use crate::error::{IngestError, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Un asset caricato che non è stato possibile collegare
#[derive(Debug, Clone)]
pub struct AssociationFailure {
    /// Posizione dell'asset nella lista passata ad `attach`
    pub index: usize,
    pub asset: ProcessedAsset,
    pub message: String,
}

/// Result of attaching a list of assets to one collection
#[derive(Debug, Clone, Default)]
pub struct AttachOutcome {
    pub created: Vec<PhotoAssetAssociation>,
    pub failed: Vec<AssociationFailure>,
}

impl AttachOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Writes ordered photo ↔ collection links
#[derive(Clone)]
pub struct AssociationWriter {
    catalog: Arc<dyn CatalogStore>,
    reorder_retries: u32,
    conflict_retries: u32,
}

impl AssociationWriter {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            catalog,
            reorder_retries: 2,
            conflict_retries: 32,
        }
    }

    pub fn from_config(catalog: Arc<dyn CatalogStore>, config: &Config) -> Self {
        Self::new(catalog).with_reorder_retries(config.reorder_retries)
    }

    pub fn with_reorder_retries(mut self, retries: u32) -> Self {
        self.reorder_retries = retries;
        self
    }

    /// Append `assets` to the collection, in the given order.
    ///
    /// Fails as a whole only before the first link is written (unknown
    /// collection, unreadable catalog). Afterwards every error is reported in
    /// `AttachOutcome::failed` and the links already written stay in `created`.
    pub async fn attach(&self, collection_id: &str, assets: &[ProcessedAsset]) -> Result<AttachOutcome> {
        let mut outcome = AttachOutcome::default();
        if assets.is_empty() {
            return Ok(outcome);
        }

        if !self.catalog.collections().await?.iter().any(|c| c.id == collection_id) {
            return Err(IngestError::UnknownCollection(collection_id.to_string()));
        }

        let mut next = self.next_order(collection_id).await?;

        'assets: for (index, asset) in assets.iter().enumerate() {
            let mut conflicts = 0;
            loop {
                let association = PhotoAssetAssociation {
                    collection_id: collection_id.to_string(),
                    asset_id: asset.id.clone(),
                    order: next,
                };

                match self.catalog.insert_association(association.clone()).await {
                    Ok(()) => {
                        debug!("Linked {} to {} at order {}", asset.id, collection_id, next);
                        outcome.created.push(association);
                        next += 1;
                        break;
                    }
                    Err(IngestError::OrderConflict { order, .. }) if conflicts < self.conflict_retries => {
                        conflicts += 1;
                        debug!("Order {} taken in {}, re-reading max order", order, collection_id);
                        match self.next_order(collection_id).await {
                            Ok(order) => next = order,
                            Err(e) => {
                                // I collegamenti già scritti restano in `created`
                                warn!("⚠️ Could not re-read max order of {}: {}", collection_id, e);
                                let message = e.to_string();
                                outcome.failed.extend(assets.iter().enumerate().skip(index).map(|(index, asset)| {
                                    AssociationFailure {
                                        index,
                                        asset: asset.clone(),
                                        message: message.clone(),
                                    }
                                }));
                                break 'assets;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("⚠️ Could not link asset {} to {}: {}", asset.id, collection_id, e);
                        outcome.failed.push(AssociationFailure {
                            index,
                            asset: asset.clone(),
                            message: e.to_string(),
                        });
                        break;
                    }
                }
            }
        }

        info!(
            "🔗 Linked {} of {} assets to collection {}",
            outcome.created.len(),
            assets.len(),
            collection_id
        );
        Ok(outcome)
    }

    /// Rewrite the collection to `asset_ids` order (dense `0..N-1`).
    ///
    /// `asset_ids` must contain every asset of the collection exactly once.
    pub async fn reorder(&self, collection_id: &str, asset_ids: &[String]) -> Result<Vec<PhotoAssetAssociation>> {
        let mut attempt = 0;
        loop {
            match self.try_reorder(collection_id, asset_ids).await {
                Ok(associations) => {
                    info!("🔀 Reordered {} photos in collection {}", associations.len(), collection_id);
                    return Ok(associations);
                }
                Err(e @ IngestError::InvalidPermutation { .. }) | Err(e @ IngestError::UnknownCollection(_)) => {
                    return Err(e);
                }
                Err(e) if attempt < self.reorder_retries => {
                    attempt += 1;
                    warn!(
                        "⚠️ Reorder of {} failed (attempt {}/{}): {}",
                        collection_id,
                        attempt,
                        self.reorder_retries + 1,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reorder by positions: `permutation[i]` is the current position of the
    /// photo that moves to position `i`.
    pub async fn reorder_by_positions(
        &self,
        collection_id: &str,
        permutation: &[usize],
    ) -> Result<Vec<PhotoAssetAssociation>> {
        let current = self.catalog.associations(collection_id).await?;
        let invalid = |reason: String| IngestError::InvalidPermutation {
            collection_id: collection_id.to_string(),
            reason,
        };

        if permutation.len() != current.len() {
            return Err(invalid(format!(
                "expected {} positions, got {}",
                current.len(),
                permutation.len()
            )));
        }

        let mut seen = HashSet::new();
        let mut asset_ids = Vec::with_capacity(permutation.len());
        for &position in permutation {
            let association = current
                .get(position)
                .ok_or_else(|| invalid(format!("position {} out of range", position)))?;
            if !seen.insert(position) {
                return Err(invalid(format!("position {} listed twice", position)));
            }
            asset_ids.push(association.asset_id.clone());
        }

        self.reorder(collection_id, &asset_ids).await
    }

    /// Remove the link only. The asset itself is left in the store.
    pub async fn detach(&self, collection_id: &str, asset_id: &str) -> Result<bool> {
        let removed = self.catalog.delete_association(collection_id, asset_id).await?;
        if removed {
            info!("✂️ Detached {} from collection {}", asset_id, collection_id);
        } else {
            debug!("No link between {} and {}", asset_id, collection_id);
        }
        Ok(removed)
    }

    async fn next_order(&self, collection_id: &str) -> Result<i64> {
        Ok(self.catalog.max_order(collection_id).await?.map_or(0, |max| max + 1))
    }

    async fn try_reorder(&self, collection_id: &str, asset_ids: &[String]) -> Result<Vec<PhotoAssetAssociation>> {
        let orders: Vec<(String, i64)> = asset_ids
            .iter()
            .enumerate()
            .map(|(position, id)| (id.clone(), position as i64))
            .collect();

        self.catalog.reorder(collection_id, &orders).await?;
        self.catalog.associations(collection_id).await
    }
}
