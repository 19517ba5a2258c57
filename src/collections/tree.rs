//! # Collection Tree Module
//!
//! Mappa id → nodo costruita una sola volta per richiesta a partire dai parent link.
//!
//! ## Responsabilità:
//! - Valida che l'albero non contenga cicli né parent inesistenti
//! - Risolve la catena completa degli antenati (non solo il parent diretto)
//! - Calcola il folder path sull'asset store: `namespace/antenati.../slug`
//! - Calcola i totali ricorsivi di foto per nodo con una sola traversata O(n)
//! - Indice parent → figli costruito una volta, per visite in preordine lineari

use crate::collections::model::{CollectionNode, PhotoAssetAssociation};
use crate::error::{IngestError, Result};
use std::collections::{HashMap, HashSet};

/// Folder path for a chain of slugs ordered root first
pub fn folder_path<'a, I>(namespace: &str, slugs: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut path = namespace.trim_matches('/').to_string();
    for slug in slugs {
        path.push('/');
        path.push_str(slug.trim_matches('/'));
    }
    path
}

/// In-memory, validated view of the collection tree
#[derive(Debug, Clone)]
pub struct CollectionTree {
    nodes: HashMap<String, CollectionNode>,
    depth: HashMap<String, usize>,
    /// Figli diretti per parent (`None` per le radici), già ordinati
    children: HashMap<Option<String>, Vec<String>>,
}

impl CollectionTree {
    /// Costruisce la mappa e verifica che ogni catena di parent termini in una radice
    pub fn build(nodes: Vec<CollectionNode>) -> Result<Self> {
        let nodes: HashMap<String, CollectionNode> =
            nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        let mut depth: HashMap<String, usize> = HashMap::with_capacity(nodes.len());

        for start in nodes.keys() {
            if depth.contains_key(start) {
                continue;
            }

            // Risale fino a una radice o a un nodo già calcolato
            let mut chain: Vec<&str> = Vec::new();
            let mut on_chain: HashSet<&str> = HashSet::new();
            let mut current = start.as_str();
            let base = loop {
                if let Some(d) = depth.get(current) {
                    break *d + 1;
                }
                if !on_chain.insert(current) {
                    return Err(IngestError::CycleDetected(current.to_string()));
                }
                chain.push(current);

                let node = &nodes[current];
                match node.parent_id.as_deref() {
                    None => break 0,
                    Some(parent) if nodes.contains_key(parent) => current = parent,
                    Some(parent) => {
                        return Err(IngestError::Catalog(format!(
                            "collection {} references missing parent {}",
                            node.id, parent
                        )))
                    }
                }
            };

            // chain è ordinata dal nodo di partenza verso la radice
            for (offset, id) in chain.iter().rev().enumerate() {
                depth.insert((*id).to_string(), base + offset);
            }
        }

        let mut children: HashMap<Option<String>, Vec<String>> = HashMap::new();
        for node in nodes.values() {
            children.entry(node.parent_id.clone()).or_default().push(node.id.clone());
        }
        for ids in children.values_mut() {
            ids.sort_by(|a, b| {
                let (a, b) = (&nodes[a], &nodes[b]);
                a.order.cmp(&b.order).then_with(|| a.title.cmp(&b.title))
            });
        }

        Ok(Self { nodes, depth, children })
    }

    pub fn get(&self, id: &str) -> Option<&CollectionNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Profondità del nodo (0 per le radici)
    pub fn depth(&self, id: &str) -> Option<usize> {
        self.depth.get(id).copied()
    }

    /// Catena completa dalla radice al nodo incluso
    pub fn lineage(&self, id: &str) -> Result<Vec<&CollectionNode>> {
        let mut chain = Vec::new();
        let mut current = self
            .nodes
            .get(id)
            .ok_or_else(|| IngestError::UnknownCollection(id.to_string()))?;

        loop {
            chain.push(current);
            match current.parent_id.as_deref().and_then(|p| self.nodes.get(p)) {
                Some(parent) => current = parent,
                None => break,
            }
        }

        chain.reverse();
        Ok(chain)
    }

    /// Folder dell'asset store per la collezione: `namespace/antenati.../slug`
    pub fn folder_path(&self, namespace: &str, id: &str) -> Result<String> {
        let lineage = self.lineage(id)?;
        Ok(folder_path(namespace, lineage.iter().map(|n| n.slug.as_str())))
    }

    /// Figli diretti ordinati per `order`
    pub fn children(&self, id: Option<&str>) -> Vec<&CollectionNode> {
        self.children
            .get(&id.map(str::to_string))
            .map(|ids| ids.iter().filter_map(|id| self.nodes.get(id)).collect())
            .unwrap_or_default()
    }

    /// Tutti i nodi in preordine, radici e fratelli ordinati per `order`
    pub fn preorder(&self) -> Vec<&CollectionNode> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<&CollectionNode> = self.children(None).into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            stack.extend(self.children(Some(&node.id)).into_iter().rev());
            out.push(node);
        }
        out
    }

    /// Risolve una collezione per id o, in alternativa, per slug univoco
    pub fn find(&self, id_or_slug: &str) -> Result<&CollectionNode> {
        if let Some(node) = self.nodes.get(id_or_slug) {
            return Ok(node);
        }

        let mut matches = self.nodes.values().filter(|n| n.slug == id_or_slug);
        match (matches.next(), matches.next()) {
            (Some(node), None) => Ok(node),
            (Some(_), Some(_)) => Err(IngestError::Validation(format!(
                "slug '{}' is ambiguous, use the collection id",
                id_or_slug
            ))),
            _ => Err(IngestError::UnknownCollection(id_or_slug.to_string())),
        }
    }

    /// Total media under every node (direct associations plus all descendants).
    ///
    /// One pass over the associations, then nodes are folded into their parent
    /// deepest first, so the whole computation is O(n).
    pub fn media_totals(&self, associations: &[PhotoAssetAssociation]) -> HashMap<String, usize> {
        let mut totals: HashMap<String, usize> =
            self.nodes.keys().map(|id| (id.clone(), 0)).collect();

        for association in associations {
            if let Some(count) = totals.get_mut(&association.collection_id) {
                *count += 1;
            }
        }

        let mut by_depth: Vec<(&String, usize)> =
            self.depth.iter().map(|(id, d)| (id, *d)).collect();
        by_depth.sort_by(|a, b| b.1.cmp(&a.1));

        for (id, _) in by_depth {
            let own = totals.get(id).copied().unwrap_or(0);
            if let Some(parent) = self.nodes.get(id).and_then(|n| n.parent_id.as_ref()) {
                if let Some(total) = totals.get_mut(parent) {
                    *total += own;
                }
            }
        }

        totals
    }
}
