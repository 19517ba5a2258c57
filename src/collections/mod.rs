//! # Collections Module
//!
//! Albero delle collezioni del portfolio e associazioni foto → collezione.
//!
//! - `model`: `CollectionNode` e `PhotoAssetAssociation`
//! - `tree`: mappa id → nodo costruita una volta, path dei folder e totali ricorsivi
//! - `catalog`: trait `CatalogStore` e implementazione persistita su JSON

pub mod catalog;
pub mod model;
pub mod tree;

pub use catalog::{CatalogStore, JsonCatalog};
pub use model::{CollectionNode, NewCollection, PhotoAssetAssociation};
pub use tree::{folder_path, CollectionTree};
