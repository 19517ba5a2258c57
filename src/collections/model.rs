use serde::{Deserialize, Serialize};

/// Node of the collection tree (gallery, album, sub-album...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionNode {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub parent_id: Option<String>,
    pub order: i64,
}

/// Dati per creare una nuova collezione
#[derive(Debug, Clone)]
pub struct NewCollection {
    pub title: String,
    pub slug: String,
    pub parent_id: Option<String>,
}

/// Link between a collection and an uploaded asset. `order` is unique per collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoAssetAssociation {
    pub collection_id: String,
    pub asset_id: String,
    pub order: i64,
}
