use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tarn_common::PropertyMap;

/// A graph object version row. `id` is this version's identity;
/// `canonical_id` is stable across every version of the same logical
/// object. On an object's first version `id == canonical_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphObject {
    pub id: String,
    pub canonical_id: String,
    pub project_id: String,
    pub object_type: String,
    pub schema_version: u32,
    pub key: Option<String>,
    pub properties: PropertyMap,
    pub embedding: Option<Vec<f32>>,
    pub fts_vector: Vec<String>,
    pub supersedes_id: Option<String>,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for `CreateObject`.
#[derive(Debug, Clone)]
pub struct CreateObjectRequest {
    pub object_type: String,
    pub schema_version: u32,
    pub key: Option<String>,
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub id: String,
    pub project_id: String,
    pub rel_type: String,
    pub source_canonical_id: String,
    pub target_canonical_id: String,
    pub properties: PropertyMap,
    pub triplet_text: String,
    pub embedding: Option<Vec<f32>>,
    pub valid_at: DateTime<Utc>,
    pub invalid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Optional restriction on which relationship types `ExpandGraph` traverses.
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    pub allowed_types: Option<Vec<String>>,
}

impl EdgeFilter {
    pub fn allows(&self, rel_type: &str) -> bool {
        match &self.allowed_types {
            Some(types) => types.iter().any(|t| t == rel_type),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subgraph {
    pub objects: Vec<GraphObject>,
    pub relationships: Vec<GraphRelationship>,
}
