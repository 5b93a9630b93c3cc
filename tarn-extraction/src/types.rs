use tarn_common::PropertyMap;
use tarn_schema::ObjectSchema;

/// Per-handler context: the object types a project has enabled, the
/// schemas those types validate against, and the chunk text(s) to mine.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub enabled_types: Vec<String>,
    pub schemas: Vec<ObjectSchema>,
    pub chunk_text: String,
}

impl ExtractionContext {
    pub fn schema_for(&self, object_type: &str) -> Option<&ObjectSchema> {
        self.schemas.iter().find(|s| s.name == object_type)
    }
}

/// A single chunk handed to the fan-out extractor.
#[derive(Debug, Clone)]
pub struct ChunkInput {
    pub chunk_id: String,
    pub text: String,
}

/// Raw object candidate as returned by the Entity Extractor, before schema
/// validation.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CandidateObject {
    #[serde(rename = "type")]
    pub object_type: String,
    pub key: Option<String>,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// Raw relationship candidate as returned by the Relationship Builder.
/// `src`/`dst` reference a [`CandidateObject::key`].
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CandidateRelationship {
    #[serde(rename = "type")]
    pub rel_type: String,
    pub src: String,
    pub dst: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// An object that survived schema validation, keyed for relationship
/// resolution and for merge-by-key-similarity across chunks.
#[derive(Debug, Clone)]
pub struct AcceptedObject {
    pub object_type: String,
    pub key: Option<String>,
    pub properties: PropertyMap,
    /// Set when the Quality Checker's final pass still finds this object
    /// with no incident relationship.
    pub low_confidence: bool,
}

impl AcceptedObject {
    /// Normalized name used as the fallback merge key when `key` is absent
    /// or two objects' exact keys differ.
    pub fn normalized_name(&self) -> Option<String> {
        self.properties.get("name").and_then(|v| v.as_str()).map(normalize_name)
    }
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Converts a raw JSON object (as returned by a structured chat completion)
/// into the typed property map C5/C6 operate on.
pub fn to_property_map(props: serde_json::Map<String, serde_json::Value>) -> PropertyMap {
    match serde_json::Value::Object(props).into() {
        tarn_common::PropertyValue::Object(map) => map,
        _ => PropertyMap::new(),
    }
}

/// A relationship whose endpoints have been resolved to accepted object
/// keys.
#[derive(Debug, Clone)]
pub struct AcceptedRelationship {
    pub rel_type: String,
    pub src_key: String,
    pub dst_key: String,
    pub properties: PropertyMap,
}

/// Final output of one extraction run, ready for persistence through C6.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub objects: Vec<AcceptedObject>,
    pub relationships: Vec<AcceptedRelationship>,
    pub issues: Vec<String>,
}
