use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tarn_common::PropertyMap;

/// A property's declared type. `Closed` schemas reject unknown
/// properties instead of passing them through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub prop_type: PropertyType,
    pub description: Option<String>,
}

/// `ObjectSchema`: describes the shape of one graph object type,
/// versioned with a `parent_version_id` chain so `Migrate` can walk from an
/// object's stored `schema_version` to the project's active one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub name: String,
    pub version: u32,
    pub parent_version_id: Option<String>,
    pub properties: std::collections::BTreeMap<String, PropertySchema>,
    pub required: Vec<String>,
    pub extraction_guidelines: Option<String>,
    #[serde(default)]
    pub closed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipSchema {
    pub name: String,
    pub version: u32,
    pub parent_version_id: Option<String>,
    pub source_types: Vec<String>,
    pub target_types: Vec<String>,
    pub description: Option<String>,
}

/// Either schema kind, since `Validate`/`Migrate` operate identically over
/// the `properties`/`required` shape both share.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Schema {
    Object(ObjectSchema),
    Relationship(RelationshipSchema),
}

/// [SUPPLEMENT] per-project record of which schema version is active for a
/// given schema name, plus project-level overrides layered on top of the
/// installed schema's base definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaInstallation {
    pub project_id: String,
    pub schema_name: String,
    pub active_version: u32,
    pub installed_at: DateTime<Utc>,
    pub overrides: PropertyMap,
}

/// Per-field coercion or drop applied to a validated property map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoercionNote {
    pub field: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationIssue {
    pub severity: Severity,
    pub description: String,
    pub suggestion: Option<String>,
}

/// Per-field migration risk label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLabel {
    Safe,
    RequiresDefault,
    Coercible,
    Breaking,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    pub success: bool,
    pub new_properties: PropertyMap,
    pub dropped: Vec<String>,
    pub added: Vec<String>,
    pub coerced: Vec<CoercionNote>,
    pub issues: Vec<MigrationIssue>,
}
