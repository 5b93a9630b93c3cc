//! Schema Registry (C5): versioned object/relationship schemas, validation
//! with deterministic type coercion, and migration between versions.

pub mod coerce;
pub mod migrate;
pub mod registry;
pub mod types;
pub mod validate;

pub use migrate::migrate;
pub use registry::SchemaRegistry;
pub use types::{
    CoercionNote, MigrationIssue, MigrationResult, ObjectSchema, PropertySchema, PropertyType,
    RelationshipSchema, RiskLabel, Schema, SchemaInstallation, Severity,
};
pub use validate::validate;
