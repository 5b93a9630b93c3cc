#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

//! Cross-cutting types shared by every stage crate: errors, tenant context,
//! configuration, the SurrealDB client wrapper, property values, and the
//! fingerprint/backoff helpers the job store relies on.

pub mod config;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod properties;
pub mod tenant;

pub use config::{AppConfig, QueuePolicy, get_config};
pub use db::{StoredObject, SurrealDbClient};
pub use error::{AppError, Classified};
pub use properties::{PropertyMap, PropertyValue};
pub use tenant::{SystemContext, TenantContext};
