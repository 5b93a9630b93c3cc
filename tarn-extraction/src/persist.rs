use tarn_common::{AppError, TenantContext};
use tarn_graph::{CreateObjectRequest, GraphStore};

use crate::types::{AcceptedObject, ExtractionResult};

/// What a `persist` call actually wrote, so callers can fan out downstream
/// embedding jobs without re-querying the store for ids they just created.
#[derive(Debug, Default)]
pub struct PersistOutcome {
    pub object_canonical_ids: Vec<String>,
    pub relationship_ids: Vec<String>,
}

/// Persists one extraction run through C6. `GraphStore::create_object` is already
/// idempotent on `key`, and relationship fingerprints fall out of
/// `(rel_type, src, dst)` uniqueness, so a partial retry after a failure
/// midway through this loop re-applies safely.
pub async fn persist(
    store: &GraphStore,
    ctx: &TenantContext,
    schemas: &[tarn_schema::ObjectSchema],
    result: &ExtractionResult,
) -> Result<PersistOutcome, AppError> {
    let mut outcome = PersistOutcome::default();
    let mut created_ids: std::collections::HashMap<String, String> = std::collections::HashMap::new();

    for object in &result.objects {
        let schema_version = schemas
            .iter()
            .find(|s| s.name == object.object_type)
            .map(|s| s.version)
            .ok_or_else(|| AppError::Validation(format!("no installed schema for type `{}`", object.object_type)))?;

        let key = object_key(object);
        let created = store
            .create_object(
                ctx,
                CreateObjectRequest {
                    object_type: object.object_type.clone(),
                    schema_version,
                    key: object.key.clone(),
                    properties: object.properties.clone(),
                },
            )
            .await?;
        outcome.object_canonical_ids.push(created.canonical_id.clone());
        created_ids.insert(key, created.canonical_id);
    }

    for relationship in &result.relationships {
        let (Some(src_id), Some(dst_id)) =
            (created_ids.get(&relationship.src_key), created_ids.get(&relationship.dst_key))
        else {
            continue;
        };

        let created = store
            .create_relationship(
                ctx,
                &relationship.rel_type,
                src_id,
                dst_id,
                relationship.properties.clone(),
                None,
            )
            .await?;
        outcome.relationship_ids.push(created.id);
    }

    Ok(outcome)
}

fn object_key(object: &AcceptedObject) -> String {
    object.key.clone().unwrap_or_else(|| object.normalized_name().unwrap_or_default())
}
