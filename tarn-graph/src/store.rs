use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use tarn_common::{AppError, PropertyMap, SurrealDbClient, TenantContext};
use tarn_schema::SchemaRegistry;

use crate::types::{CreateObjectRequest, GraphObject, GraphRelationship};

const OBJECT_TABLE: &str = "graph_object";
const RELATIONSHIP_TABLE: &str = "graph_relationship";

/// Graph Store (C6): dual-ID versioned objects plus typed, temporally
/// invalidated relationships. Grounded on the teacher's
/// `KnowledgeEntity`/`KnowledgeRelationship` storage pattern, generalized
/// from single-version rows to a version/canonical split.
pub struct GraphStore {
    db: Arc<SurrealDbClient>,
    schemas: Arc<SchemaRegistry>,
}

impl GraphStore {
    pub fn new(db: Arc<SurrealDbClient>, schemas: Arc<SchemaRegistry>) -> Self {
        Self { db, schemas }
    }

    /// `CreateObject`: idempotent on `(project_id, type, key)` when
    /// `key` is set; re-creating with the same key returns the existing
    /// current version instead of inserting a duplicate.
    pub async fn create_object(
        &self,
        ctx: &TenantContext,
        req: CreateObjectRequest,
    ) -> Result<GraphObject, AppError> {
        if let Some(key) = &req.key {
            if let Some(existing) = self
                .find_current_by_key(ctx, &req.object_type, key)
                .await?
            {
                return Ok(existing);
            }
        }

        let schema = self
            .schemas
            .get(ctx, &req.object_type, Some(req.schema_version))
            .await?;
        let validated = tarn_schema::validate(&req.properties, &schema)?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let object = GraphObject {
            canonical_id: id.clone(),
            id: id.clone(),
            project_id: ctx.project_id.clone(),
            object_type: req.object_type,
            schema_version: req.schema_version,
            key: req.key,
            fts_vector: tokenize_properties(&validated),
            properties: validated,
            embedding: None,
            supersedes_id: None,
            is_current: true,
            created_at: now,
            updated_at: now,
        };

        let _: Option<GraphObject> = self
            .db
            .client
            .create((OBJECT_TABLE, id.as_str()))
            .content(object.clone())
            .await
            .map_err(AppError::Database)?;

        debug!(project_id = %ctx.project_id, object_type = %object.object_type, id = %id, "graph object created");
        Ok(object)
    }

    async fn find_current_by_key(
        &self,
        ctx: &TenantContext,
        object_type: &str,
        key: &str,
    ) -> Result<Option<GraphObject>, AppError> {
        let mut resp = self
            .db
            .query(
                "SELECT * FROM type::table($table) WHERE project_id = $project_id \
                 AND object_type = $object_type AND key = $key AND is_current = true LIMIT 1",
            )
            .bind(("table", OBJECT_TABLE))
            .bind(("project_id", ctx.project_id.clone()))
            .bind(("object_type", object_type.to_string()))
            .bind(("key", key.to_string()))
            .await
            .map_err(AppError::Database)?;
        let rows: Vec<GraphObject> = resp.take(0).map_err(AppError::Database)?;
        Ok(rows.into_iter().next())
    }

    /// `ResolveCanonical(project_id, id_any)`: accepts a version id
    /// or a canonical id, returns the canonical id of the current version.
    pub async fn resolve_canonical(&self, ctx: &TenantContext, id_any: &str) -> Result<String, AppError> {
        let current = self.current_version(ctx, id_any).await?;
        Ok(current.canonical_id)
    }

    async fn current_version(&self, ctx: &TenantContext, id_any: &str) -> Result<GraphObject, AppError> {
        let mut resp = self
            .db
            .query(
                "SELECT * FROM type::table($table) WHERE project_id = $project_id \
                 AND (id = type::thing($table, $id_any) OR canonical_id = $id_any) \
                 AND is_current = true LIMIT 1",
            )
            .bind(("table", OBJECT_TABLE))
            .bind(("project_id", ctx.project_id.clone()))
            .bind(("id_any", id_any.to_string()))
            .await
            .map_err(AppError::Database)?;
        let rows: Vec<GraphObject> = resp.take(0).map_err(AppError::Database)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("graph object `{id_any}` not found")))
    }

    /// `UpdateObject(project_id, id|canonical_id, patch)`: resolves to
    /// the current version, merges `patch` over its properties, validates
    /// the merge, then inserts a new version row. Callers **must** switch to
    /// the returned object's `id` for subsequent operations.
    pub async fn update_object(
        &self,
        ctx: &TenantContext,
        id_any: &str,
        patch: PropertyMap,
    ) -> Result<GraphObject, AppError> {
        let previous = self.current_version(ctx, id_any).await?;

        let mut merged = previous.properties.clone();
        merged.extend(patch);

        let schema = self
            .schemas
            .get(ctx, &previous.object_type, Some(previous.schema_version))
            .await?;
        let validated = tarn_schema::validate(&merged, &schema)?;

        let new_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let new_object = GraphObject {
            id: new_id.clone(),
            canonical_id: previous.canonical_id.clone(),
            project_id: ctx.project_id.clone(),
            object_type: previous.object_type.clone(),
            schema_version: previous.schema_version,
            key: previous.key.clone(),
            fts_vector: tokenize_properties(&validated),
            properties: validated,
            embedding: None,
            supersedes_id: Some(previous.id.clone()),
            is_current: true,
            created_at: previous.created_at,
            updated_at: now,
        };

        self.db
            .query(
                "BEGIN TRANSACTION; \
                 UPDATE type::thing($table, $prev_id) SET is_current = false; \
                 CREATE type::thing($table, $new_id) CONTENT $new_object; \
                 COMMIT TRANSACTION;",
            )
            .bind(("table", OBJECT_TABLE))
            .bind(("prev_id", previous.id.clone()))
            .bind(("new_id", new_id))
            .bind(("new_object", new_object.clone()))
            .await
            .map_err(AppError::Database)?
            .check()
            .map_err(AppError::Database)?;

        Ok(new_object)
    }

    /// `CreateRelationship`: resolves both endpoints to canonical
    /// ids, builds `triplet_text`, and invalidates a contradicting
    /// same-triple edge that is still active when the new edge's `valid_at`
    /// is newer.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_relationship(
        &self,
        ctx: &TenantContext,
        rel_type: &str,
        src_any: &str,
        dst_any: &str,
        properties: PropertyMap,
        embedding: Option<Vec<f32>>,
    ) -> Result<GraphRelationship, AppError> {
        let src = self.current_version(ctx, src_any).await?;
        let dst = self.current_version(ctx, dst_any).await?;

        let triplet_text = humanize_triplet(&src, rel_type, &dst);
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let relationship = GraphRelationship {
            id: id.clone(),
            project_id: ctx.project_id.clone(),
            rel_type: rel_type.to_string(),
            source_canonical_id: src.canonical_id.clone(),
            target_canonical_id: dst.canonical_id.clone(),
            properties,
            triplet_text,
            embedding,
            valid_at: now,
            invalid_at: None,
            created_at: now,
        };

        #[derive(Deserialize)]
        struct Row {
            id: surrealdb::RecordId,
        }
        let mut resp = self
            .db
            .query(
                "SELECT id FROM type::table($table) WHERE project_id = $project_id \
                 AND rel_type = $rel_type AND source_canonical_id = $src \
                 AND target_canonical_id = $dst AND invalid_at IS NONE",
            )
            .bind(("table", RELATIONSHIP_TABLE))
            .bind(("project_id", ctx.project_id.clone()))
            .bind(("rel_type", rel_type.to_string()))
            .bind(("src", src.canonical_id.clone()))
            .bind(("dst", dst.canonical_id.clone()))
            .await
            .map_err(AppError::Database)?;
        let contradicting: Vec<Row> = resp.take(0).map_err(AppError::Database)?;

        let mut query = String::from("BEGIN TRANSACTION; ");
        for row in &contradicting {
            query.push_str(&format!(
                "UPDATE type::thing('{RELATIONSHIP_TABLE}', '{}') SET invalid_at = $now; ",
                row.id.key()
            ));
        }
        query.push_str("CREATE type::thing($table, $id) CONTENT $relationship; COMMIT TRANSACTION;");

        self.db
            .query(query)
            .bind(("table", RELATIONSHIP_TABLE))
            .bind(("id", id))
            .bind(("now", now))
            .bind(("relationship", relationship.clone()))
            .await
            .map_err(AppError::Database)?
            .check()
            .map_err(AppError::Database)?;

        Ok(relationship)
    }

    /// `HasRelationship`.
    pub async fn has_relationship(
        &self,
        ctx: &TenantContext,
        rel_type: &str,
        src_any: &str,
        dst_any: &str,
    ) -> Result<bool, AppError> {
        let src = self.resolve_canonical(ctx, src_any).await?;
        let dst = self.resolve_canonical(ctx, dst_any).await?;

        let mut resp = self
            .db
            .query(
                "SELECT count() FROM type::table($table) WHERE project_id = $project_id \
                 AND rel_type = $rel_type AND source_canonical_id = $src \
                 AND target_canonical_id = $dst AND invalid_at IS NONE GROUP ALL",
            )
            .bind(("table", RELATIONSHIP_TABLE))
            .bind(("project_id", ctx.project_id.clone()))
            .bind(("rel_type", rel_type.to_string()))
            .bind(("src", src))
            .bind(("dst", dst))
            .await
            .map_err(AppError::Database)?;

        #[derive(Deserialize)]
        struct CountRow {
            count: usize,
        }
        let rows: Vec<CountRow> = resp.take(0).map_err(AppError::Database)?;
        Ok(rows.first().map(|r| r.count > 0).unwrap_or(false))
    }

    /// Relationships touching `canonical_id` on either side, active only
    /// (`invalid_at IS NONE`). Used by `ExpandGraph`'s BFS frontier.
    pub async fn relationships_touching(
        &self,
        ctx: &TenantContext,
        canonical_id: &str,
    ) -> Result<Vec<GraphRelationship>, AppError> {
        let mut resp = self
            .db
            .query(
                "SELECT * FROM type::table($table) WHERE project_id = $project_id \
                 AND (source_canonical_id = $id OR target_canonical_id = $id) \
                 AND invalid_at IS NONE",
            )
            .bind(("table", RELATIONSHIP_TABLE))
            .bind(("project_id", ctx.project_id.clone()))
            .bind(("id", canonical_id.to_string()))
            .await
            .map_err(AppError::Database)?;
        resp.take(0).map_err(AppError::Database)
    }

    pub async fn get_current_object(
        &self,
        ctx: &TenantContext,
        canonical_id: &str,
    ) -> Result<Option<GraphObject>, AppError> {
        match self.current_version(ctx, canonical_id).await {
            Ok(obj) => Ok(Some(obj)),
            Err(AppError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Stage 5 writes the object's triplet-style embedding here once it is
    /// computed; the version row itself is immutable otherwise.
    pub async fn set_object_embedding(
        &self,
        ctx: &TenantContext,
        canonical_id: &str,
        embedding: Vec<f32>,
    ) -> Result<(), AppError> {
        let current = self.current_version(ctx, canonical_id).await?;
        self.db
            .query("UPDATE type::thing($table, $id) SET embedding = $embedding")
            .bind(("table", OBJECT_TABLE))
            .bind(("id", current.id))
            .bind(("embedding", embedding))
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn get_relationship(&self, ctx: &TenantContext, id: &str) -> Result<GraphRelationship, AppError> {
        let mut resp = self
            .db
            .query(
                "SELECT * FROM type::table($table) WHERE project_id = $project_id \
                 AND id = type::thing($table, $id)",
            )
            .bind(("table", RELATIONSHIP_TABLE))
            .bind(("project_id", ctx.project_id.clone()))
            .bind(("id", id.to_string()))
            .await
            .map_err(AppError::Database)?;
        let rows: Vec<GraphRelationship> = resp.take(0).map_err(AppError::Database)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("relationship `{id}` not found")))
    }

    /// Stage 6 writes the `triplet_text` embedding here.
    pub async fn set_relationship_embedding(
        &self,
        ctx: &TenantContext,
        id: &str,
        embedding: Vec<f32>,
    ) -> Result<(), AppError> {
        self.db
            .query(
                "UPDATE type::thing($table, $id) SET embedding = $embedding \
                 WHERE project_id = $project_id",
            )
            .bind(("table", RELATIONSHIP_TABLE))
            .bind(("id", id.to_string()))
            .bind(("project_id", ctx.project_id.clone()))
            .bind(("embedding", embedding))
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        self.db
            .query(
                "DEFINE INDEX IF NOT EXISTS idx_graph_object_current ON TABLE graph_object \
                    FIELDS project_id, canonical_id, is_current; \
                 DEFINE INDEX IF NOT EXISTS idx_graph_object_key ON TABLE graph_object \
                    FIELDS project_id, object_type, key, is_current; \
                 DEFINE INDEX IF NOT EXISTS idx_graph_rel_endpoints ON TABLE graph_relationship \
                    FIELDS project_id, source_canonical_id, target_canonical_id, invalid_at;",
            )
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}

/// Flattened lowercase token list over an object's string-valued
/// properties, used for the `fts_vector` column. Scoring
/// over this column is out of scope.
fn tokenize_properties(properties: &PropertyMap) -> Vec<String> {
    properties
        .values()
        .filter_map(|value| value.as_str())
        .flat_map(|text| text.split(|c: char| !c.is_ascii_alphanumeric()))
        .filter(|token| !token.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

/// `humanize(src.type, type, dst.type) + subject/object keys`.
fn humanize_triplet(src: &GraphObject, rel_type: &str, dst: &GraphObject) -> String {
    let subject = src.key.as_deref().unwrap_or(&src.canonical_id);
    let object = dst.key.as_deref().unwrap_or(&dst.canonical_id);
    format!(
        "{} ({}) {} {} ({})",
        src.object_type, subject, rel_type, dst.object_type, object
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tarn_common::PropertyValue;
    use tarn_schema::{ObjectSchema, PropertySchema, PropertyType};

    async fn setup() -> (GraphStore, Arc<SchemaRegistry>, TenantContext) {
        let db = Arc::new(SurrealDbClient::memory("test", "test").await.unwrap());
        let schemas = Arc::new(SchemaRegistry::new(db.clone()));
        let store = GraphStore::new(db, schemas.clone());
        store.ensure_schema().await.unwrap();
        let ctx = TenantContext::new("p1");

        let mut properties = BTreeMap::new();
        properties.insert(
            "name".to_string(),
            PropertySchema { prop_type: PropertyType::String, description: None },
        );
        let schema = ObjectSchema {
            name: "person".into(),
            version: 1,
            parent_version_id: None,
            properties,
            required: vec!["name".into()],
            extraction_guidelines: None,
            closed: false,
        };
        schemas.install(&ctx, schema, None).await.unwrap();

        (store, schemas, ctx)
    }

    fn name_props(name: &str) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert("name".into(), PropertyValue::String(name.into()));
        props
    }

    #[tokio::test]
    async fn create_object_assigns_id_equal_to_canonical_id_on_first_version() {
        let (store, _schemas, ctx) = setup().await;
        let obj = store
            .create_object(
                &ctx,
                CreateObjectRequest {
                    object_type: "person".into(),
                    schema_version: 1,
                    key: None,
                    properties: name_props("Ada"),
                },
            )
            .await
            .unwrap();
        assert_eq!(obj.id, obj.canonical_id);
    }

    #[tokio::test]
    async fn create_object_is_idempotent_on_key() {
        let (store, _schemas, ctx) = setup().await;
        let req = || CreateObjectRequest {
            object_type: "person".into(),
            schema_version: 1,
            key: Some("ada-lovelace".into()),
            properties: name_props("Ada"),
        };
        let a = store.create_object(&ctx, req()).await.unwrap();
        let b = store.create_object(&ctx, req()).await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn update_object_creates_new_version_preserving_canonical_id() {
        let (store, _schemas, ctx) = setup().await;
        let created = store
            .create_object(
                &ctx,
                CreateObjectRequest {
                    object_type: "person".into(),
                    schema_version: 1,
                    key: None,
                    properties: name_props("Ada"),
                },
            )
            .await
            .unwrap();

        let mut patch = PropertyMap::new();
        patch.insert("name".into(), PropertyValue::String("Ada Lovelace".into()));
        let updated = store.update_object(&ctx, &created.id, patch).await.unwrap();

        assert_eq!(updated.canonical_id, created.canonical_id);
        assert_ne!(updated.id, created.id);
        assert_eq!(updated.supersedes_id.as_deref(), Some(created.id.as_str()));

        let resolved = store.resolve_canonical(&ctx, &created.id).await.unwrap();
        assert_eq!(resolved, created.canonical_id);
        let current = store.get_current_object(&ctx, &resolved).await.unwrap().unwrap();
        assert_eq!(current.id, updated.id);
    }

    #[tokio::test]
    async fn create_relationship_invalidates_prior_contradicting_edge() {
        let (store, _schemas, ctx) = setup().await;
        let a = store
            .create_object(
                &ctx,
                CreateObjectRequest {
                    object_type: "person".into(),
                    schema_version: 1,
                    key: None,
                    properties: name_props("Ada"),
                },
            )
            .await
            .unwrap();
        let b = store
            .create_object(
                &ctx,
                CreateObjectRequest {
                    object_type: "person".into(),
                    schema_version: 1,
                    key: None,
                    properties: name_props("Charles"),
                },
            )
            .await
            .unwrap();

        let first = store
            .create_relationship(&ctx, "knows", &a.id, &b.id, PropertyMap::new(), None)
            .await
            .unwrap();
        assert!(store.has_relationship(&ctx, "knows", &a.id, &b.id).await.unwrap());

        let second = store
            .create_relationship(&ctx, "knows", &a.id, &b.id, PropertyMap::new(), None)
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        assert!(store.has_relationship(&ctx, "knows", &a.id, &b.id).await.unwrap());

        let rels = store.relationships_touching(&ctx, &a.canonical_id).await.unwrap();
        assert_eq!(rels.len(), 1, "only the active edge should be returned");
        assert_eq!(rels[0].id, second.id);
    }
}
