use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use tarn_common::{AppError, PropertyMap, SurrealDbClient, TenantContext};

use crate::types::{ObjectSchema, SchemaInstallation};

const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    schema: ObjectSchema,
    cached_at: Instant,
}

/// Schema Registry (C5): resolves a project's active schema version,
/// installs new versions, and caches reads for `CACHE_TTL` the same way
/// `HealthMonitor` caches its last-known samples: a `RwLock`-guarded map
/// rather than an external cache dependency, since the working set (one
/// entry per project × schema name) is small and process-local.
pub struct SchemaRegistry {
    db: Arc<SurrealDbClient>,
    cache: RwLock<HashMap<(String, String), CacheEntry>>,
}

impl SchemaRegistry {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self {
            db,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// `Get(project_id, type, version?)`. When `version` is `None`,
    /// resolves the project's installed active version via
    /// [`SchemaInstallation`]; otherwise fetches that exact version.
    pub async fn get(
        &self,
        ctx: &TenantContext,
        type_name: &str,
        version: Option<u32>,
    ) -> Result<ObjectSchema, AppError> {
        let resolved_version = match version {
            Some(v) => v,
            None => self.active_version(ctx, type_name).await?,
        };

        let key = (ctx.project_id.clone(), format!("{type_name}@{resolved_version}"));
        if let Some(entry) = self.cache.read().await.get(&key) {
            if entry.cached_at.elapsed() < CACHE_TTL {
                return Ok(entry.schema.clone());
            }
        }

        #[derive(Deserialize)]
        struct Row {
            schema: ObjectSchema,
        }
        let mut resp = self
            .db
            .query(
                "SELECT schema FROM object_schema \
                 WHERE name = $name AND version = $version LIMIT 1",
            )
            .bind(("name", type_name.to_string()))
            .bind(("version", resolved_version))
            .await
            .map_err(AppError::Database)?;
        let rows: Vec<Row> = resp.take(0).map_err(AppError::Database)?;
        let schema = rows
            .into_iter()
            .next()
            .map(|r| r.schema)
            .ok_or_else(|| AppError::NotFound(format!("schema `{type_name}` v{resolved_version} not found")))?;

        self.cache.write().await.insert(
            key,
            CacheEntry {
                schema: schema.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(schema)
    }

    /// `ActiveVersion(project_id, name)`.
    pub async fn active_version(&self, ctx: &TenantContext, schema_name: &str) -> Result<u32, AppError> {
        #[derive(Deserialize)]
        struct Row {
            active_version: u32,
        }
        let mut resp = self
            .db
            .query(
                "SELECT active_version FROM schema_installation \
                 WHERE project_id = $project_id AND schema_name = $schema_name LIMIT 1",
            )
            .bind(("project_id", ctx.project_id.clone()))
            .bind(("schema_name", schema_name.to_string()))
            .await
            .map_err(AppError::Database)?;
        let rows: Vec<Row> = resp.take(0).map_err(AppError::Database)?;
        rows.into_iter()
            .next()
            .map(|r| r.active_version)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "no schema installation for `{schema_name}` in project `{}`",
                    ctx.project_id
                ))
            })
    }

    /// `Install(project_id, schema, overrides?)`: writes
    /// the schema definition and records it as the project's active version,
    /// invalidating any cached reads for this `(project, name)` pair.
    pub async fn install(
        &self,
        ctx: &TenantContext,
        schema: ObjectSchema,
        overrides: Option<PropertyMap>,
    ) -> Result<SchemaInstallation, AppError> {
        let id = format!("{}-{}", schema.name, schema.version);
        let _: Option<ObjectSchemaRow> = self
            .db
            .client
            .upsert(("object_schema", id.as_str()))
            .content(ObjectSchemaRow {
                schema: schema.clone(),
            })
            .await
            .map_err(AppError::Database)?;

        let installation = SchemaInstallation {
            project_id: ctx.project_id.clone(),
            schema_name: schema.name.clone(),
            active_version: schema.version,
            installed_at: Utc::now(),
            overrides: overrides.unwrap_or_default(),
        };
        let install_id = format!("{}-{}", ctx.project_id, schema.name);
        let _: Option<SchemaInstallation> = self
            .db
            .client
            .upsert(("schema_installation", install_id.as_str()))
            .content(installation.clone())
            .await
            .map_err(AppError::Database)?;

        let mut cache = self.cache.write().await;
        cache.retain(|(project, key), _| {
            !(project == &ctx.project_id && key.starts_with(&format!("{}@", schema.name)))
        });
        debug!(project_id = %ctx.project_id, schema = %schema.name, version = schema.version, "schema installed");

        Ok(installation)
    }
}

#[derive(serde::Serialize, Deserialize)]
struct ObjectSchemaRow {
    schema: ObjectSchema,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PropertySchema, PropertyType};
    use std::collections::BTreeMap;

    fn demo_schema(version: u32) -> ObjectSchema {
        let mut properties = BTreeMap::new();
        properties.insert(
            "title".to_string(),
            PropertySchema { prop_type: PropertyType::String, description: None },
        );
        ObjectSchema {
            name: "article".into(),
            version,
            parent_version_id: None,
            properties,
            required: vec!["title".into()],
            extraction_guidelines: None,
            closed: false,
        }
    }

    async fn registry() -> SchemaRegistry {
        let db = Arc::new(SurrealDbClient::memory("test", "test").await.unwrap());
        SchemaRegistry::new(db)
    }

    #[tokio::test]
    async fn install_then_get_resolves_active_version() {
        let reg = registry().await;
        let ctx = TenantContext::new("p1");
        reg.install(&ctx, demo_schema(1), None).await.unwrap();

        let version = reg.active_version(&ctx, "article").await.unwrap();
        assert_eq!(version, 1);

        let schema = reg.get(&ctx, "article", None).await.unwrap();
        assert_eq!(schema.version, 1);
    }

    #[tokio::test]
    async fn get_with_explicit_version_bypasses_active_version() {
        let reg = registry().await;
        let ctx = TenantContext::new("p1");
        reg.install(&ctx, demo_schema(1), None).await.unwrap();
        reg.install(&ctx, demo_schema(2), None).await.unwrap();

        let v1 = reg.get(&ctx, "article", Some(1)).await.unwrap();
        assert_eq!(v1.version, 1);
        let active = reg.get(&ctx, "article", None).await.unwrap();
        assert_eq!(active.version, 2);
    }

    #[tokio::test]
    async fn unknown_schema_is_not_found() {
        let reg = registry().await;
        let ctx = TenantContext::new("p1");
        let err = reg.get(&ctx, "nonexistent", Some(1)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
