use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tarn_common::{AppError, SurrealDbClient, TenantContext};

const TABLE: &str = "document";

/// `parse_status`: advances exactly once, `Pending ->
/// {Parsed | Failed}`. There is no retry-in-place; a document whose parse
/// failed is superseded by a new upload, not re-parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    Pending,
    Parsed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub project_id: String,
    pub source_ref: String,
    pub content_hash: String,
    pub mime: String,
    pub parsed_text: Option<String>,
    pub parse_status: ParseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Thin persistence layer for Stage 1's input/output. Not a
/// numbered component of its own; it is the stage-wiring crate's share of
/// the data model, grounded on the teacher's `stored_object!` record shape.
pub struct DocumentStore {
    db: Arc<SurrealDbClient>,
}

impl DocumentStore {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        ctx: &TenantContext,
        source_ref: impl Into<String>,
        content_hash: impl Into<String>,
        mime: impl Into<String>,
    ) -> Result<Document, AppError> {
        let now = Utc::now();
        let document = Document {
            id: Uuid::new_v4().to_string(),
            project_id: ctx.project_id.clone(),
            source_ref: source_ref.into(),
            content_hash: content_hash.into(),
            mime: mime.into(),
            parsed_text: None,
            parse_status: ParseStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let _: Option<Document> = self
            .db
            .client
            .create((TABLE, document.id.as_str()))
            .content(document.clone())
            .await
            .map_err(AppError::Database)?;

        Ok(document)
    }

    pub async fn get(&self, ctx: &TenantContext, id: &str) -> Result<Document, AppError> {
        let mut resp = self
            .db
            .query("SELECT * FROM type::table($table) WHERE project_id = $project_id AND id = type::thing($table, $id)")
            .bind(("table", TABLE))
            .bind(("project_id", ctx.project_id.clone()))
            .bind(("id", id.to_string()))
            .await
            .map_err(AppError::Database)?;
        let rows: Vec<Document> = resp.take(0).map_err(AppError::Database)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("document `{id}` not found")))
    }

    /// Advances `parse_status` from `Pending` to `Parsed`, filling in the
    /// immutable text. Rejects a document that has already advanced.
    pub async fn mark_parsed(&self, ctx: &TenantContext, id: &str, text: String) -> Result<Document, AppError> {
        let document = self.get(ctx, id).await?;
        if document.parse_status != ParseStatus::Pending {
            return Err(AppError::Conflict(format!("document `{id}` already advanced past pending")));
        }

        self.db
            .query(
                "UPDATE type::thing($table, $id) SET parsed_text = $text, parse_status = 'parsed', \
                 updated_at = $now RETURN AFTER",
            )
            .bind(("table", TABLE))
            .bind(("id", id.to_string()))
            .bind(("text", text.clone()))
            .bind(("now", Utc::now()))
            .await
            .map_err(AppError::Database)?;

        Ok(Document { parsed_text: Some(text), parse_status: ParseStatus::Parsed, ..document })
    }

    pub async fn mark_failed(&self, ctx: &TenantContext, id: &str, _error: &str) -> Result<Document, AppError> {
        let document = self.get(ctx, id).await?;
        if document.parse_status != ParseStatus::Pending {
            return Err(AppError::Conflict(format!("document `{id}` already advanced past pending")));
        }

        self.db
            .query("UPDATE type::thing($table, $id) SET parse_status = 'failed', updated_at = $now")
            .bind(("table", TABLE))
            .bind(("id", id.to_string()))
            .bind(("now", Utc::now()))
            .await
            .map_err(AppError::Database)?;

        Ok(Document { parse_status: ParseStatus::Failed, ..document })
    }

    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        self.db
            .query("DEFINE INDEX IF NOT EXISTS idx_document_project ON TABLE document FIELDS project_id;")
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}
