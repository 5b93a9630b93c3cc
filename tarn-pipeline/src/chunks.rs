use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tarn_common::{AppError, SurrealDbClient, TenantContext};

const TABLE: &str = "chunk";

/// `{id, project_id, document_id, index, start_offset, end_offset, text,
/// embedding?, fts_vector}`. `fts_vector` is a lowercase token
/// list; full-text scoring itself is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRow {
    pub id: String,
    pub project_id: String,
    pub document_id: String,
    pub index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    pub fts_vector: Vec<String>,
}

pub struct ChunkStore {
    db: Arc<SurrealDbClient>,
}

impl ChunkStore {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }

    /// Inserts all chunks of a document in one call. `index` is unique per
    /// document by construction (the chunker assigns indices sequentially).
    pub async fn insert_chunks(
        &self,
        ctx: &TenantContext,
        document_id: &str,
        chunks: Vec<tarn_chunking::Chunk>,
    ) -> Result<Vec<ChunkRow>, AppError> {
        let mut rows = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let row = ChunkRow {
                id: Uuid::new_v4().to_string(),
                project_id: ctx.project_id.clone(),
                document_id: document_id.to_string(),
                index: chunk.index,
                start_offset: chunk.start_offset,
                end_offset: chunk.end_offset,
                fts_vector: tokenize(&chunk.text),
                text: chunk.text,
                embedding: None,
            };
            let _: Option<ChunkRow> = self
                .db
                .client
                .create((TABLE, row.id.as_str()))
                .content(row.clone())
                .await
                .map_err(AppError::Database)?;
            rows.push(row);
        }
        Ok(rows)
    }

    pub async fn list_by_document(&self, ctx: &TenantContext, document_id: &str) -> Result<Vec<ChunkRow>, AppError> {
        let mut resp = self
            .db
            .query(
                "SELECT * FROM type::table($table) WHERE project_id = $project_id \
                 AND document_id = $document_id ORDER BY index",
            )
            .bind(("table", TABLE))
            .bind(("project_id", ctx.project_id.clone()))
            .bind(("document_id", document_id.to_string()))
            .await
            .map_err(AppError::Database)?;
        resp.take(0).map_err(AppError::Database)
    }

    pub async fn set_embedding(&self, ctx: &TenantContext, chunk_id: &str, embedding: Vec<f32>) -> Result<(), AppError> {
        self.db
            .query(
                "UPDATE type::thing($table, $id) SET embedding = $embedding \
                 WHERE project_id = $project_id",
            )
            .bind(("table", TABLE))
            .bind(("id", chunk_id.to_string()))
            .bind(("project_id", ctx.project_id.clone()))
            .bind(("embedding", embedding))
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        self.db
            .query(
                "DEFINE INDEX IF NOT EXISTS idx_chunk_document ON TABLE chunk \
                    FIELDS project_id, document_id, index;",
            )
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_then_list_preserves_index_order() {
        let db = Arc::new(SurrealDbClient::memory("test", "test").await.unwrap());
        let store = ChunkStore::new(db);
        store.ensure_schema().await.unwrap();
        let ctx = TenantContext::new("p1");

        let chunks = vec![
            tarn_chunking::Chunk { index: 1, start_offset: 10, end_offset: 20, text: "b".into(), heading_path: None },
            tarn_chunking::Chunk { index: 0, start_offset: 0, end_offset: 10, text: "a".into(), heading_path: None },
        ];
        store.insert_chunks(&ctx, "doc-1", chunks).await.unwrap();

        let rows = store.list_by_document(&ctx, "doc-1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].index, 0);
        assert_eq!(rows[1].index, 1);
    }

    #[tokio::test]
    async fn set_embedding_is_scoped_to_the_owning_tenant() {
        let db = Arc::new(SurrealDbClient::memory("test", "test").await.unwrap());
        let store = ChunkStore::new(db);
        store.ensure_schema().await.unwrap();
        let ctx = TenantContext::new("p1");

        let chunks = vec![tarn_chunking::Chunk { index: 0, start_offset: 0, end_offset: 5, text: "hello".into(), heading_path: None }];
        let rows = store.insert_chunks(&ctx, "doc-1", chunks).await.unwrap();
        let chunk_id = rows[0].id.clone();

        store.set_embedding(&ctx, &chunk_id, vec![0.1, 0.2]).await.unwrap();
        let refreshed = store.list_by_document(&ctx, "doc-1").await.unwrap();
        assert_eq!(refreshed[0].embedding, Some(vec![0.1, 0.2]));
    }
}
