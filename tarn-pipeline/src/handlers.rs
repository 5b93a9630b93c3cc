use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use tarn_common::{AppError, TenantContext};
use tarn_embedding::EmbeddingService;
use tarn_extraction::{persist, ChunkInput, ExtractionPipeline};
use tarn_graph::GraphStore;
use tarn_jobs::{HandlerOutcome, Job, JobHandler, JobStore};
use tarn_schema::SchemaRegistry;

use crate::chunks::ChunkStore;
use crate::documents::{DocumentStore, ParseStatus};
use crate::parser::DocumentParser;
use crate::payloads::{
    ChunkPayload, ChunkStrategy, EmbedChunkPayload, EmbedObjectPayload, EmbedRelationshipPayload,
    ExtractPayload, ParsePayload,
};

/// Collapses a fallible stage body into the three-way outcome the pool
/// understands, using `AppError::classify` so a handler never repeats
/// the retryable/fatal distinction itself.
fn outcome_of(result: Result<(), AppError>) -> HandlerOutcome {
    match result {
        Ok(()) => HandlerOutcome::Done,
        Err(err) => match err.classify() {
            tarn_common::Classified::Retryable => HandlerOutcome::RetryableErr(err.to_string()),
            tarn_common::Classified::Fatal => HandlerOutcome::FatalErr(err.to_string()),
        },
    }
}

/// Stage 1: parse a document's source into text.
pub struct ParseHandler {
    pub documents: Arc<DocumentStore>,
    pub parser: Arc<dyn DocumentParser>,
    pub next: Arc<JobStore<ChunkPayload>>,
    pub default_strategy: ChunkStrategy,
    pub max_chars: usize,
    pub overlap: usize,
}

#[async_trait]
impl JobHandler<ParsePayload> for ParseHandler {
    async fn handle(&self, job: &Job<ParsePayload>, cancel: CancellationToken) -> HandlerOutcome {
        let ctx = TenantContext::new(job.project_id.clone());
        outcome_of(self.run(&ctx, job, &cancel).await)
    }
}

impl ParseHandler {
    async fn run(&self, ctx: &TenantContext, job: &Job<ParsePayload>, cancel: &CancellationToken) -> Result<(), AppError> {
        let document = self.documents.get(ctx, &job.payload.document_id).await?;
        if document.parse_status != ParseStatus::Pending {
            return Ok(());
        }

        let text = self.parser.parse(&document.source_ref, &document.mime).await?;
        if cancel.is_cancelled() {
            return Err(AppError::TransientUpstream("cancelled before parse committed".into()));
        }
        self.documents.mark_parsed(ctx, &document.id, text).await?;

        self.next
            .enqueue(
                ctx,
                ChunkPayload {
                    document_id: document.id,
                    strategy: self.default_strategy,
                    max_chars: self.max_chars,
                    overlap: self.overlap,
                },
            )
            .await?;
        Ok(())
    }
}

/// Stage 2: split a parsed document into chunks.
pub struct ChunkHandler {
    pub documents: Arc<DocumentStore>,
    pub chunks: Arc<ChunkStore>,
    pub next: Arc<JobStore<EmbedChunkPayload>>,
}

#[async_trait]
impl JobHandler<ChunkPayload> for ChunkHandler {
    async fn handle(&self, job: &Job<ChunkPayload>, _cancel: CancellationToken) -> HandlerOutcome {
        let ctx = TenantContext::new(job.project_id.clone());
        outcome_of(self.run(&ctx, job).await)
    }
}

impl ChunkHandler {
    async fn run(&self, ctx: &TenantContext, job: &Job<ChunkPayload>) -> Result<(), AppError> {
        let document = self.documents.get(ctx, &job.payload.document_id).await?;
        let text = document
            .parsed_text
            .ok_or_else(|| AppError::Validation(format!("document `{}` has no parsed text", document.id)))?;

        let chunks = match job.payload.strategy {
            ChunkStrategy::Character => tarn_chunking::character::character(&text, job.payload.max_chars, job.payload.overlap)?,
            ChunkStrategy::Sentence => tarn_chunking::sentence::sentence(&text, job.payload.max_chars)?,
            ChunkStrategy::Paragraph => tarn_chunking::paragraph::paragraph(&text, job.payload.max_chars)?,
            ChunkStrategy::Markdown => tarn_chunking::markdown::markdown(&text, job.payload.max_chars)?,
        };

        self.chunks.insert_chunks(ctx, &document.id, chunks).await?;
        self.next.enqueue(ctx, EmbedChunkPayload { document_id: document.id }).await?;
        Ok(())
    }
}

/// Stage 3: fill in chunk vectors.
pub struct EmbedChunkHandler {
    pub chunks: Arc<ChunkStore>,
    pub embedding: Arc<EmbeddingService>,
    pub next: Arc<JobStore<ExtractPayload>>,
    pub enabled_types: Vec<String>,
}

#[async_trait]
impl JobHandler<EmbedChunkPayload> for EmbedChunkHandler {
    async fn handle(&self, job: &Job<EmbedChunkPayload>, _cancel: CancellationToken) -> HandlerOutcome {
        let ctx = TenantContext::new(job.project_id.clone());
        outcome_of(self.run(&ctx, job).await)
    }
}

impl EmbedChunkHandler {
    async fn run(&self, ctx: &TenantContext, job: &Job<EmbedChunkPayload>) -> Result<(), AppError> {
        let rows = self.chunks.list_by_document(ctx, &job.payload.document_id).await?;
        let pending: Vec<_> = rows.into_iter().filter(|row| row.embedding.is_none()).collect();
        if pending.is_empty() {
            return self.enqueue_next(ctx, job).await;
        }

        let texts: Vec<String> = pending.iter().map(|row| row.text.clone()).collect();
        let vectors = self.embedding.embed(&texts).await?;

        for (row, vector) in pending.into_iter().zip(vectors) {
            self.chunks.set_embedding(ctx, &row.id, vector).await?;
        }

        self.enqueue_next(ctx, job).await
    }

    async fn enqueue_next(&self, ctx: &TenantContext, job: &Job<EmbedChunkPayload>) -> Result<(), AppError> {
        self.next
            .enqueue(
                ctx,
                ExtractPayload {
                    document_id: job.payload.document_id.clone(),
                    enabled_types: self.enabled_types.clone(),
                },
            )
            .await?;
        Ok(())
    }
}

/// Stage 4: run the three-agent extraction pipeline over a document's
/// chunks and persist the accepted objects/relationships through C6.
pub struct ExtractHandler {
    pub chunks: Arc<ChunkStore>,
    pub graph: Arc<GraphStore>,
    pub schemas: Arc<SchemaRegistry>,
    pub extraction: Arc<ExtractionPipeline>,
    pub next_object: Arc<JobStore<EmbedObjectPayload>>,
    pub next_relationship: Arc<JobStore<EmbedRelationshipPayload>>,
}

#[async_trait]
impl JobHandler<ExtractPayload> for ExtractHandler {
    async fn handle(&self, job: &Job<ExtractPayload>, _cancel: CancellationToken) -> HandlerOutcome {
        let ctx = TenantContext::new(job.project_id.clone());
        outcome_of(self.run(&ctx, job).await)
    }
}

impl ExtractHandler {
    async fn run(&self, ctx: &TenantContext, job: &Job<ExtractPayload>) -> Result<(), AppError> {
        let rows = self.chunks.list_by_document(ctx, &job.payload.document_id).await?;
        let chunk_inputs: Vec<ChunkInput> = rows
            .into_iter()
            .map(|row| ChunkInput { chunk_id: row.id, text: row.text })
            .collect();
        if chunk_inputs.is_empty() {
            return Ok(());
        }

        let mut schemas = Vec::with_capacity(job.payload.enabled_types.len());
        for object_type in &job.payload.enabled_types {
            match self.schemas.get(ctx, object_type, None).await {
                Ok(schema) => schemas.push(schema),
                Err(AppError::NotFound(_)) => {
                    warn!(object_type, "no installed schema; skipping from extraction context");
                }
                Err(err) => return Err(err),
            }
        }

        let result = self
            .extraction
            .run(&chunk_inputs, job.payload.enabled_types.clone(), schemas.clone())
            .await?;

        let outcome = persist(&self.graph, ctx, &schemas, &result).await?;

        for canonical_id in outcome.object_canonical_ids {
            self.next_object.enqueue(ctx, EmbedObjectPayload { canonical_id }).await?;
        }
        for relationship_id in outcome.relationship_ids {
            self.next_relationship
                .enqueue(ctx, EmbedRelationshipPayload { relationship_id })
                .await?;
        }

        Ok(())
    }
}

/// Stage 5: fill in an object's embedding.
pub struct EmbedObjectHandler {
    pub graph: Arc<GraphStore>,
    pub embedding: Arc<EmbeddingService>,
}

#[async_trait]
impl JobHandler<EmbedObjectPayload> for EmbedObjectHandler {
    async fn handle(&self, job: &Job<EmbedObjectPayload>, _cancel: CancellationToken) -> HandlerOutcome {
        let ctx = TenantContext::new(job.project_id.clone());
        outcome_of(self.run(&ctx, job).await)
    }
}

impl EmbedObjectHandler {
    async fn run(&self, ctx: &TenantContext, job: &Job<EmbedObjectPayload>) -> Result<(), AppError> {
        let Some(object) = self.graph.get_current_object(ctx, &job.payload.canonical_id).await? else {
            return Ok(());
        };
        let text = properties_to_text(&object.properties);
        let vector = self.embedding.embed(&[text]).await?.into_iter().next().unwrap_or_default();
        self.graph.set_object_embedding(ctx, &object.canonical_id, vector).await
    }
}

/// Stage 6: fill in a relationship's `triplet_text` embedding.
pub struct EmbedRelationshipHandler {
    pub graph: Arc<GraphStore>,
    pub embedding: Arc<EmbeddingService>,
}

#[async_trait]
impl JobHandler<EmbedRelationshipPayload> for EmbedRelationshipHandler {
    async fn handle(&self, job: &Job<EmbedRelationshipPayload>, _cancel: CancellationToken) -> HandlerOutcome {
        let ctx = TenantContext::new(job.project_id.clone());
        outcome_of(self.run(&ctx, job).await)
    }
}

impl EmbedRelationshipHandler {
    async fn run(&self, ctx: &TenantContext, job: &Job<EmbedRelationshipPayload>) -> Result<(), AppError> {
        let relationship = self.graph.get_relationship(ctx, &job.payload.relationship_id).await?;
        let vector = self
            .embedding
            .embed(&[relationship.triplet_text.clone()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        self.graph.set_relationship_embedding(ctx, &relationship.id, vector).await
    }
}

fn properties_to_text(properties: &tarn_common::PropertyMap) -> String {
    properties
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| format!("{k}: {s}")))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tarn_common::SurrealDbClient;
    use tarn_embedding::EmbeddingBackend;
    use tarn_jobs::JobStatus;

    use super::*;

    fn fake_job<P>(project_id: &str, payload: P) -> Job<P> {
        let now = chrono::Utc::now();
        Job {
            id: "job-1".to_string(),
            project_id: project_id.to_string(),
            payload,
            fingerprint: "fp".to_string(),
            status: JobStatus::Processing,
            attempt_count: 0,
            max_attempts: 3,
            last_error: None,
            enqueued_at: now,
            started_at: Some(now),
            completed_at: None,
            heartbeat_at: None,
            visible_after: now,
            lease_token: Some("lease".to_string()),
            lease_expires_at: Some(now),
        }
    }

    struct StubParser {
        text: &'static str,
    }

    #[async_trait]
    impl DocumentParser for StubParser {
        async fn parse(&self, _source_ref: &str, _mime: &str) -> Result<String, AppError> {
            Ok(self.text.to_string())
        }
    }

    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingBackend for CountingBackend {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }

        fn dimension(&self) -> u32 {
            1
        }

        fn model_id(&self) -> &str {
            "counting"
        }
    }

    async fn memory_db() -> Arc<SurrealDbClient> {
        Arc::new(SurrealDbClient::memory("test", "test").await.unwrap())
    }

    #[tokio::test]
    async fn parse_handler_marks_parsed_and_enqueues_a_chunk_job() {
        let db = memory_db().await;
        let documents = Arc::new(DocumentStore::new(Arc::clone(&db)));
        documents.ensure_schema().await.unwrap();
        let ctx = TenantContext::new("proj-1");
        let document = documents.create(&ctx, "doc.md", "hash", "text/plain").await.unwrap();

        let next = Arc::new(JobStore::new(Arc::clone(&db), "chunk_jobs", 3));
        next.ensure_schema().await.unwrap();

        let handler = ParseHandler {
            documents: Arc::clone(&documents),
            parser: Arc::new(StubParser { text: "hello world" }),
            next: Arc::clone(&next),
            default_strategy: ChunkStrategy::Character,
            max_chars: 100,
            overlap: 0,
        };

        let job = fake_job(&ctx.project_id, ParsePayload { document_id: document.id.clone() });
        let outcome = handler.handle(&job, CancellationToken::new()).await;
        assert!(matches!(outcome, HandlerOutcome::Done));

        let updated = documents.get(&ctx, &document.id).await.unwrap();
        assert_eq!(updated.parse_status, ParseStatus::Parsed);
        assert_eq!(updated.parsed_text.as_deref(), Some("hello world"));
    }

    #[tokio::test]
    async fn parse_handler_is_a_no_op_on_an_already_parsed_document() {
        let db = memory_db().await;
        let documents = Arc::new(DocumentStore::new(Arc::clone(&db)));
        documents.ensure_schema().await.unwrap();
        let ctx = TenantContext::new("proj-1");
        let document = documents.create(&ctx, "doc.md", "hash", "text/plain").await.unwrap();
        documents.mark_parsed(&ctx, &document.id, "already done".to_string()).await.unwrap();

        let next = Arc::new(JobStore::new(Arc::clone(&db), "chunk_jobs", 3));
        next.ensure_schema().await.unwrap();

        let handler = ParseHandler {
            documents: Arc::clone(&documents),
            parser: Arc::new(StubParser { text: "should not be used" }),
            next,
            default_strategy: ChunkStrategy::Character,
            max_chars: 100,
            overlap: 0,
        };

        let job = fake_job(&ctx.project_id, ParsePayload { document_id: document.id.clone() });
        let outcome = handler.handle(&job, CancellationToken::new()).await;
        assert!(matches!(outcome, HandlerOutcome::Done));

        let updated = documents.get(&ctx, &document.id).await.unwrap();
        assert_eq!(updated.parsed_text.as_deref(), Some("already done"));
    }

    #[tokio::test]
    async fn chunk_handler_splits_parsed_text_and_enqueues_embedding_job() {
        let db = memory_db().await;
        let documents = Arc::new(DocumentStore::new(Arc::clone(&db)));
        documents.ensure_schema().await.unwrap();
        let chunks = Arc::new(ChunkStore::new(Arc::clone(&db)));
        chunks.ensure_schema().await.unwrap();
        let ctx = TenantContext::new("proj-1");

        let document = documents.create(&ctx, "doc.md", "hash", "text/plain").await.unwrap();
        documents.mark_parsed(&ctx, &document.id, "a".repeat(50)).await.unwrap();

        let next = Arc::new(JobStore::new(Arc::clone(&db), "embed_chunk_jobs", 3));
        next.ensure_schema().await.unwrap();

        let handler = ChunkHandler { documents: Arc::clone(&documents), chunks: Arc::clone(&chunks), next };
        let job = fake_job(
            &ctx.project_id,
            ChunkPayload { document_id: document.id.clone(), strategy: ChunkStrategy::Character, max_chars: 20, overlap: 0 },
        );
        let outcome = handler.handle(&job, CancellationToken::new()).await;
        assert!(matches!(outcome, HandlerOutcome::Done));

        let rows = chunks.list_by_document(&ctx, &document.id).await.unwrap();
        assert!(rows.len() > 1, "a 50-char document at max_chars=20 should split into multiple chunks");
    }

    #[tokio::test]
    async fn embed_chunk_handler_only_embeds_chunks_missing_a_vector() {
        let db = memory_db().await;
        let chunks = Arc::new(ChunkStore::new(Arc::clone(&db)));
        chunks.ensure_schema().await.unwrap();
        let ctx = TenantContext::new("proj-1");

        let document_id = "doc-1".to_string();
        let raw_chunks = tarn_chunking::character::character(&"x".repeat(30), 10, 0).unwrap();
        let rows = chunks.insert_chunks(&ctx, &document_id, raw_chunks).await.unwrap();
        chunks.set_embedding(&ctx, &rows[0].id, vec![9.0]).await.unwrap();

        let backend = Arc::new(CountingBackend { calls: AtomicUsize::new(0) });
        let embedding = Arc::new(EmbeddingService::without_cache(backend.clone()));
        let next = Arc::new(JobStore::new(Arc::clone(&db), "extract_jobs", 3));
        next.ensure_schema().await.unwrap();

        let handler = EmbedChunkHandler {
            chunks: Arc::clone(&chunks),
            embedding,
            next,
            enabled_types: vec!["person".to_string()],
        };
        let job = fake_job(&ctx.project_id, EmbedChunkPayload { document_id: document_id.clone() });
        let outcome = handler.handle(&job, CancellationToken::new()).await;
        assert!(matches!(outcome, HandlerOutcome::Done));

        let updated = chunks.list_by_document(&ctx, &document_id).await.unwrap();
        assert!(updated.iter().all(|row| row.embedding.is_some()));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1, "already-embedded chunk must not be re-sent");
    }
}
