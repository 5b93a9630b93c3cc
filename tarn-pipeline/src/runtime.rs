use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tarn_common::{AppConfig, AppError, SurrealDbClient};
use tarn_embedding::EmbeddingService;
use tarn_extraction::ExtractionPipeline;
use tarn_graph::GraphStore;
use tarn_health::HealthMonitor;
use tarn_jobs::{JobStore, Sweeper, WorkerPool};
use tarn_schema::SchemaRegistry;

use crate::chunks::ChunkStore;
use crate::documents::DocumentStore;
use crate::handlers::{
    ChunkHandler, EmbedChunkHandler, EmbedObjectHandler, EmbedRelationshipHandler, ExtractHandler, ParseHandler,
};
use crate::parser::DocumentParser;
use crate::payloads::{
    ChunkPayload, ChunkStrategy, EmbedChunkPayload, EmbedObjectPayload, EmbedRelationshipPayload, ExtractPayload,
    ParsePayload,
};

const RECOVER_INTERVAL: Duration = Duration::from_secs(30);
const PURGE_INTERVAL: Duration = Duration::from_secs(3600);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything one worker process needs to run the six pipeline stages
/// end to end: a `JobStore`/`WorkerPool`/`Sweeper` triplet per
/// queue, mirroring the teacher's one-pipeline-per-process shape
/// (`main/src/worker.rs`) generalized from a single queue to six.
pub struct PipelineRuntime {
    pub documents: Arc<DocumentStore>,
    pub chunks: Arc<ChunkStore>,

    parse_store: Arc<JobStore<ParsePayload>>,
    chunk_store: Arc<JobStore<ChunkPayload>>,
    embed_chunk_store: Arc<JobStore<EmbedChunkPayload>>,
    extract_store: Arc<JobStore<ExtractPayload>>,
    embed_object_store: Arc<JobStore<EmbedObjectPayload>>,
    embed_relationship_store: Arc<JobStore<EmbedRelationshipPayload>>,

    parse_pool: Arc<WorkerPool<ParsePayload, ParseHandler>>,
    chunk_pool: Arc<WorkerPool<ChunkPayload, ChunkHandler>>,
    embed_chunk_pool: Arc<WorkerPool<EmbedChunkPayload, EmbedChunkHandler>>,
    extract_pool: Arc<WorkerPool<ExtractPayload, ExtractHandler>>,
    embed_object_pool: Arc<WorkerPool<EmbedObjectPayload, EmbedObjectHandler>>,
    embed_relationship_pool: Arc<WorkerPool<EmbedRelationshipPayload, EmbedRelationshipHandler>>,
}

#[allow(clippy::too_many_arguments)]
impl PipelineRuntime {
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: &AppConfig,
        health: Arc<HealthMonitor>,
        schemas: Arc<SchemaRegistry>,
        graph: Arc<GraphStore>,
        parser: Arc<dyn DocumentParser>,
        embedding: Arc<EmbeddingService>,
        extraction: Arc<ExtractionPipeline>,
        enabled_types: Vec<String>,
    ) -> Self {
        let policy = config.default_policy.clone();
        let max_attempts = config.max_attempts;

        let documents = Arc::new(DocumentStore::new(Arc::clone(&db)));
        let chunks = Arc::new(ChunkStore::new(Arc::clone(&db)));

        let parse_store = Arc::new(JobStore::new(Arc::clone(&db), "parse_jobs", max_attempts));
        let chunk_store = Arc::new(JobStore::new(Arc::clone(&db), "chunk_jobs", max_attempts));
        let embed_chunk_store = Arc::new(JobStore::new(Arc::clone(&db), "embed_chunk_jobs", max_attempts));
        let extract_store = Arc::new(JobStore::new(Arc::clone(&db), "extract_jobs", max_attempts));
        let embed_object_store = Arc::new(JobStore::new(Arc::clone(&db), "embed_object_jobs", max_attempts));
        let embed_relationship_store =
            Arc::new(JobStore::new(Arc::clone(&db), "embed_relationship_jobs", max_attempts));

        let parse_handler = Arc::new(ParseHandler {
            documents: Arc::clone(&documents),
            parser,
            next: Arc::clone(&chunk_store),
            default_strategy: ChunkStrategy::Markdown,
            max_chars: 2000,
            overlap: 200,
        });
        let chunk_handler = Arc::new(ChunkHandler {
            documents: Arc::clone(&documents),
            chunks: Arc::clone(&chunks),
            next: Arc::clone(&embed_chunk_store),
        });
        let embed_chunk_handler = Arc::new(EmbedChunkHandler {
            chunks: Arc::clone(&chunks),
            embedding: Arc::clone(&embedding),
            next: Arc::clone(&extract_store),
            enabled_types: enabled_types.clone(),
        });
        let extract_handler = Arc::new(ExtractHandler {
            chunks: Arc::clone(&chunks),
            graph: Arc::clone(&graph),
            schemas,
            extraction,
            next_object: Arc::clone(&embed_object_store),
            next_relationship: Arc::clone(&embed_relationship_store),
        });
        let embed_object_handler =
            Arc::new(EmbedObjectHandler { graph: Arc::clone(&graph), embedding: Arc::clone(&embedding) });
        let embed_relationship_handler = Arc::new(EmbedRelationshipHandler { graph, embedding });

        Self {
            documents,
            chunks,
            parse_pool: Arc::new(WorkerPool::new(
                Arc::clone(&parse_store),
                Arc::clone(&health),
                policy.clone(),
                parse_handler,
            )),
            chunk_pool: Arc::new(WorkerPool::new(
                Arc::clone(&chunk_store),
                Arc::clone(&health),
                policy.clone(),
                chunk_handler,
            )),
            embed_chunk_pool: Arc::new(WorkerPool::new(
                Arc::clone(&embed_chunk_store),
                Arc::clone(&health),
                policy.clone(),
                embed_chunk_handler,
            )),
            extract_pool: Arc::new(WorkerPool::new(
                Arc::clone(&extract_store),
                Arc::clone(&health),
                policy.clone(),
                extract_handler,
            )),
            embed_object_pool: Arc::new(WorkerPool::new(
                Arc::clone(&embed_object_store),
                Arc::clone(&health),
                policy.clone(),
                embed_object_handler,
            )),
            embed_relationship_pool: Arc::new(WorkerPool::new(
                Arc::clone(&embed_relationship_store),
                health,
                policy,
                embed_relationship_handler,
            )),
            parse_store,
            chunk_store,
            embed_chunk_store,
            extract_store,
            embed_object_store,
            embed_relationship_store,
        }
    }

    /// Creates every queue table's indexes plus the document/chunk tables'.
    /// Idempotent; safe to call on every process start.
    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        self.documents.ensure_schema().await?;
        self.chunks.ensure_schema().await?;
        self.parse_store.ensure_schema().await?;
        self.chunk_store.ensure_schema().await?;
        self.embed_chunk_store.ensure_schema().await?;
        self.extract_store.ensure_schema().await?;
        self.embed_object_store.ensure_schema().await?;
        self.embed_relationship_store.ensure_schema().await?;
        Ok(())
    }

    /// Spawns every stage's worker pool and its sweeper, and runs them
    /// until `shutdown` fires, then waits for all of them to drain.
    pub async fn run(&self, shutdown: CancellationToken, completed_ttl: Duration) {
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        macro_rules! spawn_stage {
            ($store:expr, $pool:expr) => {{
                let pool = Arc::clone(&$pool);
                let watch_shutdown = shutdown.clone();
                let pool_shutdown_token = pool.shutdown_token();
                handles.push(tokio::spawn(async move {
                    watch_shutdown.cancelled().await;
                    pool_shutdown_token.cancel();
                }));
                handles.push(tokio::spawn(async move { pool.run(DRAIN_TIMEOUT).await }));

                let store = Arc::clone(&$store);
                let sweeper_shutdown = shutdown.clone();
                handles.push(tokio::spawn(async move {
                    let sweeper = Sweeper::new(store, RECOVER_INTERVAL, PURGE_INTERVAL, completed_ttl);
                    sweeper.run(sweeper_shutdown).await;
                }));
            }};
        }

        spawn_stage!(self.parse_store, self.parse_pool);
        spawn_stage!(self.chunk_store, self.chunk_pool);
        spawn_stage!(self.embed_chunk_store, self.embed_chunk_pool);
        spawn_stage!(self.extract_store, self.extract_pool);
        spawn_stage!(self.embed_object_store, self.embed_object_pool);
        spawn_stage!(self.embed_relationship_store, self.embed_relationship_pool);

        info!(stages = 6, "pipeline runtime started");
        for handle in handles {
            let _ = handle.await;
        }
    }
}

