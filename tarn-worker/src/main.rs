use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tarn_common::{get_config, SurrealDbClient};
use tarn_embedding::{EmbeddingService, OpenAiBackend};
use tarn_extraction::{EntityExtractor, ExtractionPipeline, RelationshipBuilder};
use tarn_graph::GraphStore;
use tarn_health::{HealthMonitor, HealthSource, SystemHealthSource};
use tarn_pipeline::{PipelineRuntime, PlainTextParser};
use tarn_schema::SchemaRegistry;

const MAX_CONCURRENT_CHUNKS: usize = 4;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry().with(fmt::layer()).with(EnvFilter::from_default_env()).try_init().ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    let schemas = Arc::new(SchemaRegistry::new(Arc::clone(&db)));
    let graph = Arc::new(GraphStore::new(Arc::clone(&db), Arc::clone(&schemas)));
    graph.ensure_schema().await?;

    let openai_client = async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    );

    let embedding_backend =
        Arc::new(OpenAiBackend::new(openai_client.clone(), config.embedding_model.clone(), config.embedding_dimensions));
    let embedding = Arc::new(EmbeddingService::new(embedding_backend));

    let entity_extractor = EntityExtractor::new(openai_client.clone(), config.extraction_model.clone());
    let relationship_builder = RelationshipBuilder::new(openai_client, config.extraction_model.clone());
    let extraction = Arc::new(ExtractionPipeline::new(entity_extractor, relationship_builder, MAX_CONCURRENT_CHUNKS));

    let sample_interval = Duration::from_secs(config.health_sample_interval_secs.max(1));
    let health = Arc::new(HealthMonitor::new(sample_interval));

    let shutdown = CancellationToken::new();
    spawn_health_sampler(Arc::clone(&health), sample_interval, &shutdown);

    let runtime = PipelineRuntime::new(
        Arc::clone(&db),
        &config,
        health,
        schemas,
        graph,
        Arc::new(PlainTextParser),
        embedding,
        extraction,
        vec!["person".to_string(), "organization".to_string(), "location".to_string(), "event".to_string()],
    );
    runtime.ensure_schema().await?;

    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        shutdown_for_signal.cancel();
    });

    let completed_ttl = Duration::from_secs(u64::try_from(config.completed_ttl_secs).unwrap_or(0));
    runtime.run(shutdown, completed_ttl).await;
    Ok(())
}

fn spawn_health_sampler(health: Arc<HealthMonitor>, interval: Duration, shutdown: &CancellationToken) {
    let source = SystemHealthSource::new();
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = tick.tick() => health.record(source.sample()),
                () = shutdown.cancelled() => break,
            }
        }
    });
}
