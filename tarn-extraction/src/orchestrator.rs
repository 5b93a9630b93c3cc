use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tarn_common::AppError;
use tokio::sync::Semaphore;
use tracing::info;

use crate::entity_extractor::EntityExtractor;
use crate::merge::merge_by_key_similarity;
use crate::quality_checker::QualityChecker;
use crate::relationship_builder::{IterationStrategy, RelationshipBuilder};
use crate::types::{AcceptedObject, ChunkInput, ExtractionContext, ExtractionResult};

/// Three-agent pipeline, run once per Stage 4 job. Fans the Entity
/// Extractor out over a chunk batch bounded by an internal semaphore, merges
/// the results, then drives the Relationship Builder / Quality Checker
/// retry loop over the merged object set.
pub struct ExtractionPipeline {
    entity_extractor: EntityExtractor,
    relationship_builder: RelationshipBuilder,
    max_concurrent_chunks: usize,
}

impl ExtractionPipeline {
    pub fn new(
        entity_extractor: EntityExtractor,
        relationship_builder: RelationshipBuilder,
        max_concurrent_chunks: usize,
    ) -> Self {
        Self { entity_extractor, relationship_builder, max_concurrent_chunks: max_concurrent_chunks.max(1) }
    }

    pub async fn run(
        &self,
        chunks: &[ChunkInput],
        enabled_types: Vec<String>,
        schemas: Vec<tarn_schema::ObjectSchema>,
    ) -> Result<ExtractionResult, AppError> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_chunks));

        let per_chunk: Vec<(Vec<AcceptedObject>, Vec<String>)> = stream::iter(chunks.iter().cloned())
            .map(|chunk| {
                let semaphore = Arc::clone(&semaphore);
                let enabled_types = enabled_types.clone();
                let schemas = schemas.clone();
                async move {
                    let _permit = semaphore.acquire().await;
                    let ctx = ExtractionContext { enabled_types, schemas, chunk_text: chunk.text };
                    self.entity_extractor.extract(&ctx).await
                }
            })
            .buffer_unordered(self.max_concurrent_chunks)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>, AppError>>()?;

        let mut issues: Vec<String> = Vec::new();
        let batches: Vec<Vec<AcceptedObject>> = per_chunk
            .into_iter()
            .map(|(objects, chunk_issues)| {
                issues.extend(chunk_issues);
                objects
            })
            .collect();

        let mut merged_objects = merge_by_key_similarity(batches);

        let merge_ctx = ExtractionContext {
            enabled_types,
            schemas,
            chunk_text: chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n\n"),
        };

        let (relationships, orphan_keys, final_issues) =
            self.run_relationship_loop(&merge_ctx, &merged_objects).await?;
        issues.extend(final_issues);
        flag_low_confidence(&mut merged_objects, &orphan_keys);

        Ok(ExtractionResult { objects: merged_objects, relationships, issues })
    }

    async fn run_relationship_loop(
        &self,
        ctx: &ExtractionContext,
        objects: &[AcceptedObject],
    ) -> Result<(Vec<crate::types::AcceptedRelationship>, Vec<String>, Vec<String>), AppError> {
        let mut strategy = IterationStrategy::Initial;
        let mut issues = Vec::new();

        for iteration in 1..=3u8 {
            let relationships = self.relationship_builder.propose(ctx, objects, &strategy).await?;
            let report = QualityChecker::check(objects, &relationships);

            info!(iteration, orphan_rate = report.orphan_rate, "quality check complete");

            if !QualityChecker::needs_retry(&report) || iteration == 3 {
                if QualityChecker::needs_retry(&report) {
                    issues.push(format!(
                        "orphan_rate {:.2} still above threshold after {iteration} iterations; \
                         flagging {} orphan(s) as low confidence",
                        report.orphan_rate,
                        report.orphan_keys.len()
                    ));
                }
                return Ok((relationships, report.orphan_keys, issues));
            }

            strategy = match iteration {
                1 => IterationStrategy::HighlightOrphans(report.orphan_keys),
                _ => IterationStrategy::RelaxTypeConstraints,
            };
        }

        unreachable!("loop always returns by iteration 3")
    }
}

fn flag_low_confidence(objects: &mut [AcceptedObject], orphan_keys: &[String]) {
    for object in objects {
        if let Some(key) = &object.key {
            if orphan_keys.contains(key) {
                object.low_confidence = true;
            }
        }
    }
}
