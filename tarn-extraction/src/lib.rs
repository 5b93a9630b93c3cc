#![allow(clippy::missing_docs_in_private_items)]

//! Extraction Pipeline (C9): entity extractor, relationship builder, and
//! quality checker agents, fanned out over a chunk batch and merged before
//! persisting through [`tarn_graph::GraphStore`].

mod entity_extractor;
mod merge;
mod orchestrator;
mod persist;
mod quality_checker;
mod relationship_builder;
mod schema;
mod types;

pub use entity_extractor::EntityExtractor;
pub use orchestrator::ExtractionPipeline;
pub use persist::{persist, PersistOutcome};
pub use quality_checker::{QualityChecker, QualityReport};
pub use relationship_builder::{IterationStrategy, RelationshipBuilder};
pub use types::{
    AcceptedObject, AcceptedRelationship, ChunkInput, ExtractionContext, ExtractionResult,
};
