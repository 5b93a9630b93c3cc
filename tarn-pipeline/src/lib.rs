//! Stage wiring: the Document/Chunk stores, the six `JobPayload` shapes
//! carried between stages, their `JobHandler` implementations, and the
//! `PipelineRuntime` that assembles a `JobStore`/`WorkerPool`/`Sweeper` per
//! queue for one worker process.

pub mod chunks;
pub mod documents;
pub mod handlers;
pub mod parser;
pub mod payloads;
pub mod runtime;

pub use chunks::{ChunkRow, ChunkStore};
pub use documents::{Document, DocumentStore, ParseStatus};
pub use handlers::{
    ChunkHandler, EmbedChunkHandler, EmbedObjectHandler, EmbedRelationshipHandler, ExtractHandler, ParseHandler,
};
pub use parser::{DocumentParser, PlainTextParser};
pub use payloads::{
    ChunkPayload, ChunkStrategy, EmbedChunkPayload, EmbedObjectPayload, EmbedRelationshipPayload, ExtractPayload,
    ParsePayload,
};
pub use runtime::PipelineRuntime;
