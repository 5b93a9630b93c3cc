use serde::{Deserialize, Serialize};

use tarn_jobs::JobPayload;

/// Stage 1: parse a document's source into text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsePayload {
    pub document_id: String,
}

impl JobPayload for ParsePayload {
    fn fingerprint_source(&self) -> String {
        format!("parse:{}", self.document_id)
    }
}

/// Stage 2: split a parsed document's text into chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub document_id: String,
    pub strategy: ChunkStrategy,
    pub max_chars: usize,
    pub overlap: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    Character,
    Sentence,
    Paragraph,
    Markdown,
}

impl JobPayload for ChunkPayload {
    fn fingerprint_source(&self) -> String {
        format!("chunk:{}:{:?}:{}:{}", self.document_id, self.strategy, self.max_chars, self.overlap)
    }
}

/// Stage 3: embed every chunk of a document that doesn't have a vector yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedChunkPayload {
    pub document_id: String,
}

impl JobPayload for EmbedChunkPayload {
    fn fingerprint_source(&self) -> String {
        format!("embed_chunk:{}", self.document_id)
    }
}

/// Stage 4: run the extraction pipeline over a document's chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractPayload {
    pub document_id: String,
    pub enabled_types: Vec<String>,
}

impl JobPayload for ExtractPayload {
    fn fingerprint_source(&self) -> String {
        format!("extract:{}", self.document_id)
    }
}

/// Stage 5: embed a single graph object's properties as triplet text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedObjectPayload {
    pub canonical_id: String,
}

impl JobPayload for EmbedObjectPayload {
    fn fingerprint_source(&self) -> String {
        format!("embed_object:{}", self.canonical_id)
    }
}

/// Stage 6: embed a relationship's `triplet_text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedRelationshipPayload {
    pub relationship_id: String,
}

impl JobPayload for EmbedRelationshipPayload {
    fn fingerprint_source(&self) -> String {
        format!("embed_relationship:{}", self.relationship_id)
    }
}
