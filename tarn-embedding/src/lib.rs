#![allow(clippy::missing_docs_in_private_items)]

//! Embedding Service (C8): batched embedding with de-duplication, an
//! optional TTL cache, and a pluggable backend (`async-openai` by default,
//! `fastembed` for local inference), both behind [`EmbeddingBackend`].

mod backend;
mod cache;
mod local;
mod openai;
mod service;

pub use backend::EmbeddingBackend;
pub use local::FastEmbedBackend;
pub use openai::OpenAiBackend;
pub use service::EmbeddingService;
