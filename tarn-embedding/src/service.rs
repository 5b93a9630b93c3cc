use std::collections::HashMap;
use std::sync::Arc;

use tarn_common::AppError;

use crate::backend::EmbeddingBackend;
use crate::cache::EmbeddingCache;

/// `Embed(texts[]) -> vectors[dim]`: batches identical inputs into a
/// single upstream call and optionally serves repeats from an in-process
/// LRU cache, independent of which [`EmbeddingBackend`] is configured.
pub struct EmbeddingService {
    backend: Arc<dyn EmbeddingBackend>,
    cache: Option<EmbeddingCache>,
}

impl EmbeddingService {
    pub fn new(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            backend,
            cache: Some(EmbeddingCache::new()),
        }
    }

    pub fn without_cache(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self { backend, cache: None }
    }

    pub fn dimension(&self) -> u32 {
        self.backend.dimension()
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    /// Resolves every text in `texts`, in order. Duplicate strings within
    /// the batch (after cache lookups) are sent upstream exactly once.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut resolved: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut pending: Vec<(String, Vec<usize>)> = Vec::new();
        let mut pending_index: HashMap<&str, usize> = HashMap::new();

        for (i, text) in texts.iter().enumerate() {
            if let Some(cache) = &self.cache {
                let key = EmbeddingCache::key(text, self.backend.model_id());
                if let Some(vector) = cache.get(&key) {
                    resolved[i] = Some(vector);
                    continue;
                }
            }

            match pending_index.get(text.as_str()) {
                Some(&slot) => pending[slot].1.push(i),
                None => {
                    pending_index.insert(text.as_str(), pending.len());
                    pending.push((text.clone(), vec![i]));
                }
            }
        }

        if !pending.is_empty() {
            let unique_texts: Vec<String> = pending.iter().map(|(t, _)| t.clone()).collect();
            let vectors = self.backend.embed_batch(&unique_texts).await?;
            if vectors.len() != unique_texts.len() {
                return Err(AppError::LLMParsing(
                    "embedding backend returned a mismatched batch size".into(),
                ));
            }

            for ((text, indices), vector) in pending.into_iter().zip(vectors) {
                if let Some(cache) = &self.cache {
                    let key = EmbeddingCache::key(&text, self.backend.model_id());
                    cache.put(key, vector.clone());
                }
                for i in indices {
                    resolved[i] = Some(vector.clone());
                }
            }
        }

        resolved
            .into_iter()
            .enumerate()
            .map(|(i, vector)| {
                vector.ok_or_else(|| AppError::InternalError(format!("embedding for index {i} not resolved")))
            })
            .collect()
    }
}
