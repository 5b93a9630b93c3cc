use async_trait::async_trait;
use tarn_common::AppError;

/// One pluggable embedding model. Implementations own whatever client
/// or in-process model they need; callers only ever see batched text in,
/// vectors out.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a batch of texts in one upstream/model call. The returned
    /// vector has exactly `texts.len()` entries, in the same order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError>;

    /// Fixed dimension this backend always returns.
    fn dimension(&self) -> u32;

    /// Identifies the model for cache-key scoping and diagnostics.
    fn model_id(&self) -> &str;
}
