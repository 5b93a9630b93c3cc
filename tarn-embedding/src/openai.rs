use async_openai::config::OpenAIConfig;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_openai::Client;
use async_trait::async_trait;
use tarn_common::AppError;

use crate::backend::EmbeddingBackend;

/// Default backend: OpenAI's embeddings endpoint, exactly as
/// `common::utils::embedding::generate_embedding_with_params` calls it,
/// extended here to a single request per batch rather than one per text.
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: u32,
}

impl OpenAiBackend {
    pub fn new(client: Client<OpenAIConfig>, model: impl Into<String>, dimensions: u32) -> Self {
        Self {
            client,
            model: model.into(),
            dimensions,
        }
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiBackend {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .dimensions(self.dimensions)
            .input(texts.to_vec())
            .build()
            .map_err(AppError::OpenAI)?;

        let response = self.client.embeddings().create(request).await.map_err(|err| {
            AppError::TransientUpstream(format!("embedding request failed: {err}"))
        })?;

        if response.data.len() != texts.len() {
            return Err(AppError::LLMParsing(format!(
                "expected {} embeddings, received {}",
                texts.len(),
                response.data.len()
            )));
        }

        let mut by_index: Vec<(usize, Vec<f32>)> = response
            .data
            .into_iter()
            .map(|d| (d.index as usize, d.embedding))
            .collect();
        by_index.sort_by_key(|(index, _)| *index);

        Ok(by_index.into_iter().map(|(_, vector)| vector).collect())
    }

    fn dimension(&self) -> u32 {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
