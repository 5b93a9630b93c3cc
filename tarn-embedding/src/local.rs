use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, ModelTrait, TextEmbedding, TextInitOptions};
use tarn_common::AppError;
use tokio::sync::Mutex;

use crate::backend::EmbeddingBackend;

/// Alternate local-inference backend: wraps `fastembed`'s ONNX
/// runtime behind the same [`EmbeddingBackend`] trait the OpenAI backend
/// implements, so a deployment can swap embedding providers without
/// touching `tarn-pipeline`.
pub struct FastEmbedBackend {
    model: Arc<Mutex<TextEmbedding>>,
    model_id: String,
    dimension: u32,
}

impl FastEmbedBackend {
    /// `model_code` is the `fastembed::EmbeddingModel` string form (e.g.
    /// `"BAAI/bge-small-en-v1.5"`); `None` uses the crate's default model.
    pub async fn new(model_code: Option<&str>) -> Result<Self, AppError> {
        let model_name = match model_code {
            Some(code) => EmbeddingModel::from_str(code)
                .map_err(|err| AppError::Config(format!("unknown fastembed model {code}: {err}")))?,
            None => EmbeddingModel::default(),
        };

        let options = TextInitOptions::new(model_name.clone());
        let model_id = model_name.to_string();

        let (model, dimension) = tokio::task::spawn_blocking(move || {
            let model = TextEmbedding::try_new(options)
                .map_err(|err| AppError::Config(format!("initializing fastembed model: {err}")))?;
            let info = EmbeddingModel::get_model_info(&model_name)
                .ok_or_else(|| AppError::Config("fastembed model metadata missing".into()))?;
            Ok::<_, AppError>((model, info.dim))
        })
        .await
        .map_err(AppError::Join)??;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_id,
            dimension: dimension as u32,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for FastEmbedBackend {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let owned: Vec<String> = texts.to_vec();
        let model = Arc::clone(&self.model);
        let mut guard = model.lock().await;
        guard
            .embed(owned, None)
            .map_err(|err| AppError::InternalError(format!("fastembed inference failed: {err}")))
    }

    fn dimension(&self) -> u32 {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
