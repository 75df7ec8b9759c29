use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::OnceCell;

use crate::{
    config::AppConfig,
    embedding::{EmbeddingError, MiniLmEmbedder, SimilarityRanker},
    llm::LlmClient,
    modules::literature::ReviewGenerator,
};

/// Shared, read-only per-process state handed to every request.
#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    generator: ReviewGenerator,
    ranker: Arc<OnceCell<SimilarityRanker>>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let llm_client =
            LlmClient::new(config.llm.clone()).context("failed to initialize LLM client")?;

        Ok(Self {
            config: Arc::new(config),
            generator: ReviewGenerator::new(llm_client),
            ranker: Arc::new(OnceCell::new()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn review_generator(&self) -> &ReviewGenerator {
        &self.generator
    }

    /// Ranker backed by the configured local embedding model, loaded on first use.
    /// A failed load is not cached; the next call retries.
    pub async fn similarity_ranker(&self) -> Result<&SimilarityRanker, EmbeddingError> {
        self.ranker
            .get_or_try_init(|| async {
                let model_id = self.config.embedding_model.clone();
                let embedder = tokio::task::spawn_blocking(move || MiniLmEmbedder::load(&model_id))
                    .await
                    .map_err(|err| EmbeddingError::ModelLoadFailed(err.to_string()))??;
                Ok::<_, EmbeddingError>(SimilarityRanker::new(Arc::new(embedder)))
            })
            .await
    }
}
