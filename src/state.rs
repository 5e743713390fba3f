use std::sync::Arc;
use std::time::Duration;

use crate::core::config::{AppPaths, Settings};
use crate::core::errors::ApiError;
use crate::index::sqlite::{connect_with_retry, ConnectRetry, SqliteVectorIndex};
use crate::ingest::chunker::Chunker;
use crate::ingest::pipeline::IngestionPipeline;
use crate::llm::embedding::EmbeddingClient;
use crate::llm::gemini::GeminiProvider;
use crate::llm::provider::{GenerationConfig, ModelProvider};
use crate::query::evaluator::Evaluator;
use crate::query::generator::Generator;
use crate::query::pipeline::QueryPipeline;
use crate::query::retriever::Retriever;
use crate::storage::metadata::{MetadataStore, SqliteMetadataStore};
use crate::storage::object::{FsObjectStore, ObjectStore};

/// Shared application state. All external clients are constructed here,
/// once per process, and injected into the pipelines.
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub objects: Arc<dyn ObjectStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub ingestion: IngestionPipeline,
    pub query: QueryPipeline,
}

impl AppState {
    pub async fn initialize(settings: Settings, paths: &AppPaths) -> Result<Arc<Self>, ApiError> {
        let pool = connect_with_retry(
            &paths.db_path,
            ConnectRetry {
                max_attempts: settings.db_connect_attempts,
                delay: Duration::from_millis(settings.db_connect_delay_ms),
            },
            tokio::time::sleep,
        )
        .await?;

        let index = Arc::new(SqliteVectorIndex::new(pool.clone()).await?);
        let metadata: Arc<dyn MetadataStore> = Arc::new(SqliteMetadataStore::new(pool).await?);
        let objects: Arc<dyn ObjectStore> =
            Arc::new(FsObjectStore::new(paths.objects_dir.clone()));

        if settings.api_key.is_empty() {
            tracing::warn!("GEMINI_API_KEY is not set; model calls will degrade");
        }
        let provider: Arc<dyn ModelProvider> = Arc::new(GeminiProvider::new(
            settings.api_base_url.clone(),
            settings.api_key.clone(),
        ));

        let embedder = EmbeddingClient::new(
            provider.clone(),
            settings.embedding_model.clone(),
            settings.embedding_dimension,
        );
        let generation_config = GenerationConfig {
            temperature: settings.temperature,
            top_p: settings.top_p,
            top_k: settings.top_k,
            max_output_tokens: settings.max_output_tokens,
        };

        let ingestion = IngestionPipeline::new(
            objects.clone(),
            index.clone(),
            metadata.clone(),
            embedder.clone(),
            Chunker::new(settings.chunk_size, settings.chunk_overlap),
        );

        let query = QueryPipeline::new(
            Retriever::new(embedder, index),
            Generator::new(provider.clone(), generation_config),
            Evaluator::new(provider, generation_config),
            settings.generation_model.clone(),
            settings.search_limit,
        );

        Ok(Arc::new(AppState {
            settings,
            objects,
            metadata,
            ingestion,
            query,
        }))
    }
}
