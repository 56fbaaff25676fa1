use crate::config::ServiceConfig;
use crate::llm::{build_prompt, AnswerGenerator, OpenAiChatGenerator};
use crate::parser::{BuiltinParser, DocumentParser};
use docrag_protocol::{
    HealthResponse, QueryRequest, QueryResponse, UploadResponse, UploadStatus,
};
use docrag_text_chunker::{ChunkerError, Chunker, TextChunk};
use docrag_vector_store::{
    load_embedder, Embedder, Metadata, SearchResult, VectorStore, VectorStoreError,
};
use serde_json::json;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("Failed to parse file: {0}")]
    Parse(String),

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(&'static str),

    #[error(transparent)]
    Chunking(#[from] ChunkerError),

    #[error(transparent)]
    Store(#[from] VectorStoreError),

    #[error("Embedding timed out after {0:?}")]
    EmbeddingTimeout(Duration),

    #[error("Answer generation failed: {0}")]
    Generation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable machine-readable code for error envelopes
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedFile(_) => "unsupported_file",
            Self::Parse(_) => "parse_failed",
            Self::UnsupportedFeature(_) => "unsupported_feature",
            Self::Chunking(_) => "invalid_config",
            Self::Store(VectorStoreError::InvalidDimension { .. }) => "shape_mismatch",
            Self::Store(_) => "store_error",
            Self::EmbeddingTimeout(_) => "embedding_timeout",
            Self::Generation(_) => "generation_failed",
            Self::Internal(_) => "internal",
        }
    }

    /// Caused by the request rather than by the service
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFile(_)
                | Self::Parse(_)
                | Self::UnsupportedFeature(_)
                | Self::Store(VectorStoreError::InvalidDimension { .. })
        )
    }

    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::UnsupportedFile(_) => Some(format!(
                "Supported extensions: {}",
                BuiltinParser::EXTENSIONS.join(", ")
            )),
            Self::UnsupportedFeature(_) => {
                Some("Extract the image text yourself and include it in the question".to_string())
            }
            Self::EmbeddingTimeout(_) => Some("Raise --embed-timeout-ms".to_string()),
            _ => None,
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Ingestion and question answering over one shared in-memory store
pub struct RagService {
    embedder: Arc<dyn Embedder>,
    store: Arc<RwLock<VectorStore>>,
    chunker: Chunker,
    parser: Arc<dyn DocumentParser>,
    generator: Option<Arc<dyn AnswerGenerator>>,
    embed_timeout: Duration,
}

impl RagService {
    pub fn new(store: VectorStore, chunker: Chunker, embed_timeout: Duration) -> Self {
        Self {
            embedder: store.embedder().clone(),
            store: Arc::new(RwLock::new(store)),
            chunker,
            parser: Arc::new(BuiltinParser),
            generator: None,
            embed_timeout,
        }
    }

    /// Load the embedder (degrading to hash embeddings) and wire every collaborator
    pub fn from_config(config: &ServiceConfig) -> ServiceResult<Self> {
        let embedder = load_embedder(&config.embedder)?;
        let store = VectorStore::new(embedder, config.search_mode);
        let chunker = Chunker::new(config.chunking)?;

        let mut service = Self::new(store, chunker, config.embed_timeout);
        if let Some(llm) = &config.llm {
            service = service.with_generator(Arc::new(OpenAiChatGenerator::new(llm.clone())?));
        } else {
            log::info!("OPENAI_API_KEY not set; answers are disabled");
        }
        Ok(service)
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = parser;
        self
    }

    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Parse, chunk, embed and index one uploaded file
    pub async fn ingest(&self, filename: &str, bytes: &[u8]) -> ServiceResult<UploadResponse> {
        let texts = self.parser.parse(filename, bytes)?;
        let chunks_added = self.ingest_texts(filename, &texts).await?;
        Ok(UploadResponse {
            status: UploadStatus::Success,
            filename: filename.to_string(),
            chunks_added,
        })
    }

    /// Chunk `texts` with one running `chunk_index` and add them under a single write lock
    pub async fn ingest_texts(&self, filename: &str, texts: &[String]) -> ServiceResult<usize> {
        let chunks = self.chunker.chunk_all(texts.iter().map(String::as_str));
        if chunks.is_empty() {
            log::info!("{filename}: no words to index");
            return Ok(0);
        }

        let vectors = self
            .embed(chunks.iter().map(|chunk| chunk.text.clone()).collect())
            .await?;
        if vectors.len() != chunks.len() {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            ))
            .into());
        }

        let added = self.add_batch(filename, chunks, vectors)?;
        let total = self.read_store().len();
        log::info!("{filename}: indexed {added} chunks (store holds {total})");
        Ok(added)
    }

    fn add_batch(
        &self,
        filename: &str,
        chunks: Vec<TextChunk>,
        vectors: Vec<Vec<f32>>,
    ) -> ServiceResult<usize> {
        let mut store = self.write_store();
        // Reject the whole batch before the first insert
        for vector in &vectors {
            store.validate_vector(vector)?;
        }

        let added = chunks.len();
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            store.add(vector, chunk.text, chunk_metadata(filename, chunk.index))?;
        }
        Ok(added)
    }

    /// Embed the question and return the `top_k` closest chunks
    pub async fn retrieve(&self, question: &str, top_k: usize) -> ServiceResult<Vec<SearchResult>> {
        let store_empty = self.read_store().is_empty();
        if top_k == 0 || store_empty {
            return Ok(Vec::new());
        }

        let mut vectors = self.embed(vec![question.to_string()]).await?;
        let vector = vectors.pop().ok_or_else(|| {
            VectorStoreError::EmbeddingError("Empty embedding result".to_string())
        })?;

        let store = self.read_store();
        Ok(store.search(&vector, top_k)?)
    }

    pub async fn query(&self, request: &QueryRequest) -> ServiceResult<QueryResponse> {
        if request.image_base64.is_some() {
            return Err(ServiceError::UnsupportedFeature("image_base64 (OCR)"));
        }

        let results = self.retrieve(&request.question, request.top_k).await?;
        let context = results
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let answer = match &self.generator {
            Some(generator) => {
                let prompt = build_prompt(&context, &request.question);
                Some(generator.generate(&prompt).await?)
            }
            None => None,
        };

        Ok(QueryResponse {
            question: request.question.clone(),
            context,
            answer,
            scores: results.iter().map(|r| r.score).collect(),
            sources: results.into_iter().map(|r| r.metadata).collect(),
        })
    }

    #[must_use]
    pub fn health(&self) -> HealthResponse {
        let store = self.read_store();
        HealthResponse {
            status: "ok".to_string(),
            embedder: self.embedder.kind().to_string(),
            dim: store.dim(),
            search_mode: store.mode().to_string(),
            entries: store.len(),
        }
    }

    /// Run the embedder off the async runtime, bounded by the configured deadline
    async fn embed(&self, texts: Vec<String>) -> ServiceResult<Vec<Vec<f32>>> {
        let embedder = self.embedder.clone();
        let task = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            embedder.encode(&refs)
        });

        match tokio::time::timeout(self.embed_timeout, task).await {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(join)) => Err(ServiceError::Internal(format!("Embedding task failed: {join}"))),
            Err(_) => {
                log::warn!("Embedding exceeded {:?}", self.embed_timeout);
                Err(ServiceError::EmbeddingTimeout(self.embed_timeout))
            }
        }
    }

    fn read_store(&self) -> RwLockReadGuard<'_, VectorStore> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_store(&self) -> RwLockWriteGuard<'_, VectorStore> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn chunk_metadata(filename: &str, chunk_index: usize) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("filename".to_string(), json!(filename));
    metadata.insert("chunk_index".to_string(), json!(chunk_index));
    metadata
}
