use crate::embeddings::Embedder;
use crate::error::{ensure_vector, Result, VectorStoreError};
use crate::index::{new_backend, SearchBackend, SearchMode};
use crate::types::{IndexedEntry, Metadata, SearchQuery, SearchResult};
use std::sync::Arc;

/// In-memory vector store bound to a single embedder.
///
/// Entries and backend slots are appended in lock-step: backend slot `i` always refers
/// to `entries()[i]`. Callers sharing a store across threads must guard the whole store
/// with one lock.
pub struct VectorStore {
    dimension: usize,
    entries: Vec<IndexedEntry>,
    backend: Box<dyn SearchBackend>,
    embedder: Arc<dyn Embedder>,
}

impl VectorStore {
    /// Create an empty store whose dimension is the embedder's
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, mode: SearchMode) -> Self {
        let dimension = embedder.dim();
        log::info!(
            "Initializing VectorStore (dim {dimension}, {mode} search, {} embedder)",
            embedder.kind()
        );
        Self {
            dimension,
            entries: Vec::new(),
            backend: new_backend(mode, dimension),
            embedder,
        }
    }

    /// Create an empty store over a caller-supplied backend
    pub fn with_backend(
        embedder: Arc<dyn Embedder>,
        backend: Box<dyn SearchBackend>,
    ) -> Result<Self> {
        if backend.dimension() != embedder.dim() {
            return Err(VectorStoreError::Config(format!(
                "backend dimension {} does not match embedder dimension {}",
                backend.dimension(),
                embedder.dim()
            )));
        }
        if !backend.is_empty() {
            return Err(VectorStoreError::Config(
                "backend must be empty when the store is created".to_string(),
            ));
        }
        Ok(Self {
            dimension: embedder.dim(),
            entries: Vec::new(),
            backend,
            embedder,
        })
    }

    /// Append one vector with its source text and metadata
    pub fn add(
        &mut self,
        vector: Vec<f32>,
        text: impl Into<String>,
        metadata: Metadata,
    ) -> Result<()> {
        ensure_vector(&vector, self.dimension)?;
        self.backend.add(&vector)?;
        self.entries.push(IndexedEntry {
            text: text.into(),
            metadata,
            vector,
        });
        Ok(())
    }

    /// Embed `items` with the bound embedder and append them in order
    pub fn add_texts(&mut self, items: Vec<(String, Metadata)>) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let texts: Vec<&str> = items.iter().map(|(text, _)| text.as_str()).collect();
        let vectors = self.embedder.encode(&texts)?;
        if vectors.len() != items.len() {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Embedder returned {} vectors for {} texts",
                vectors.len(),
                items.len()
            )));
        }

        let added = items.len();
        for ((text, metadata), vector) in items.into_iter().zip(vectors) {
            self.add(vector, text, metadata)?;
        }

        log::info!("Added {added} entries. Total: {}", self.entries.len());
        Ok(added)
    }

    /// Top-`top_k` entries by descending similarity.
    ///
    /// An empty store or `top_k == 0` yields an empty list without embedding anything.
    pub fn search<'q>(
        &self,
        query: impl Into<SearchQuery<'q>>,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        if self.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let neighbors = match query.into() {
            SearchQuery::Text(text) => {
                log::debug!("Searching for: '{text}' (top_k: {top_k})");
                let vector = self.embedder.encode_one(text)?;
                ensure_vector(&vector, self.dimension)?;
                self.backend.search(&vector, top_k)?
            }
            SearchQuery::Vector(vector) => {
                ensure_vector(vector, self.dimension)?;
                self.backend.search(vector, top_k)?
            }
        };

        let mut results = Vec::with_capacity(neighbors.len());
        for (slot, score) in neighbors {
            let entry = self.entries.get(slot).ok_or_else(|| {
                VectorStoreError::IndexError(format!(
                    "backend returned slot {slot} but the store holds {} entries",
                    self.entries.len()
                ))
            })?;
            results.push(SearchResult {
                score,
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
            });
        }

        log::debug!("Found {} results", results.len());
        Ok(results)
    }

    /// Check `vector` against this store without inserting it
    pub fn validate_vector(&self, vector: &[f32]) -> Result<()> {
        ensure_vector(vector, self.dimension)
    }

    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn mode(&self) -> SearchMode {
        self.backend.mode()
    }

    #[must_use]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    #[must_use]
    pub fn entries(&self) -> &[IndexedEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{EmbedderKind, HashEmbedder};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Maps known words to one-hot vectors and counts encode calls
    struct KeywordEmbedder {
        vocabulary: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl KeywordEmbedder {
        fn new(vocabulary: Vec<&'static str>) -> Self {
            Self {
                vocabulary,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Embedder for KeywordEmbedder {
        fn dim(&self) -> usize {
            self.vocabulary.len()
        }

        fn kind(&self) -> EmbedderKind {
            EmbedderKind::Hash
        }

        fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(texts
                .iter()
                .map(|text| {
                    self.vocabulary
                        .iter()
                        .map(|word| if text.contains(word) { 1.0 } else { 0.0 })
                        .collect()
                })
                .collect())
        }
    }

    fn meta(name: &str) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("name".to_string(), json!(name));
        metadata
    }

    fn hash_store(dim: usize, mode: SearchMode) -> VectorStore {
        VectorStore::new(Arc::new(HashEmbedder::new(dim).unwrap()), mode)
    }

    #[test]
    fn test_add_rejects_wrong_dimension() {
        let mut store = hash_store(4, SearchMode::Exact);
        let result = store.add(vec![1.0, 0.0, 0.0], "short", Metadata::new());
        assert!(matches!(
            result,
            Err(VectorStoreError::InvalidDimension {
                expected: 4,
                actual: 3
            })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_non_finite_vectors_rejected() {
        let mut store = hash_store(2, SearchMode::Exact);
        store.add(vec![1.0, 0.0], "match", meta("a")).unwrap();

        let result = store.add(vec![f32::NAN, 0.0], "nan", meta("b"));
        assert!(matches!(
            result,
            Err(VectorStoreError::InvalidVector { index: 0, .. })
        ));
        assert!(store
            .add(vec![0.0, f32::INFINITY], "inf", meta("c"))
            .is_err());
        assert_eq!(store.len(), 1);

        let results = store.search(&[1.0f32, 0.0][..], 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "match");
        assert!(store.search(&[f32::NAN, 1.0][..], 1).is_err());
        assert!(store.validate_vector(&[0.5, 0.5]).is_ok());
    }

    #[test]
    fn test_search_wrong_query_dimension() {
        let mut store = hash_store(4, SearchMode::BruteForce);
        store
            .add(vec![1.0, 0.0, 0.0, 0.0], "cat", Metadata::new())
            .unwrap();
        assert!(store.search(&[1.0f32, 0.0][..], 1).is_err());
    }

    #[test]
    fn test_text_query_uses_bound_embedder() {
        let embedder = Arc::new(KeywordEmbedder::new(vec!["cat", "dog", "fish"]));
        let mut store = VectorStore::new(embedder.clone(), SearchMode::BruteForce);

        let added = store
            .add_texts(vec![
                ("the cat sat".to_string(), meta("a")),
                ("a dog barked".to_string(), meta("b")),
                ("fish swim".to_string(), meta("c")),
            ])
            .unwrap();
        assert_eq!(added, 3);
        assert_eq!(embedder.calls.load(Ordering::Relaxed), 1);

        let results = store.search("where is the dog", 1).unwrap();
        assert_eq!(embedder.calls.load(Ordering::Relaxed), 2);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "a dog barked");
        assert_eq!(results[0].metadata, meta("b"));
    }

    #[test]
    fn test_empty_store_skips_embedding() {
        let embedder = Arc::new(KeywordEmbedder::new(vec!["cat"]));
        let store = VectorStore::new(embedder.clone(), SearchMode::Exact);

        assert!(store.search("cat", 4).unwrap().is_empty());
        assert!(store.search(&[1.0f32, 2.0, 3.0][..], 4).unwrap().is_empty());
        assert_eq!(embedder.calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_with_backend_checks_dimension() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(4).unwrap());
        let backend = new_backend(SearchMode::Exact, 3);
        assert!(VectorStore::with_backend(embedder.clone(), backend).is_err());

        let store =
            VectorStore::with_backend(embedder, new_backend(SearchMode::BruteForce, 4)).unwrap();
        assert_eq!(store.mode(), SearchMode::BruteForce);
        assert_eq!(store.dim(), 4);
    }

    #[test]
    fn test_entries_keep_vectors_in_insertion_order() {
        let mut store = hash_store(2, SearchMode::Exact);
        store.add(vec![0.5, 0.5], "first", meta("1")).unwrap();
        store.add(vec![0.5, 0.5], "first", meta("1")).unwrap();
        store.add(vec![1.0, 0.0], "second", meta("2")).unwrap();

        let texts: Vec<&str> = store.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "first", "second"]);
        assert_eq!(store.entries()[2].vector, vec![1.0, 0.0]);
    }
}
