//! # docrag Vector Store
//!
//! Embedding and similarity search for retrieval-augmented generation.
//!
//! ## Features
//!
//! - **Pluggable embedders** behind the [`Embedder`] trait: ONNX Runtime sentence models,
//!   or a deterministic hash stand-in when no model is available
//! - **Two search backends** chosen at construction: an exact inner-product flat index
//!   and a brute-force cosine scan
//! - **Stable ranking**: equal scores keep insertion order
//!
//! ## Architecture
//!
//! ```text
//! text chunks
//!     │
//!     ├──> Embedder (ONNX / hash)
//!     │      └─> Vec<f32>[dim]
//!     │
//!     ├──> SearchBackend (slot = insertion order)
//!     │      ├─> FlatIpIndex  (exact, inner product)
//!     │      └─> CosineScan   (brute force, cosine)
//!     │
//!     └──> IndexedEntry[slot] { text, metadata, vector }
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use docrag_vector_store::{load_embedder, EmbedderConfig, Metadata, SearchMode, VectorStore};
//!
//! fn main() -> docrag_vector_store::Result<()> {
//!     let embedder = load_embedder(&EmbedderConfig::default())?;
//!     let mut store = VectorStore::new(embedder, SearchMode::Exact);
//!
//!     store.add_texts(vec![("Rust has no garbage collector".to_string(), Metadata::new())])?;
//!
//!     for result in store.search("memory management", 4)? {
//!         println!("{:.3}: {}", result.score, result.text);
//!     }
//!     Ok(())
//! }
//! ```

mod embeddings;
mod error;
mod index;
mod store;
mod types;

pub use embeddings::{
    load_embedder, try_load_embedder, Embedder, EmbedderConfig, EmbedderKind, EmbeddingMode,
    HashEmbedder, OnnxEmbedder, DEFAULT_DIMENSION,
};
pub use error::{Result, VectorStoreError};
pub use index::{cosine_similarity, new_backend, CosineScan, FlatIpIndex, SearchBackend, SearchMode};
pub use store::VectorStore;
pub use types::{IndexedEntry, Metadata, SearchQuery, SearchResult};
