//! # docrag Text Chunker
//!
//! Deterministic word-window chunking for retrieval indexing.
//!
//! ## Algorithm
//!
//! ```text
//! Raw text
//!     │
//!     ├──> Split on whitespace → words[0..n]
//!     │
//!     ├──> Window [start, start + chunk_size)
//!     │      └─> start += chunk_size - overlap
//!     │
//!     └──> Join each window with single spaces
//!          (stop once a window reaches word n)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use docrag_text_chunker::{chunk_text, Chunker, ChunkingConfig};
//!
//! let chunks = chunk_text("a b c d e", 2, 1).unwrap();
//! assert_eq!(chunks, vec!["a b", "b c", "c d", "d e"]);
//!
//! let chunker = Chunker::new(ChunkingConfig::new(3, 1)).unwrap();
//! for chunk in chunker.chunk("the quick brown fox jumps") {
//!     println!("#{}: {}", chunk.index, chunk.text);
//! }
//! ```

mod chunker;
mod config;
mod error;
mod types;

pub use chunker::{chunk_text, Chunker};
pub use config::ChunkingConfig;
pub use error::{ChunkerError, Result};
pub use types::TextChunk;
