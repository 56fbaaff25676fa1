use crate::error::{ensure_vector, Result, VectorStoreError};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Which search backend a store uses; fixed for the lifetime of the store
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    /// Exact inner-product search over a flat index
    Exact,
    /// Cosine similarity against every stored vector
    BruteForce,
}

impl SearchMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::BruteForce => "brute-force",
        }
    }
}

impl Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = VectorStoreError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "exact" | "flat" | "ip" => Ok(Self::Exact),
            "brute-force" | "brute_force" | "cosine" => Ok(Self::BruteForce),
            other => Err(VectorStoreError::Config(format!(
                "Unsupported search mode '{other}' (expected 'exact' or 'brute-force')"
            ))),
        }
    }
}

/// Append-only nearest-neighbour index addressed by insertion slot.
///
/// Slot `i` is the `i`-th vector passed to [`SearchBackend::add`]. Results are ranked by
/// descending score; equal scores keep insertion order.
pub trait SearchBackend: Send + Sync {
    fn mode(&self) -> SearchMode;

    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn add(&mut self, vector: &[f32]) -> Result<()>;

    /// Returns at most `k` `(slot, score)` pairs, never padded
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>>;
}

/// Build the backend for `mode`
#[must_use]
pub fn new_backend(mode: SearchMode, dimension: usize) -> Box<dyn SearchBackend> {
    match mode {
        SearchMode::Exact => Box::new(FlatIpIndex::new(dimension)),
        SearchMode::BruteForce => Box::new(CosineScan::new(dimension)),
    }
}

/// Flat inner-product index over un-normalized vectors
pub struct FlatIpIndex {
    dimension: usize,
    /// Row-major `(len, dimension)` matrix
    data: Vec<f32>,
}

impl FlatIpIndex {
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }
}

impl SearchBackend for FlatIpIndex {
    fn mode(&self) -> SearchMode {
        SearchMode::Exact
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        if self.dimension == 0 {
            return 0;
        }
        self.data.len() / self.dimension
    }

    fn add(&mut self, vector: &[f32]) -> Result<()> {
        ensure_vector(vector, self.dimension)?;
        self.data.extend_from_slice(vector);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        ensure_vector(query, self.dimension)?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let matrix = ArrayView2::from_shape((self.len(), self.dimension), self.data.as_slice())
            .map_err(|e| VectorStoreError::IndexError(format!("Flat index shape error: {e}")))?;
        let scores = matrix.dot(&ArrayView1::from(query));

        Ok(top_k(scores.iter().copied().enumerate(), k))
    }
}

/// Brute-force cosine similarity scan
pub struct CosineScan {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl CosineScan {
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }
}

impl SearchBackend for CosineScan {
    fn mode(&self) -> SearchMode {
        SearchMode::BruteForce
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn add(&mut self, vector: &[f32]) -> Result<()> {
        ensure_vector(vector, self.dimension)?;
        self.vectors.push(vector.to_vec());
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        ensure_vector(query, self.dimension)?;
        if k == 0 || self.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let scored = self
            .vectors
            .iter()
            .map(|vector| cosine_similarity(query, vector))
            .enumerate();

        Ok(top_k(scored, k))
    }
}

/// Stable descending sort, then keep the first `k`
fn top_k(scored: impl Iterator<Item = (usize, f32)>, k: usize) -> Vec<(usize, f32)> {
    let mut scores: Vec<(usize, f32)> = scored.collect();
    scores.sort_by(|a, b| b.1.total_cmp(&a.1));
    scores.truncate(k);
    scores
}

/// Cosine similarity; zero when the lengths differ or either vector has zero norm
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
