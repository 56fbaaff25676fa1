use crate::error::{ensure_vector, Result, VectorStoreError};
use ndarray::{Array, Axis, Ix2, Ix3};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider, ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputs};
use ort::value::{DynTensor, Tensor};
use ort::Error as OrtError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

/// Dimension used by the hash embedder when no model reports one
pub const DEFAULT_DIMENSION: usize = 384;

const DIMENSION_PROBE: &str = "dimension probe";

/// Requested embedding backend
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingMode {
    /// Pretrained sentence-embedding model, degrading to `Hash` when it cannot load
    Model,
    /// Deterministic hash stand-in
    Hash,
}

impl EmbeddingMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Hash => "hash",
        }
    }
}

impl FromStr for EmbeddingMode {
    type Err = VectorStoreError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "model" | "onnx" => Ok(Self::Model),
            "hash" | "stub" => Ok(Self::Hash),
            other => Err(VectorStoreError::Config(format!(
                "Unsupported embedding mode '{other}' (expected 'model' or 'hash')"
            ))),
        }
    }
}

/// Backend actually producing vectors
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    Onnx,
    Hash,
}

impl EmbedderKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Onnx => "onnx",
            Self::Hash => "hash",
        }
    }
}

impl Display for EmbedderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct EmbedderConfig {
    pub mode: EmbeddingMode,
    /// Directory holding `model.onnx` and `tokenizer.json`
    pub model_dir: PathBuf,
    /// Hash-embedder dimension (also used after a model fallback)
    pub dimension: usize,
    pub max_length: usize,
    pub max_batch: usize,
    pub use_cuda: bool,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            mode: EmbeddingMode::Model,
            model_dir: PathBuf::from("models/all-minilm-l6-v2"),
            dimension: DEFAULT_DIMENSION,
            max_length: 256,
            max_batch: 32,
            use_cuda: false,
        }
    }
}

impl EmbedderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(VectorStoreError::Config("dimension must be > 0".to_string()));
        }
        if self.max_batch == 0 {
            return Err(VectorStoreError::Config("max_batch must be > 0".to_string()));
        }
        if self.max_length == 0 {
            return Err(VectorStoreError::Config(
                "max_length must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Maps texts to fixed-length vectors.
///
/// `encode` returns one vector per input in input order, each of length `dim()`.
/// Implementations may block for a long time (model inference); async callers should
/// run them on a blocking thread.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;

    fn kind(&self) -> EmbedderKind;

    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    fn encode_one(&self, text: &str) -> Result<Vec<f32>> {
        self.encode(&[text])?
            .pop()
            .ok_or_else(|| VectorStoreError::EmbeddingError("Empty embedding result".to_string()))
    }
}

/// Deterministic, non-semantic embedder.
///
/// Every component of a text's vector equals `((fnv1a(text) % 10^8) % 1000) / 1000`, so
/// all vectors point the same way: cosine similarity between two of them is 1.0 (or 0.0
/// when a scalar is zero), and texts colliding mod 1000 get identical vectors. Use it
/// only to run the pipeline without a model.
#[derive(Clone, Debug)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(VectorStoreError::Config("dimension must be > 0".to_string()));
        }
        Ok(Self { dimension })
    }

    /// The value every component of `text`'s vector takes, in `[0, 1)`
    #[must_use]
    pub fn scalar(text: &str) -> f32 {
        let reduced = (fnv1a_64(text.as_bytes()) % 100_000_000) % 1000;
        reduced as f32 / 1000.0
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dimension
    }

    fn kind(&self) -> EmbedderKind {
        EmbedderKind::Hash
    }

    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| vec![Self::scalar(text); self.dimension])
            .collect())
    }
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Sentence-embedding model running on ONNX Runtime
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_length: usize,
    max_batch: usize,
    dimension: usize,
}

impl OnnxEmbedder {
    /// Load `model.onnx` + `tokenizer.json` from `config.model_dir` and probe the output
    /// dimension
    pub fn load(config: &EmbedderConfig) -> Result<Self> {
        config.validate()?;

        // Single-threaded tokenization unless TOKENIZERS_PARALLELISM says otherwise
        if !tokenizers::utils::parallelism::is_parallelism_configured() {
            tokenizers::utils::parallelism::set_parallelism(false);
        }

        let model_path = config.model_dir.join("model.onnx");
        let tokenizer_path = config.model_dir.join("tokenizer.json");
        if !model_path.exists() || !tokenizer_path.exists() {
            return Err(VectorStoreError::ModelUnavailable(format!(
                "Expected ONNX model at {} and tokenizer at {}",
                model_path.display(),
                tokenizer_path.display(),
            )));
        }

        let tokenizer = load_tokenizer(&tokenizer_path, config.max_length)?;
        let session = build_session(&model_path, config.use_cuda)?;

        let mut embedder = Self {
            session: Mutex::new(session),
            tokenizer,
            max_length: config.max_length,
            max_batch: config.max_batch,
            dimension: 0,
        };

        let probe = embedder.run_batch(&[DIMENSION_PROBE.to_string()])?;
        embedder.dimension = probe
            .first()
            .map(Vec::len)
            .filter(|dim| *dim > 0)
            .ok_or_else(|| {
                VectorStoreError::ModelUnavailable(
                    "Model produced an empty embedding for the dimension probe".to_string(),
                )
            })?;

        log::info!(
            "Loaded ONNX model from {} (dim {}, max_length {}, batch {})",
            config.model_dir.display(),
            embedder.dimension,
            embedder.max_length,
            embedder.max_batch
        );

        Ok(embedder)
    }

    fn run_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(batch.to_vec(), true)
            .map_err(|e| VectorStoreError::EmbeddingError(format!("Tokenization failed: {e}")))?;

        if encodings.is_empty() {
            return Ok(Vec::new());
        }

        let seq_len = encodings[0].len();
        if seq_len > self.max_length {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Tokenized length {} exceeds max_length {}",
                seq_len, self.max_length
            )));
        }
        if encodings.iter().any(|e| e.len() != seq_len) {
            return Err(VectorStoreError::EmbeddingError(
                "Inconsistent sequence lengths after padding".to_string(),
            ));
        }
        let (ids, masks, type_ids, mask_rows) = build_flat_tensors(&encodings, seq_len);

        let ids_array = Array::from_shape_vec((batch.len(), seq_len), ids)
            .map_err(|e| VectorStoreError::EmbeddingError(format!("IDs shape error: {e}")))?;
        let mask_array = Array::from_shape_vec((batch.len(), seq_len), masks)
            .map_err(|e| VectorStoreError::EmbeddingError(format!("Mask shape error: {e}")))?;
        let type_array = Array::from_shape_vec((batch.len(), seq_len), type_ids)
            .map_err(|e| VectorStoreError::EmbeddingError(format!("Types shape error: {e}")))?;

        let mut available: HashMap<String, DynTensor> = HashMap::new();
        available.insert(
            "input_ids".to_string(),
            Tensor::from_array(ids_array.into_dyn())
                .map_err(|e| to_embedding_error(&e))?
                .upcast(),
        );
        available.insert(
            "attention_mask".to_string(),
            Tensor::from_array(mask_array.into_dyn())
                .map_err(|e| to_embedding_error(&e))?
                .upcast(),
        );
        available.insert(
            "token_type_ids".to_string(),
            Tensor::from_array(type_array.into_dyn())
                .map_err(|e| to_embedding_error(&e))?
                .upcast(),
        );

        let array = {
            let mut session = self.session.lock().map_err(|_| {
                VectorStoreError::EmbeddingError("Failed to lock ONNX session".into())
            })?;

            let mut feed: HashMap<String, DynTensor> = HashMap::new();
            for input in &session.inputs {
                let key = input.name.clone();
                let value = available.remove(&key).ok_or_else(|| {
                    VectorStoreError::EmbeddingError(format!("Unsupported ONNX input '{key}'"))
                })?;
                feed.insert(key, value);
            }

            let outputs = session.run(SessionInputs::from(feed)).map_err(|e| {
                VectorStoreError::EmbeddingError(format!("ONNX forward failed: {e}"))
            })?;

            if outputs.len() == 0 {
                return Err(VectorStoreError::EmbeddingError(
                    "ONNX returned no outputs".to_string(),
                ));
            }

            let array = outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| {
                    VectorStoreError::EmbeddingError(format!("Failed to decode ONNX output: {e}"))
                })?
                .to_owned();

            drop(outputs);
            drop(session);

            array
        };

        embeddings_from_output(array, &mask_rows)
    }
}

impl Embedder for OnnxEmbedder {
    fn dim(&self) -> usize {
        self.dimension
    }

    fn kind(&self) -> EmbedderKind {
        EmbedderKind::Onnx
    }

    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.max_batch) {
            let owned: Vec<String> = batch.iter().map(ToString::to_string).collect();
            let embeddings = self.run_batch(&owned)?;
            if embeddings.len() != batch.len() {
                return Err(VectorStoreError::EmbeddingError(format!(
                    "Model returned {} embeddings for {} texts",
                    embeddings.len(),
                    batch.len()
                )));
            }
            for embedding in &embeddings {
                ensure_vector(embedding, self.dimension)?;
            }
            results.extend(embeddings);
        }
        Ok(results)
    }
}

fn load_tokenizer(path: &Path, max_length: usize) -> Result<Tokenizer> {
    let mut tokenizer = Tokenizer::from_file(path).map_err(|e| {
        VectorStoreError::ModelUnavailable(format!("Tokenizer load failed: {e}"))
    })?;
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        ..PaddingParams::default()
    }));
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..TruncationParams::default()
        }))
        .map_err(|e| {
            VectorStoreError::ModelUnavailable(format!("Tokenizer truncation failed: {e}"))
        })?;
    Ok(tokenizer)
}

fn build_session(model_path: &Path, use_cuda: bool) -> Result<Session> {
    let (intra_threads, inter_threads) = default_ort_threads();

    Session::builder()
        .map_err(unavailable("create ONNX session builder"))?
        .with_intra_threads(intra_threads)
        .map_err(unavailable("set ORT intra threads"))?
        .with_inter_threads(inter_threads)
        .map_err(unavailable("set ORT inter threads"))?
        .with_execution_providers(execution_providers(use_cuda))
        .map_err(unavailable("register execution providers"))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(unavailable("set optimization level"))?
        .commit_from_file(model_path)
        .map_err(unavailable("load ONNX model"))
}

fn unavailable<E: Display>(what: &'static str) -> impl FnOnce(E) -> VectorStoreError {
    move |e| VectorStoreError::ModelUnavailable(format!("Failed to {what}: {e}"))
}

fn execution_providers(use_cuda: bool) -> Vec<ExecutionProviderDispatch> {
    if use_cuda {
        let cuda = CUDAExecutionProvider::default();
        match cuda.is_available() {
            Ok(true) => return vec![cuda.build()],
            Ok(false) => log::warn!("CUDA execution provider is not available, using CPU"),
            Err(err) => log::warn!("CUDA execution provider check failed, using CPU: {err}"),
        }
    }
    vec![CPUExecutionProvider::default().build()]
}

fn default_ort_threads() -> (usize, usize) {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    let intra_threads = if cpus <= 4 {
        1
    } else if cpus <= 12 {
        2
    } else {
        4
    };

    (intra_threads, 1)
}

fn embeddings_from_output(
    array: ndarray::ArrayD<f32>,
    mask_rows: &[Vec<i64>],
) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::new();
    match array.ndim() {
        2 => {
            let embeddings = array
                .into_dimensionality::<Ix2>()
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Bad output shape: {e}")))?;
            out.reserve(embeddings.len_of(Axis(0)));
            for row in embeddings.outer_iter() {
                let mut emb = row.to_vec();
                normalize(&mut emb);
                out.push(emb);
            }
        }
        3 => {
            let hidden = array
                .into_dimensionality::<Ix3>()
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Bad output shape: {e}")))?;
            out.reserve(hidden.len_of(Axis(0)));
            for (idx, sample) in hidden.outer_iter().enumerate() {
                let attn = mask_rows
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| vec![1; sample.len_of(Axis(0))]);
                let mut emb = mean_pool(sample, &attn);
                normalize(&mut emb);
                out.push(emb);
            }
        }
        _ => {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Unexpected ONNX output dims: {:?}",
                array.shape()
            )));
        }
    }
    Ok(out)
}

fn mean_pool(sample: ndarray::ArrayView2<'_, f32>, mask: &[i64]) -> Vec<f32> {
    if sample.is_empty() {
        return vec![];
    }

    let hidden = sample.len_of(Axis(1));
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0.0f32;

    for (token_idx, token) in sample.outer_iter().enumerate() {
        if *mask.get(token_idx).unwrap_or(&0) == 0 {
            continue;
        }
        count += 1.0;
        for (dim, value) in token.iter().enumerate() {
            sum[dim] += value;
        }
    }

    if count == 0.0 {
        return sum;
    }

    for value in &mut sum {
        *value /= count;
    }

    sum
}

fn build_flat_tensors(
    encodings: &[Encoding],
    seq_len: usize,
) -> (Vec<i64>, Vec<i64>, Vec<i64>, Vec<Vec<i64>>) {
    let mut ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut masks = Vec::with_capacity(encodings.len() * seq_len);
    let mut type_ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut mask_rows = Vec::with_capacity(encodings.len());

    for encoding in encodings {
        let encoding_ids = encoding.get_ids();
        let encoding_masks = encoding.get_attention_mask();
        let encoding_types = encoding.get_type_ids();

        for idx in 0..seq_len {
            ids.push(i64::from(*encoding_ids.get(idx).unwrap_or(&0)));
            masks.push(i64::from(*encoding_masks.get(idx).unwrap_or(&0)));
            type_ids.push(i64::from(*encoding_types.get(idx).unwrap_or(&0)));
        }

        mask_rows.push(
            encoding_masks
                .iter()
                .take(seq_len)
                .map(|v| i64::from(*v))
                .collect(),
        );
    }

    (ids, masks, type_ids, mask_rows)
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

fn to_embedding_error(error: &OrtError) -> VectorStoreError {
    VectorStoreError::EmbeddingError(format!("{error}"))
}

/// Build the embedder `config` asks for, without degrading.
///
/// In [`EmbeddingMode::Model`] a missing or broken model is reported as
/// [`VectorStoreError::ModelUnavailable`].
pub fn try_load_embedder(config: &EmbedderConfig) -> Result<Arc<dyn Embedder>> {
    config.validate()?;
    match config.mode {
        EmbeddingMode::Hash => Ok(Arc::new(HashEmbedder::new(config.dimension)?)),
        EmbeddingMode::Model => {
            let embedder = OnnxEmbedder::load(config).map_err(|err| match err {
                VectorStoreError::Config(_) | VectorStoreError::ModelUnavailable(_) => err,
                other => VectorStoreError::ModelUnavailable(other.to_string()),
            })?;
            Ok(Arc::new(embedder))
        }
    }
}

/// Build the embedder `config` asks for, falling back to [`HashEmbedder`] with
/// `config.dimension` when the model is unavailable.
///
/// Configuration errors are still returned.
pub fn load_embedder(config: &EmbedderConfig) -> Result<Arc<dyn Embedder>> {
    match try_load_embedder(config) {
        Err(VectorStoreError::ModelUnavailable(reason)) => {
            log::warn!(
                "Embedding model unavailable ({reason}); falling back to deterministic hash embeddings (dim {})",
                config.dimension
            );
            Ok(Arc::new(HashEmbedder::new(config.dimension)?))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hash_embedder_shape_and_order() {
        let embedder = HashEmbedder::new(8).unwrap();
        let vectors = embedder.encode(&["first", "second"]).unwrap();

        assert_eq!(vectors.len(), 2);
        for vector in &vectors {
            assert_eq!(vector.len(), 8);
        }
        assert_eq!(vectors[0], vec![HashEmbedder::scalar("first"); 8]);
        assert_eq!(vectors[1], vec![HashEmbedder::scalar("second"); 8]);
        assert!(embedder.encode(&[]).unwrap().is_empty());
    }

    #[test]
    fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(16).unwrap();
        let a = embedder.encode_one("the same text").unwrap();
        let b = embedder.encode_one("the same text").unwrap();
        assert_eq!(a, b);
        assert_eq!(
            HashEmbedder::new(16).unwrap().encode_one("the same text").unwrap(),
            a
        );
    }

    #[test]
    fn hash_scalar_is_fnv_mod_thousand() {
        // FNV-1a of the empty string is the offset basis.
        let expected = ((0xcbf2_9ce4_8422_2325_u64 % 100_000_000) % 1000) as f32 / 1000.0;
        assert_eq!(HashEmbedder::scalar(""), expected);

        for text in ["a", "hello world", "ünïcödé"] {
            let value = HashEmbedder::scalar(text);
            assert!((0.0..1.0).contains(&value), "{text}: {value}");
        }
    }

    #[test]
    fn hash_embedder_rejects_zero_dimension() {
        assert!(matches!(
            HashEmbedder::new(0),
            Err(VectorStoreError::Config(_))
        ));
        assert!(try_load_embedder(&EmbedderConfig {
            mode: EmbeddingMode::Hash,
            dimension: 0,
            ..EmbedderConfig::default()
        }).is_err());
    }

    #[test]
    fn missing_model_is_reported_as_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbedderConfig {
            model_dir: dir.path().to_path_buf(),
            dimension: 12,
            ..EmbedderConfig::default()
        };

        let Err(err) = try_load_embedder(&config) else {
            panic!("expected missing model files to fail");
        };
        assert!(
            matches!(err, VectorStoreError::ModelUnavailable(_)),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn missing_model_degrades_to_hash() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbedderConfig {
            model_dir: dir.path().join("nope"),
            dimension: 12,
            ..EmbedderConfig::default()
        };

        let embedder = load_embedder(&config).unwrap();
        assert_eq!(embedder.kind(), EmbedderKind::Hash);
        assert_eq!(embedder.dim(), 12);
    }

    #[test]
    fn embedding_mode_parsing() {
        assert_eq!("hash".parse::<EmbeddingMode>().unwrap(), EmbeddingMode::Hash);
        assert_eq!(" Model ".parse::<EmbeddingMode>().unwrap(), EmbeddingMode::Model);
        assert!("gpu".parse::<EmbeddingMode>().is_err());
    }

    #[test]
    fn mean_pool_respects_mask() {
        let sample = ndarray::arr2(&[[1.0f32, 3.0], [3.0, 5.0], [100.0, 100.0]]);
        let pooled = mean_pool(sample.view(), &[1, 1, 0]);
        assert_eq!(pooled, vec![2.0, 4.0]);
    }

    #[test]
    #[ignore = "Requires an ONNX sentence-embedding model in models/all-minilm-l6-v2"]
    fn onnx_embedder_reports_model_dimension() {
        let embedder = try_load_embedder(&EmbedderConfig::default()).unwrap();
        assert_eq!(embedder.kind(), EmbedderKind::Onnx);
        let vectors = embedder.encode(&["hello world", "foo bar", "test"]).unwrap();
        assert_eq!(vectors.len(), 3);
        for vector in vectors {
            assert_eq!(vector.len(), embedder.dim());
        }
    }
}
