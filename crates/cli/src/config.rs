use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, ValueEnum};
use docrag_text_chunker::ChunkingConfig;
use docrag_vector_store::{EmbedderConfig, EmbeddingMode, SearchMode, DEFAULT_DIMENSION};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
const DEFAULT_EMBED_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum EmbedModeArg {
    Model,
    Hash,
}

impl From<EmbedModeArg> for EmbeddingMode {
    fn from(arg: EmbedModeArg) -> Self {
        match arg {
            EmbedModeArg::Model => Self::Model,
            EmbedModeArg::Hash => Self::Hash,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum SearchModeArg {
    Exact,
    BruteForce,
}

impl From<SearchModeArg> for SearchMode {
    fn from(arg: SearchModeArg) -> Self {
        match arg {
            SearchModeArg::Exact => Self::Exact,
            SearchModeArg::BruteForce => Self::BruteForce,
        }
    }
}

/// Retrieval settings shared by every subcommand; unset flags fall back to `DOCRAG_*`
/// environment variables, then to defaults
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Embedding backend (env: DOCRAG_EMBEDDING_MODE)
    #[arg(long, global = true, value_enum)]
    pub embed_mode: Option<EmbedModeArg>,

    /// Directory containing model.onnx and tokenizer.json (env: DOCRAG_MODEL_DIR)
    #[arg(long, global = true)]
    pub model_dir: Option<PathBuf>,

    /// Vector dimension of the hash embedder (env: DOCRAG_EMBEDDING_DIM)
    #[arg(long, global = true)]
    pub dim: Option<usize>,

    /// Try the CUDA execution provider (env: DOCRAG_USE_CUDA)
    #[arg(long, global = true)]
    pub cuda: bool,

    /// Search backend (env: DOCRAG_SEARCH_MODE)
    #[arg(long, global = true, value_enum)]
    pub search_mode: Option<SearchModeArg>,

    /// Words per chunk (env: DOCRAG_CHUNK_SIZE)
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    /// Words shared by consecutive chunks (env: DOCRAG_CHUNK_OVERLAP)
    #[arg(long, global = true)]
    pub overlap: Option<usize>,

    /// Deadline for one embedding call in milliseconds (env: DOCRAG_EMBED_TIMEOUT_MS)
    #[arg(long, global = true)]
    pub embed_timeout_ms: Option<u64>,

    /// OpenAI-compatible API base URL (env: OPENAI_BASE_URL)
    #[arg(long, global = true)]
    pub llm_base_url: Option<String>,

    /// Chat model used to answer questions (env: DOCRAG_LLM_MODEL)
    #[arg(long, global = true)]
    pub llm_model: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub embedder: EmbedderConfig,
    pub search_mode: SearchMode,
    pub chunking: ChunkingConfig,
    pub embed_timeout: Duration,
    /// `None` disables answer generation
    pub llm: Option<LlmConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            embedder: EmbedderConfig::default(),
            search_mode: SearchMode::Exact,
            chunking: ChunkingConfig::default(),
            embed_timeout: Duration::from_millis(DEFAULT_EMBED_TIMEOUT_MS),
            llm: None,
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        self.embedder
            .validate()
            .context("Invalid embedder configuration")?;
        self.chunking
            .validate()
            .context("Invalid chunking configuration")?;
        if self.embed_timeout.is_zero() {
            anyhow::bail!("embed timeout must be > 0");
        }
        Ok(())
    }
}

impl SettingsArgs {
    /// Resolve against the process environment
    pub fn resolve(&self) -> Result<ServiceConfig> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    pub fn resolve_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<ServiceConfig> {
        let defaults = ServiceConfig::default();

        let mode = match self.embed_mode {
            Some(arg) => arg.into(),
            None => parse_env(&env, "DOCRAG_EMBEDDING_MODE")?.unwrap_or(defaults.embedder.mode),
        };
        let model_dir = self
            .model_dir
            .clone()
            .or_else(|| env("DOCRAG_MODEL_DIR").map(PathBuf::from))
            .unwrap_or(defaults.embedder.model_dir);
        let dimension = match self.dim {
            Some(dim) => dim,
            None => parse_env(&env, "DOCRAG_EMBEDDING_DIM")?.unwrap_or(DEFAULT_DIMENSION),
        };
        let use_cuda = self.cuda || env("DOCRAG_USE_CUDA").is_some_and(|v| is_truthy(&v));

        let search_mode = match self.search_mode {
            Some(arg) => arg.into(),
            None => parse_env(&env, "DOCRAG_SEARCH_MODE")?.unwrap_or(defaults.search_mode),
        };

        let chunk_size = match self.chunk_size {
            Some(size) => size,
            None => parse_env(&env, "DOCRAG_CHUNK_SIZE")?.unwrap_or(defaults.chunking.chunk_size),
        };
        let overlap = match self.overlap {
            Some(overlap) => overlap,
            None => parse_env(&env, "DOCRAG_CHUNK_OVERLAP")?.unwrap_or(defaults.chunking.overlap),
        };

        let embed_timeout = match self.embed_timeout_ms {
            Some(ms) => Duration::from_millis(ms),
            None => parse_env(&env, "DOCRAG_EMBED_TIMEOUT_MS")?
                .map_or(defaults.embed_timeout, Duration::from_millis),
        };

        let llm = env("OPENAI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .map(|api_key| LlmConfig {
                base_url: self
                    .llm_base_url
                    .clone()
                    .or_else(|| env("OPENAI_BASE_URL"))
                    .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
                model: self
                    .llm_model
                    .clone()
                    .or_else(|| env("DOCRAG_LLM_MODEL"))
                    .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                api_key,
                temperature: 0.2,
                timeout: Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
            });

        let config = ServiceConfig {
            embedder: EmbedderConfig {
                mode,
                model_dir,
                dimension,
                use_cuda,
                ..defaults.embedder
            },
            search_mode,
            chunking: ChunkingConfig::new(chunk_size, overlap),
            embed_timeout,
            llm,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = env(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| anyhow::anyhow!("Invalid {key} '{raw}': {e}"))
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_flags_or_env() {
        let config = SettingsArgs::default().resolve_with(env_of(&[])).unwrap();
        assert_eq!(config.embedder.mode, EmbeddingMode::Model);
        assert_eq!(config.embedder.dimension, DEFAULT_DIMENSION);
        assert_eq!(config.search_mode, SearchMode::Exact);
        assert_eq!(config.chunking, ChunkingConfig::new(500, 50));
        assert_eq!(config.embed_timeout, Duration::from_secs(30));
        assert!(config.llm.is_none());
    }

    #[test]
    fn env_fills_unset_flags() {
        let env = env_of(&[
            ("DOCRAG_EMBEDDING_MODE", "hash"),
            ("DOCRAG_EMBEDDING_DIM", "16"),
            ("DOCRAG_SEARCH_MODE", "brute-force"),
            ("DOCRAG_CHUNK_SIZE", "40"),
            ("DOCRAG_CHUNK_OVERLAP", "4"),
            ("OPENAI_API_KEY", "sk-test"),
        ]);
        let config = SettingsArgs::default().resolve_with(env).unwrap();
        assert_eq!(config.embedder.mode, EmbeddingMode::Hash);
        assert_eq!(config.embedder.dimension, 16);
        assert_eq!(config.search_mode, SearchMode::BruteForce);
        assert_eq!(config.chunking, ChunkingConfig::new(40, 4));

        let llm = config.llm.unwrap();
        assert_eq!(llm.api_key, "sk-test");
        assert_eq!(llm.model, DEFAULT_LLM_MODEL);
        assert_eq!(llm.base_url, DEFAULT_LLM_BASE_URL);
    }

    #[test]
    fn flags_override_env() {
        let args = SettingsArgs {
            embed_mode: Some(EmbedModeArg::Hash),
            search_mode: Some(SearchModeArg::Exact),
            chunk_size: Some(8),
            overlap: Some(2),
            ..SettingsArgs::default()
        };
        let env = env_of(&[
            ("DOCRAG_EMBEDDING_MODE", "model"),
            ("DOCRAG_SEARCH_MODE", "brute-force"),
            ("DOCRAG_CHUNK_SIZE", "100"),
        ]);
        let config = args.resolve_with(env).unwrap();
        assert_eq!(config.embedder.mode, EmbeddingMode::Hash);
        assert_eq!(config.search_mode, SearchMode::Exact);
        assert_eq!(config.chunking, ChunkingConfig::new(8, 2));
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let args = SettingsArgs {
            chunk_size: Some(10),
            overlap: Some(10),
            ..SettingsArgs::default()
        };
        let err = args.resolve_with(env_of(&[])).unwrap_err();
        assert!(
            format!("{err:#}").contains("overlap (10) must be smaller than chunk_size (10)"),
            "unexpected error: {err:#}"
        );
    }

    #[test]
    fn rejects_malformed_env_values() {
        let err = SettingsArgs::default()
            .resolve_with(env_of(&[("DOCRAG_CHUNK_SIZE", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid DOCRAG_CHUNK_SIZE 'lots'"));

        assert!(SettingsArgs::default()
            .resolve_with(env_of(&[("DOCRAG_SEARCH_MODE", "hnsw")]))
            .is_err());
    }

    #[test]
    fn blank_api_key_disables_generation() {
        let config = SettingsArgs::default()
            .resolve_with(env_of(&[("OPENAI_API_KEY", "  ")]))
            .unwrap();
        assert!(config.llm.is_none());
    }
}
