use crate::error::{ChunkerError, Result};
use serde::{Deserialize, Serialize};

/// Word-window chunking parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window size in whitespace-separated words
    pub chunk_size: usize,

    /// Words shared between consecutive windows
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
        }
    }
}

impl ChunkingConfig {
    #[must_use]
    pub const fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Number of words the window start moves forward each step.
    ///
    /// Only meaningful after [`ChunkingConfig::validate`] succeeded.
    #[must_use]
    pub const fn step(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ChunkerError::invalid_config("chunk_size must be > 0"));
        }

        if self.overlap >= self.chunk_size {
            return Err(ChunkerError::invalid_config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = ChunkingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.step(), 450);
    }

    #[test]
    fn test_config_validation() {
        // Invalid: empty windows
        assert!(ChunkingConfig::new(0, 0).validate().is_err());

        // Invalid: the window would never advance
        assert!(ChunkingConfig::new(4, 4).validate().is_err());
        assert!(ChunkingConfig::new(4, 9).validate().is_err());

        // Valid configurations
        assert!(ChunkingConfig::new(4, 3).validate().is_ok());
        assert!(ChunkingConfig::new(1, 0).validate().is_ok());
    }

    #[test]
    fn test_error_message_names_both_values() {
        let err = ChunkingConfig::new(10, 12).validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: overlap (12) must be smaller than chunk_size (10)"
        );
    }
}
