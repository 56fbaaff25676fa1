use serde::{Deserialize, Serialize};

/// One window of words produced by the chunker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextChunk {
    /// Position among the chunks produced from the same source
    pub index: usize,

    /// Words of the window joined by single spaces
    pub text: String,
}

impl TextChunk {
    #[must_use]
    pub const fn new(index: usize, text: String) -> Self {
        Self { index, text }
    }
}
