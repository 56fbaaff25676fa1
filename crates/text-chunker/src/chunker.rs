use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::types::TextChunk;

/// Split `text` into overlapping word windows.
///
/// Windows hold `chunk_size` words and start `chunk_size - overlap` words apart. The
/// last window ends at the last word and may be shorter than `chunk_size`.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    let config = ChunkingConfig::new(chunk_size, overlap);
    config.validate()?;
    let words: Vec<&str> = text.split_whitespace().collect();
    Ok(windows(&words, config)
        .map(|window| window.join(" "))
        .collect())
}

/// Iterator over the word windows of an already validated config
fn windows<'a>(
    words: &'a [&'a str],
    config: ChunkingConfig,
) -> impl Iterator<Item = &'a [&'a str]> + 'a {
    let step = config.step().max(1);
    let mut start = 0usize;
    let mut done = words.is_empty();
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        let end = (start + config.chunk_size).min(words.len());
        let window = &words[start..end];
        if end == words.len() {
            done = true;
        } else {
            start += step;
        }
        Some(window)
    })
}

/// Main chunker interface for splitting documents
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Create a new chunker, rejecting configurations that cannot advance
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Chunk a single text, numbering chunks from zero
    #[must_use]
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        self.chunk_from(text, 0)
    }

    /// Chunk a single text, numbering chunks from `first_index`
    #[must_use]
    pub fn chunk_from(&self, text: &str, first_index: usize) -> Vec<TextChunk> {
        let words: Vec<&str> = text.split_whitespace().collect();
        windows(&words, self.config)
            .enumerate()
            .map(|(offset, window)| TextChunk::new(first_index + offset, window.join(" ")))
            .collect()
    }

    /// Chunk several texts of one document; indices run across all of them in order
    pub fn chunk_all<'a, I>(&self, texts: I) -> Vec<TextChunk>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut chunks = Vec::new();
        for text in texts {
            let next = self.chunk_from(text, chunks.len());
            chunks.extend(next);
        }
        log::debug!(
            "Chunked document into {} chunks (size {}, overlap {})",
            chunks.len(),
            self.config.chunk_size,
            self.config.overlap
        );
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChunkerError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sliding_windows() {
        let chunks = chunk_text("a b c d e", 2, 1).unwrap();
        assert_eq!(chunks, vec!["a b", "b c", "c d", "d e"]);
    }

    #[test]
    fn test_disjoint_windows_keep_short_tail() {
        let chunks = chunk_text("one two three four five", 2, 0).unwrap();
        assert_eq!(chunks, vec!["one two", "three four", "five"]);
    }

    #[test]
    fn test_empty_and_blank_text() {
        assert!(chunk_text("", 3, 1).unwrap().is_empty());
        assert!(chunk_text(" \n\t  ", 3, 1).unwrap().is_empty());
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = chunk_text("  hello\n\nworld  ", 10, 2).unwrap();
        assert_eq!(chunks, vec!["hello world"]);
    }

    #[test]
    fn test_text_no_longer_than_overlap() {
        let chunks = chunk_text("x y", 5, 3).unwrap();
        assert_eq!(chunks, vec!["x y"]);
    }

    #[test]
    fn test_rejects_non_advancing_overlap() {
        assert!(matches!(
            chunk_text("a b c", 2, 2),
            Err(ChunkerError::InvalidConfig(_))
        ));
        assert!(Chunker::new(ChunkingConfig::new(0, 0)).is_err());
    }

    #[test]
    fn test_chunk_all_numbers_across_texts() {
        let chunker = Chunker::new(ChunkingConfig::new(2, 0)).unwrap();
        let chunks = chunker.chunk_all(["a b c", "", "d e"]);
        assert_eq!(
            chunks,
            vec![
                TextChunk::new(0, "a b".to_string()),
                TextChunk::new(1, "c".to_string()),
                TextChunk::new(2, "d e".to_string()),
            ]
        );
    }
}
