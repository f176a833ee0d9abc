// src/memory/chunker.rs
// Recursive character splitter: overlapping fixed-size windows that prefer
// paragraph, then line, then word boundaries.

use crate::pdf::Document;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub chunk_index: usize,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub page: usize,
    /// Character (not byte) offset of the chunk inside its page.
    pub start_char: usize,
}

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Window length in characters.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Tried in order; the empty separator splits into single characters.
    pub separators: Vec<String>,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

impl ChunkerConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: ["\n\n", "\n", " ", ""].iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub struct RecursiveChunker {
    config: ChunkerConfig,
}

impl RecursiveChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        if config.chunk_overlap >= config.chunk_size {
            warn!(
                chunk_size = config.chunk_size,
                chunk_overlap = config.chunk_overlap,
                "Chunk overlap is not smaller than chunk size"
            );
        }
        Self { config }
    }

    pub fn with_default() -> Self {
        Self::new(ChunkerConfig::default())
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunks every page, numbering chunks per source file.
    pub fn split_documents(&self, docs: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut per_source: std::collections::HashMap<&str, usize> = Default::default();

        for doc in docs {
            let mut search_from = 0usize;
            for text in self.split_text(&doc.content) {
                let start_byte = doc.content[search_from..]
                    .find(&text)
                    .map(|pos| search_from + pos)
                    .unwrap_or(search_from);
                let start_char = doc.content[..start_byte].chars().count();
                search_from = start_byte
                    + doc.content[start_byte..]
                        .chars()
                        .next()
                        .map(char::len_utf8)
                        .unwrap_or(0);

                let index = per_source.entry(doc.source.as_str()).or_insert(0);
                chunks.push(Chunk {
                    id: format!("{}#{}", doc.source, index),
                    content: text,
                    chunk_index: *index,
                    metadata: ChunkMetadata {
                        source: doc.source.clone(),
                        page: doc.page,
                        start_char,
                    },
                });
                *index += 1;
            }
        }

        debug!(pages = docs.len(), chunks = chunks.len(), "Split documents");
        chunks
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.config.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // First separator present in the text; "" always matches
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut finer: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut good: Vec<String> = Vec::new();
        for piece in split_keep_separator(text, separator) {
            if char_len(&piece) < self.config.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                final_chunks.extend(self.merge_pieces(&good));
                good.clear();
            }
            if finer.is_empty() {
                final_chunks.push(piece);
            } else {
                final_chunks.extend(self.split_recursive(&piece, finer));
            }
        }
        if !good.is_empty() {
            final_chunks.extend(self.merge_pieces(&good));
        }

        final_chunks
    }

    /// Greedily packs pieces into windows, carrying trailing pieces over while
    /// they fit in the overlap budget. Separators are already attached to the
    /// pieces, so joining is plain concatenation.
    fn merge_pieces(&self, pieces: &[String]) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut docs = Vec::new();
        let mut current: std::collections::VecDeque<&str> = Default::default();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > size {
                if total > size {
                    warn!(length = total, chunk_size = size, "Created a chunk longer than chunk size");
                }
                if !current.is_empty() {
                    if let Some(doc) = join_pieces(&current) {
                        docs.push(doc);
                    }
                    while total > overlap || (total + len > size && total > 0) {
                        match current.pop_front() {
                            Some(front) => total -= char_len(front),
                            None => break,
                        }
                    }
                }
            }
            current.push_back(piece);
            total += len;
        }

        if let Some(doc) = join_pieces(&current) {
            docs.push(doc);
        }
        docs
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join_pieces(pieces: &std::collections::VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Splits `text` on `separator`, attaching each separator to the start of the
/// piece that follows it. Empty pieces are dropped.
fn split_keep_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(|c| c.to_string()).collect();
    }

    let mut pieces = Vec::new();
    let mut last = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > last {
            pieces.push(text[last..idx].to_string());
        }
        last = idx;
    }
    if last < text.len() {
        pieces.push(text[last..].to_string());
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize) -> RecursiveChunker {
        RecursiveChunker::new(ChunkerConfig::new(size, overlap))
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = chunker(1000, 200).split_text("  누리호는 한국형 발사체입니다.  ");
        assert_eq!(chunks, vec!["누리호는 한국형 발사체입니다."]);
    }

    #[test]
    fn test_word_windows_overlap() {
        let chunks = chunker(10, 4).split_text("a b c d e f g h i j k l");
        assert_eq!(chunks, vec!["a b c d e", "d e f g h", "g h i j k", "j k l"]);
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let chunks = chunker(5, 0).split_text("가나다라마바사아자차카타파하");
        assert_eq!(chunks, vec!["가나다라마", "바사아자차", "카타파하"]);
    }

    #[test]
    fn test_paragraph_boundary_preferred() {
        let chunks = chunker(12, 2).split_text("첫 문단입니다.\n\n둘째 문단입니다.");
        assert_eq!(chunks, vec!["첫 문단입니다.", "둘째 문단입니다."]);
    }

    #[test]
    fn test_windows_never_exceed_chunk_size() {
        let text = "누리호 발사 준비 완료 ".repeat(300);
        let chunks = chunker(100, 20).split_text(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[test]
    fn test_split_documents_metadata() {
        let docs = vec![
            Document {
                source: "data/nuri.pdf".into(),
                page: 0,
                content: "a b c d e f g h i j k l".into(),
            },
            Document {
                source: "data/nuri.pdf".into(),
                page: 1,
                content: "".into(),
            },
        ];
        let chunks = chunker(10, 4).split_documents(&docs);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].id, "data/nuri.pdf#0");
        assert_eq!(chunks[3].chunk_index, 3);
        assert_eq!(chunks[1].metadata.start_char, 6);
        assert_eq!(chunks[3].metadata.start_char, 18);
    }
}
