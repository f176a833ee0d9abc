/// VectorStore - read-mostly in-memory vector collection
///
/// Built once from the chunked corpus, searched by cosine similarity.
/// Snapshots are written to and read from disk by `memory::persistence`.

use crate::embedder::{cosine_similarity, EmbeddingVector};
use crate::memory::chunker::Chunk;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub chunk_id: String,
    pub content: String,
    pub source: String,
    pub page: usize,
    pub chunk_index: usize,
    pub embedding: EmbeddingVector,
}

impl VectorRecord {
    pub fn from_chunk(chunk: Chunk, embedding: EmbeddingVector) -> Self {
        Self {
            chunk_id: chunk.id,
            content: chunk.content,
            source: chunk.metadata.source,
            page: chunk.metadata.page,
            chunk_index: chunk.chunk_index,
            embedding,
        }
    }
}

/// Search result with similarity score
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub content: String,
    pub source: String,
    pub page: usize,
    pub similarity_score: f32,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorStoreError {
    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
    #[error("Empty embedding for {0}")]
    EmptyEmbedding(String),
}

#[derive(Debug, Default)]
pub struct VectorStore {
    records: Vec<VectorRecord>,
    index_map: HashMap<String, usize>,
    dimension: Option<usize>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<VectorRecord>) -> Result<Self, VectorStoreError> {
        let mut store = Self::new();
        store.add_records(records)?;
        Ok(store)
    }

    /// Inserts or replaces a record by chunk id.
    pub fn add_record(&mut self, record: VectorRecord) -> Result<(), VectorStoreError> {
        if record.embedding.is_empty() {
            return Err(VectorStoreError::EmptyEmbedding(record.chunk_id));
        }
        match self.dimension {
            Some(expected) if expected != record.embedding.len() => {
                return Err(VectorStoreError::InvalidDimension {
                    expected,
                    actual: record.embedding.len(),
                });
            }
            None => self.dimension = Some(record.embedding.len()),
            _ => {}
        }

        if let Some(idx) = self.index_map.get(&record.chunk_id) {
            debug!(chunk_id = %record.chunk_id, "Updating existing record");
            self.records[*idx] = record;
            return Ok(());
        }
        self.index_map.insert(record.chunk_id.clone(), self.records.len());
        self.records.push(record);
        Ok(())
    }

    pub fn add_records(&mut self, records: Vec<VectorRecord>) -> Result<(), VectorStoreError> {
        info!(count = records.len(), "Adding batch of records");
        for record in records {
            self.add_record(record)?;
        }
        Ok(())
    }

    /// The `top_k` most similar records. Ties keep insertion order.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<SearchResult> {
        let mut scored: Vec<(usize, f32)> = self
            .records
            .iter()
            .enumerate()
            .map(|(idx, record)| (idx, cosine_similarity(query, &record.embedding)))
            .collect();

        // stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        debug!(top_k, results = scored.len(), "Vector search complete");
        scored
            .into_iter()
            .map(|(idx, score)| {
                let record = &self.records[idx];
                SearchResult {
                    chunk_id: record.chunk_id.clone(),
                    content: record.content.clone(),
                    source: record.source.clone(),
                    page: record.page,
                    similarity_score: score,
                }
            })
            .collect()
    }

    pub fn get(&self, chunk_id: &str) -> Option<&VectorRecord> {
        self.index_map.get(chunk_id).map(|idx| &self.records[*idx])
    }

    pub fn records(&self) -> &[VectorRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn stats(&self) -> StoreStats {
        let sources: std::collections::HashSet<&str> =
            self.records.iter().map(|r| r.source.as_str()).collect();
        StoreStats {
            total_records: self.records.len(),
            total_sources: sources.len(),
            dimension: self.dimension,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_records: usize,
    pub total_sources: usize,
    pub dimension: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(chunk_id: &str, source: &str, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            chunk_id: chunk_id.to_string(),
            content: format!("content of {}", chunk_id),
            source: source.to_string(),
            page: 0,
            chunk_index: 0,
            embedding,
        }
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let store = VectorStore::from_records(vec![
            record("c1", "a.pdf", vec![1.0, 0.0, 0.0]),
            record("c2", "a.pdf", vec![0.9, 0.1, 0.0]),
            record("c3", "b.pdf", vec![0.0, 1.0, 0.0]),
        ])
        .unwrap();

        let results = store.search(&[1.0, 0.0, 0.0], 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, "c1");
        assert_eq!(results[1].chunk_id, "c2");
        assert!(results[0].similarity_score > results[1].similarity_score);
        assert_eq!(store.stats().total_sources, 2);
    }

    #[test]
    fn test_search_returns_at_most_available() {
        let store = VectorStore::from_records(vec![record("c1", "a.pdf", vec![1.0, 0.0])]).unwrap();
        assert_eq!(store.search(&[0.0, 1.0], 6).len(), 1);
        assert!(VectorStore::new().search(&[1.0], 6).is_empty());
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let store = VectorStore::from_records(vec![
            record("first", "a.pdf", vec![1.0, 0.0]),
            record("second", "a.pdf", vec![1.0, 0.0]),
        ])
        .unwrap();
        let ids: Vec<_> = store.search(&[1.0, 0.0], 2).into_iter().map(|r| r.chunk_id).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut store = VectorStore::new();
        store.add_record(record("c1", "a.pdf", vec![1.0, 0.0])).unwrap();
        assert_eq!(
            store.add_record(record("c2", "a.pdf", vec![1.0, 0.0, 0.0])),
            Err(VectorStoreError::InvalidDimension { expected: 2, actual: 3 })
        );
        assert!(matches!(
            store.add_record(record("c3", "a.pdf", vec![])),
            Err(VectorStoreError::EmptyEmbedding(_))
        ));
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let mut store = VectorStore::new();
        store.add_record(record("c1", "a.pdf", vec![1.0, 0.0])).unwrap();
        let mut updated = record("c1", "a.pdf", vec![0.0, 1.0]);
        updated.content = "updated".into();
        store.add_record(updated).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("c1").unwrap().content, "updated");
    }
}
