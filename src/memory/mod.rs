// src/memory/mod.rs

pub mod chunker;
pub mod llm_provider;
pub mod persistence;
pub mod query;
pub mod vector_store;

pub use chunker::{Chunk, ChunkMetadata, ChunkerConfig, RecursiveChunker};
pub use llm_provider::{AzureChatProvider, ChatModel, LLMError, TokenStream};
pub use persistence::{load_matching_store, save_vector_store, SnapshotKey};
pub use query::{RagChat, RagError};
pub use vector_store::{SearchResult, StoreStats, VectorRecord, VectorStore, VectorStoreError};
