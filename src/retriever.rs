// src/retriever.rs
// Retrieval index over the PDF corpus and its process-lifetime cache.

use crate::config::RagSettings;
use crate::embedder::{Embedder, EmbeddingError};
use crate::memory::chunker::{ChunkerConfig, RecursiveChunker};
use crate::memory::persistence::{self, PersistenceError, SnapshotKey};
use crate::memory::vector_store::{SearchResult, VectorRecord, VectorStore, VectorStoreError};
use crate::monitoring::metrics;
use crate::pdf::{self, PdfError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("No PDF documents found in {0}")]
    NoDocuments(String),
    #[error("Failed to read documents: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Store(#[from] VectorStoreError),
    #[error("Index build task failed: {0}")]
    Task(String),
}

impl From<PdfError> for IndexError {
    fn from(err: PdfError) -> Self {
        match err {
            PdfError::NoDocuments(dir) => IndexError::NoDocuments(dir),
            PdfError::Io(e) => IndexError::Io(e),
        }
    }
}

pub struct Retriever {
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl Retriever {
    pub fn from_store(store: VectorStore, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self { store, embedder, top_k }
    }

    /// Loads a matching on-disk snapshot, or extracts, chunks and embeds the
    /// corpus and writes a fresh snapshot.
    pub async fn build(settings: &RagSettings, embedder: Arc<dyn Embedder>) -> Result<Self, IndexError> {
        let files = pdf::list_pdf_files(&settings.data_dir);
        if files.is_empty() {
            return Err(IndexError::NoDocuments(settings.data_dir.display().to_string()));
        }
        let key = snapshot_key(settings, &files, embedder.model_name());

        match persistence::load_matching_store(&settings.vectorstore_dir, &key) {
            Ok(Some(store)) if !store.is_empty() => {
                info!(records = store.len(), "Reusing persisted vector store");
                return Ok(Self::from_store(store, embedder, settings.top_k));
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Ignoring unreadable vector store snapshot"),
        }

        let data_dir = settings.data_dir.clone();
        let docs = tokio::task::spawn_blocking(move || pdf::load_pdf_directory(&data_dir))
            .await
            .map_err(|e| IndexError::Task(e.to_string()))??;

        let chunker = RecursiveChunker::new(ChunkerConfig::new(settings.chunk_size, settings.chunk_overlap));
        let chunks = chunker.split_documents(&docs);
        if chunks.is_empty() {
            return Err(IndexError::NoDocuments(settings.data_dir.display().to_string()));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = embedder.embed_documents(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: chunks.len(),
                actual: embeddings.len(),
            }
            .into());
        }

        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorRecord::from_chunk(chunk, embedding))
            .collect();
        let store = VectorStore::from_records(records)?;

        if let Err(e) = persist(&store, settings, &key) {
            warn!(error = %e, "Failed to persist vector store; continuing in memory");
        }
        info!(pages = docs.len(), records = store.len(), "Vector store built");
        Ok(Self::from_store(store, embedder, settings.top_k))
    }

    /// The `top_k` passages most similar to `question`.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<SearchResult>, IndexError> {
        let started = Instant::now();
        let query = self.embedder.embed_query(question).await?;
        let results = self.store.search(&query, self.top_k);
        metrics::observe_retrieval_latency_ms(started.elapsed().as_secs_f64() * 1000.0);
        Ok(results)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }
}

/// Reuse key for the snapshot of `files` built under `settings`.
pub fn snapshot_key(settings: &RagSettings, files: &[PathBuf], embedding_model: &str) -> SnapshotKey {
    SnapshotKey {
        fingerprint: pdf::corpus_fingerprint(files),
        embedding_model: embedding_model.to_string(),
        chunk_size: settings.chunk_size,
        chunk_overlap: settings.chunk_overlap,
    }
}

fn persist(store: &VectorStore, settings: &RagSettings, key: &SnapshotKey) -> Result<(), PersistenceError> {
    persistence::save_vector_store(store, &settings.vectorstore_dir, key).map(|_| ())
}

/// Builds the retriever at most once per process. Concurrent first callers
/// wait for the same build; a failed build is not cached. The build runs on
/// its own task, so a caller that goes away does not abort it.
pub struct IndexCache {
    cell: OnceCell<Arc<Retriever>>,
    builds: AtomicUsize,
    settings: RagSettings,
    embedder: Arc<dyn Embedder>,
}

impl IndexCache {
    pub fn new(settings: RagSettings, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            cell: OnceCell::new(),
            builds: AtomicUsize::new(0),
            settings,
            embedder,
        }
    }

    /// Cache that is already populated; `build_count` stays at zero.
    pub fn with_retriever(settings: RagSettings, embedder: Arc<dyn Embedder>, retriever: Retriever) -> Self {
        Self {
            cell: OnceCell::new_with(Some(Arc::new(retriever))),
            builds: AtomicUsize::new(0),
            settings,
            embedder,
        }
    }

    pub async fn get_or_build(&self) -> Result<Arc<Retriever>, IndexError> {
        let retriever = self
            .cell
            .get_or_try_init(|| async {
                info!(data_dir = %self.settings.data_dir.display(), "Building retrieval index");
                let started = Instant::now();
                let settings = self.settings.clone();
                let embedder = Arc::clone(&self.embedder);
                let built = tokio::spawn(async move { Retriever::build(&settings, embedder).await })
                    .await
                    .map_err(|e| IndexError::Task(e.to_string()))
                    .and_then(|result| result);
                match built {
                    Ok(retriever) => {
                        self.builds.fetch_add(1, Ordering::SeqCst);
                        metrics::INDEX_BUILDS_TOTAL.inc();
                        metrics::INDEX_RECORDS.set(retriever.len() as i64);
                        info!(
                            records = retriever.len(),
                            duration_ms = started.elapsed().as_millis() as u64,
                            "Retrieval index ready"
                        );
                        Ok(Arc::new(retriever))
                    }
                    Err(e) => {
                        metrics::INDEX_BUILD_FAILURES_TOTAL.inc();
                        warn!(error = %e, "Retrieval index build failed");
                        Err(e)
                    }
                }
            })
            .await?;
        Ok(Arc::clone(retriever))
    }

    /// Successful builds so far; never more than one.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        self.cell.initialized()
    }
}
