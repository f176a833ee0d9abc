// tests/index_build.rs
// Full index build from a real PDF: extract, chunk, embed, store, persist.

use nuri::config::RagSettings;
use nuri::embedder::{Embedder, EmbeddingError, EmbeddingVector, HashEmbedder};
use nuri::memory::persistence::{read_snapshot, snapshot_path};
use nuri::IndexCache;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

/// Hash embeddings, counting document batches and optionally slowed down.
#[derive(Default)]
struct CountingEmbedder {
    inner: HashEmbedder,
    batches: AtomicUsize,
    delay: Duration,
}

impl CountingEmbedder {
    fn slow(delay: Duration) -> Self {
        Self { delay, ..Self::default() }
    }

    fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Embedder for CountingEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.embed_documents(texts).await
    }
    async fn embed_query(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        self.inner.embed_query(text).await
    }
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/two_pages.pdf")
}

fn corpus(root: &Path) -> RagSettings {
    let settings = RagSettings {
        data_dir: root.join("data"),
        vectorstore_dir: root.join("vectorstore"),
        ..RagSettings::default()
    };
    std::fs::create_dir_all(&settings.data_dir).unwrap();
    std::fs::copy(fixture(), settings.data_dir.join("two_pages.pdf")).unwrap();
    settings
}

#[tokio::test]
async fn test_build_from_pdf_persists_and_reloads() {
    let dir = tempdir().unwrap();
    let settings = corpus(dir.path());

    let embedder = Arc::new(CountingEmbedder::default());
    let cache = IndexCache::new(settings.clone(), embedder.clone());
    let retriever = cache.get_or_build().await.unwrap();
    assert_eq!(retriever.len(), 2);
    assert_eq!(embedder.batches(), 1);
    assert!(snapshot_path(&settings.vectorstore_dir).exists());

    let snapshot = read_snapshot(&settings.vectorstore_dir).unwrap();
    let mut pages: Vec<(usize, String)> = snapshot
        .records
        .iter()
        .map(|r| (r.page, r.content.clone()))
        .collect();
    pages.sort();
    assert_eq!(
        pages,
        vec![(0, "First page text".to_string()), (1, "Second page text".to_string())]
    );
    assert!(snapshot.records.iter().all(|r| r.source.ends_with("two_pages.pdf")));

    // a fresh process reuses the snapshot without embedding
    let restarted = Arc::new(CountingEmbedder::default());
    let cache = IndexCache::new(settings, restarted.clone());
    assert_eq!(cache.get_or_build().await.unwrap().len(), 2);
    assert_eq!(restarted.batches(), 0);
}

#[tokio::test]
async fn test_changed_chunk_settings_rebuild_the_snapshot() {
    let dir = tempdir().unwrap();
    let settings = corpus(dir.path());
    IndexCache::new(settings.clone(), Arc::new(HashEmbedder::default()))
        .get_or_build()
        .await
        .unwrap();

    let small = RagSettings {
        chunk_size: 8,
        chunk_overlap: 2,
        ..settings
    };
    let embedder = Arc::new(CountingEmbedder::default());
    let cache = IndexCache::new(small.clone(), embedder.clone());
    let retriever = cache.get_or_build().await.unwrap();

    assert_eq!(embedder.batches(), 1);
    assert!(retriever.len() > 2);
    let snapshot = read_snapshot(&small.vectorstore_dir).unwrap();
    assert_eq!((snapshot.key.chunk_size, snapshot.key.chunk_overlap), (8, 2));
}

#[tokio::test]
async fn test_abandoned_caller_does_not_abort_build() {
    let dir = tempdir().unwrap();
    let settings = corpus(dir.path());
    let embedder = Arc::new(CountingEmbedder::slow(Duration::from_millis(200)));
    let cache = IndexCache::new(settings.clone(), embedder.clone());

    let abandoned = tokio::time::timeout(Duration::from_millis(20), cache.get_or_build()).await;
    assert!(abandoned.is_err());

    let snapshot = snapshot_path(&settings.vectorstore_dir);
    for _ in 0..100 {
        if snapshot.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(snapshot.exists());

    assert_eq!(cache.get_or_build().await.unwrap().len(), 2);
    assert_eq!(embedder.batches(), 1);
    assert!(cache.is_ready());
}
