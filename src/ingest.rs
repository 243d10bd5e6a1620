//! Ingestion pipeline: load documents from a source, chunk, embed, upsert.
//!
//! Chunk ids are derived from source scope and content, so re-running the
//! pipeline over unchanged inputs rewrites the same rows and the collection
//! stays duplicate-free. Embedding failures degrade a batch to sparse-only
//! chunks with a warning; store failures abort the run.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::chunker;
use crate::config::{ChunkSpec, Config};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::identity::chunk_id;
use crate::models::{Chunk, Document};
use crate::store::Store;

/// A connector that yields documents for ingestion. Implementations own
/// their transport (git checkout, HTTP fetch, directory walk) and report
/// per-document failures by skipping, not by failing the whole load.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    fn name(&self) -> &str;
    fn chunk_spec(&self) -> ChunkSpec;
    async fn load_documents(&self) -> Result<Vec<Document>>;
}

/// Run the full pipeline for one source. Returns the number of chunks
/// written. A source that fails to load anything logs the error and writes
/// nothing rather than poisoning the store.
pub async fn run_ingestion(config: &Config, source: &dyn DocumentSource) -> Result<u64> {
    let provider = create_provider(&config.embedding)?;
    let store = Store::open(&config.store.path, &config.store.collection, provider.clone()).await?;

    let documents = match source.load_documents().await {
        Ok(docs) => docs,
        Err(e) => {
            warn!(source = source.name(), error = %e, "Source failed to load, nothing ingested");
            store.close().await;
            return Ok(0);
        }
    };

    info!(
        source = source.name(),
        documents = documents.len(),
        "Loaded documents"
    );

    let spec = source.chunk_spec();
    let mut chunks = Vec::new();
    let mut seen_ids = HashSet::new();

    for doc in &documents {
        let scope = doc.metadata.scope_key();
        let fields = doc.metadata.to_fields();

        for piece in chunker::split_document(doc, &spec) {
            if piece.trim().len() < spec.min_chars {
                continue;
            }
            let id = chunk_id(&scope, &piece);
            // Identical content within one run collapses to one row anyway;
            // skip it here so embedding work is not duplicated.
            if !seen_ids.insert(id.clone()) {
                continue;
            }
            chunks.push(Chunk {
                id,
                content: piece,
                fields: fields.clone(),
            });
        }
    }

    info!(
        source = source.name(),
        chunks = chunks.len(),
        "Chunked documents"
    );

    let mut total_written = 0u64;
    for batch in chunks.chunks(config.chunking.batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let embeddings =
            embed_in_batches(provider.as_ref(), &texts, config.embedding.batch_size).await;

        total_written += store.upsert(batch, &embeddings).await?;
        info!(
            source = source.name(),
            written = total_written,
            total = chunks.len(),
            "Upserted batch"
        );
    }

    store.close().await;
    info!(
        source = source.name(),
        chunks = total_written,
        "Ingestion complete"
    );
    Ok(total_written)
}

/// Embed texts in provider-sized batches (`embedding.batch_size`), which is
/// usually smaller than a store batch. A failed call degrades its batch to
/// vectorless chunks with a warning; later batches still run.
async fn embed_in_batches(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> Vec<Option<Vec<f32>>> {
    let mut out = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size.max(1)) {
        match provider.embed(batch).await {
            Ok(vectors) if vectors.len() == batch.len() => {
                out.extend(vectors.into_iter().map(Some));
            }
            Ok(vectors) => {
                warn!(
                    expected = batch.len(),
                    got = vectors.len(),
                    "Embedding count mismatch, storing batch without vectors"
                );
                out.extend(std::iter::repeat_with(|| None).take(batch.len()));
            }
            Err(e) => {
                warn!(error = %e, batch = batch.len(), "Embedding failed, storing batch without vectors");
                out.extend(std::iter::repeat_with(|| None).take(batch.len()));
            }
        }
    }

    out
}

/// Build the configured source named on the command line.
pub fn source_from_name(config: &Config, name: &str) -> Result<Arc<dyn DocumentSource>> {
    match name {
        "github" => {
            let src_config = config
                .sources
                .github
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("No [sources.github] section in config"))?;
            Ok(Arc::new(crate::source_github::GithubSource::new(
                src_config,
                src_config.chunk_spec(&config.chunking),
            )))
        }
        "web" => {
            let src_config = config
                .sources
                .web
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("No [sources.web] section in config"))?;
            Ok(Arc::new(crate::source_web::WebSource::new(
                src_config,
                config.chunking.resolve(&src_config.chunking),
            )?))
        }
        "local" => {
            let src_config = config
                .sources
                .local
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("No [sources.local] section in config"))?;
            Ok(Arc::new(crate::source_local::LocalSource::new(
                src_config,
                config.chunking.resolve(&src_config.chunking),
            )))
        }
        other => anyhow::bail!("Unknown source '{}'. Must be github, web, or local.", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use crate::models::DocMetadata;
    use tempfile::TempDir;

    struct FixedSource {
        docs: Vec<Document>,
        spec: ChunkSpec,
    }

    #[async_trait]
    impl DocumentSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }
        fn chunk_spec(&self) -> ChunkSpec {
            self.spec
        }
        async fn load_documents(&self) -> Result<Vec<Document>> {
            Ok(self.docs.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl DocumentSource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }
        fn chunk_spec(&self) -> ChunkSpec {
            ChunkSpec {
                chunk_size: 1000,
                chunk_overlap: 100,
                min_chars: 10,
            }
        }
        async fn load_documents(&self) -> Result<Vec<Document>> {
            anyhow::bail!("network down")
        }
    }

    fn test_config(dir: &TempDir) -> Config {
        let path = dir.path().join("rag.toml");
        std::fs::write(
            &path,
            format!(
                r#"
                [store]
                path = "{}"
                collection = "test"

                [chunking]
                chunk_size = 200
                chunk_overlap = 20
                min_chars = 10
                "#,
                dir.path().join("test.db").display()
            ),
        )
        .unwrap();
        load_config(&path).unwrap()
    }

    fn page(url: &str, content: &str) -> Document {
        Document {
            content: content.to_string(),
            metadata: DocMetadata::Page {
                url: url.to_string(),
                title: "Test".to_string(),
                language: "text".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_ingestion_writes_chunks() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let source = FixedSource {
            docs: vec![page("http://a", &"alpha beta gamma delta. ".repeat(30))],
            spec: ChunkSpec {
                chunk_size: 200,
                chunk_overlap: 20,
                min_chars: 10,
            },
        };

        let written = run_ingestion(&config, &source).await.unwrap();
        assert!(written >= 2, "long document should produce several chunks");
    }

    #[tokio::test]
    async fn test_reingestion_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let source = FixedSource {
            docs: vec![page("http://a", &"the quick brown fox jumps over. ".repeat(20))],
            spec: ChunkSpec {
                chunk_size: 200,
                chunk_overlap: 20,
                min_chars: 10,
            },
        };

        let first = run_ingestion(&config, &source).await.unwrap();
        let second = run_ingestion(&config, &source).await.unwrap();
        assert_eq!(first, second);

        let provider = create_provider(&config.embedding).unwrap();
        let store = Store::open(&config.store.path, "test", provider).await.unwrap();
        assert_eq!(store.count().await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_short_chunks_dropped() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let source = FixedSource {
            docs: vec![page("http://a", "tiny")],
            spec: ChunkSpec {
                chunk_size: 200,
                chunk_overlap: 20,
                min_chars: 10,
            },
        };

        let written = run_ingestion(&config, &source).await.unwrap();
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn test_failing_source_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let written = run_ingestion(&config, &FailingSource).await.unwrap();
        assert_eq!(written, 0);
    }

    struct CountingProvider {
        calls: std::sync::Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.lock().unwrap().push(texts.len());
            if texts.iter().any(|t| t.contains("poison")) {
                anyhow::bail!("provider rejected batch");
            }
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }
    }

    #[tokio::test]
    async fn test_embed_calls_capped_at_batch_size() {
        let provider = CountingProvider {
            calls: std::sync::Mutex::new(Vec::new()),
        };
        let texts: Vec<String> = (0..10).map(|i| format!("text {}", i)).collect();

        let embeddings = embed_in_batches(&provider, &texts, 4).await;
        assert_eq!(embeddings.len(), 10);
        assert!(embeddings.iter().all(Option::is_some));
        assert_eq!(*provider.calls.lock().unwrap(), vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn test_failed_embed_batch_degrades_alone() {
        let provider = CountingProvider {
            calls: std::sync::Mutex::new(Vec::new()),
        };
        let texts = vec![
            "fine one".to_string(),
            "fine two".to_string(),
            "poison pill".to_string(),
            "fine three".to_string(),
        ];

        let embeddings = embed_in_batches(&provider, &texts, 2).await;
        assert_eq!(embeddings.len(), 4);
        assert!(embeddings[0].is_some());
        assert!(embeddings[1].is_some());
        // Only the failing batch loses its vectors.
        assert!(embeddings[2].is_none());
        assert!(embeddings[3].is_none());
    }

    #[test]
    fn test_source_from_name_requires_config_section() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        assert!(source_from_name(&config, "github").is_err());
        assert!(source_from_name(&config, "bogus").is_err());
    }
}
