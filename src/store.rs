//! SQLite-backed chunk store.
//!
//! One `chunks` table holds content, metadata, and the embedding vector for
//! every chunk, keyed by the content-derived chunk id. Upserts are
//! transactional and keyed on that id, so re-ingesting unchanged content
//! rewrites rows in place and the collection never accumulates duplicates.
//! Vector search embeds the query and ranks stored embeddings by cosine
//! similarity in process; collections at this scale fit comfortably in a
//! single scan.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::embedding::{blob_to_vec, cosine_similarity, embed_query, vec_to_blob, EmbeddingProvider};
use crate::models::Chunk;

/// A chunk as read back from the store.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: String,
    pub content: String,
    pub fields: BTreeMap<String, String>,
    pub embedding: Option<Vec<f32>>,
}

pub struct Store {
    pool: SqlitePool,
    collection: String,
    provider: Arc<dyn EmbeddingProvider>,
}

impl Store {
    pub async fn open(
        path: &Path,
        collection: &str,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata_json TEXT NOT NULL DEFAULT '{}',
                embedding BLOB
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_collection ON chunks(collection)")
            .execute(&pool)
            .await?;

        Ok(Self {
            pool,
            collection: collection.to_string(),
            provider,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Insert or replace chunks by id in a single transaction. `embeddings`
    /// runs parallel to `chunks`; a `None` entry stores the chunk without a
    /// vector (it still participates in sparse retrieval).
    pub async fn upsert(&self, chunks: &[Chunk], embeddings: &[Option<Vec<f32>>]) -> Result<u64> {
        anyhow::ensure!(
            chunks.len() == embeddings.len(),
            "chunk/embedding length mismatch: {} vs {}",
            chunks.len(),
            embeddings.len()
        );

        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            let metadata_json = serde_json::to_string(&chunk.fields)?;
            let blob = embedding.as_ref().map(|v| vec_to_blob(v));

            sqlx::query(
                r#"
                INSERT INTO chunks (id, collection, content, metadata_json, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    collection = excluded.collection,
                    content = excluded.content,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&chunk.id)
            .bind(&self.collection)
            .bind(&chunk.content)
            .bind(&metadata_json)
            .bind(blob)
            .execute(&mut *tx)
            .await?;

            written += 1;
        }

        tx.commit().await?;
        Ok(written)
    }

    /// All chunks in the collection, optionally restricted to those whose
    /// metadata contains every key/value pair in `filter`. Metadata matching
    /// happens here rather than in SQL so filters stay schema-free.
    pub async fn get_all(
        &self,
        filter: Option<&BTreeMap<String, String>>,
    ) -> Result<Vec<StoredChunk>> {
        let rows = sqlx::query(
            "SELECT id, content, metadata_json, embedding FROM chunks WHERE collection = ?1 ORDER BY id",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut chunks = Vec::with_capacity(rows.len());
        for row in rows {
            let metadata_json: String = row.get("metadata_json");
            let fields: BTreeMap<String, String> =
                serde_json::from_str(&metadata_json).unwrap_or_default();

            if let Some(filter) = filter {
                let matches = filter
                    .iter()
                    .all(|(k, v)| fields.get(k).map(|have| have == v).unwrap_or(false));
                if !matches {
                    continue;
                }
            }

            let blob: Option<Vec<u8>> = row.get("embedding");
            chunks.push(StoredChunk {
                id: row.get("id"),
                content: row.get("content"),
                fields,
                embedding: blob.as_deref().map(blob_to_vec),
            });
        }

        Ok(chunks)
    }

    /// Embed the query and return the `k` most cosine-similar stored chunks,
    /// best first. Chunks without embeddings are skipped.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&BTreeMap<String, String>>,
    ) -> Result<Vec<(StoredChunk, f32)>> {
        let query_vec = embed_query(self.provider.as_ref(), query).await?;
        let candidates = self.get_all(filter).await?;

        let mut scored: Vec<(StoredChunk, f32)> = candidates
            .into_iter()
            .filter_map(|chunk| {
                let score = chunk
                    .embedding
                    .as_ref()
                    .map(|v| cosine_similarity(&query_vec, v))?;
                Some((chunk, score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    pub async fn count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM chunks WHERE collection = ?1")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.get("n");
        Ok(n as u64)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embedding::create_provider;
    use tempfile::TempDir;

    fn hashed_provider() -> Arc<dyn EmbeddingProvider> {
        let config = EmbeddingConfig {
            provider: "hashed".to_string(),
            dims: Some(64),
            ..Default::default()
        };
        create_provider(&config).unwrap()
    }

    fn chunk(id: &str, content: &str, fields: &[(&str, &str)]) -> Chunk {
        Chunk {
            id: id.to_string(),
            content: content.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    async fn open_store(dir: &TempDir) -> Store {
        Store::open(&dir.path().join("test.db"), "docs", hashed_provider())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_upsert_and_count() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let chunks = vec![
            chunk("a", "first chunk", &[("url", "http://x")]),
            chunk("b", "second chunk", &[("url", "http://y")]),
        ];
        let written = store.upsert(&chunks, &[None, None]).await.unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upsert_same_ids_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let chunks = vec![chunk("a", "content", &[])];
        store.upsert(&chunks, &[None]).await.unwrap();
        store.upsert(&chunks, &[None]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces_content() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store
            .upsert(&[chunk("a", "old text", &[])], &[None])
            .await
            .unwrap();
        store
            .upsert(&[chunk("a", "new text", &[])], &[None])
            .await
            .unwrap();

        let all = store.get_all(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "new text");
    }

    #[tokio::test]
    async fn test_get_all_metadata_filter() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let chunks = vec![
            chunk("a", "from repo A", &[("repo", "org/a")]),
            chunk("b", "from repo B", &[("repo", "org/b")]),
            chunk("c", "also repo A", &[("repo", "org/a")]),
        ];
        store.upsert(&chunks, &[None, None, None]).await.unwrap();

        let filter: BTreeMap<String, String> =
            [("repo".to_string(), "org/a".to_string())].into_iter().collect();
        let matched = store.get_all(Some(&filter)).await.unwrap();
        assert_eq!(matched.len(), 2);
        assert!(matched.iter().all(|c| c.fields["repo"] == "org/a"));
    }

    #[tokio::test]
    async fn test_similarity_search_ranks_relevant_first() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let provider = hashed_provider();

        let chunks = vec![
            chunk("a", "the awesome sink converts overflow parts", &[]),
            chunk("b", "pasture rotation keeps cattle healthy", &[]),
        ];
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = provider.embed(&texts).await.unwrap();
        let embeddings: Vec<Option<Vec<f32>>> = vectors.into_iter().map(Some).collect();
        store.upsert(&chunks, &embeddings).await.unwrap();

        let hits = store
            .similarity_search("awesome sink overflow", 2, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.id, "a");
        assert!(hits[0].1 >= hits[1].1);
    }

    #[tokio::test]
    async fn test_similarity_search_skips_unembedded() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store
            .upsert(&[chunk("a", "no vector here", &[])], &[None])
            .await
            .unwrap();
        let hits = store.similarity_search("anything", 5, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_round_trips_through_blob() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let vector = vec![0.25f32, -1.5, 3.0];
        store
            .upsert(&[chunk("a", "text", &[])], &[Some(vector.clone())])
            .await
            .unwrap();

        let all = store.get_all(None).await.unwrap();
        assert_eq!(all[0].embedding.as_deref(), Some(vector.as_slice()));
    }
}
