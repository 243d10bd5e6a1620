//! Hybrid retrieval: BM25 + dense fusion with cross-encoder reranking.
//!
//! A [`HybridRetriever`] is built per query session against a store and an
//! optional metadata scope filter. Construction materializes the filtered
//! corpus once and builds a transient in-memory BM25 index over it; the
//! index is discarded with the retriever. Searching runs the sparse channel
//! against that index and the dense channel through the store's similarity
//! search under the same filter, min-max normalizes each score list, fuses
//! by weighted sum, reranks the fused candidates against the query, and
//! returns the top results.

use anyhow::Result;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Config, RetrievalConfig};
use crate::models::ScoredChunk;
use crate::rerank::{shared_reranker, Reranker};
use crate::sparse::Bm25Index;
use crate::store::{Store, StoredChunk};

pub struct HybridRetriever {
    store: Arc<Store>,
    corpus: Vec<StoredChunk>,
    index_by_id: HashMap<String, usize>,
    sparse: Bm25Index,
    /// Filter both channels actually run under; `None` after the
    /// empty-filter fallback fired.
    effective_filter: Option<BTreeMap<String, String>>,
    opts: RetrievalConfig,
    reranker: Arc<dyn Reranker>,
}

impl HybridRetriever {
    /// Materialize the scoped corpus and build the sparse index. An empty
    /// result for a non-empty filter falls back to the whole collection so
    /// a mistyped scope degrades to unscoped search instead of silence.
    pub async fn new(
        store: Arc<Store>,
        scope_filter: Option<&BTreeMap<String, String>>,
        opts: RetrievalConfig,
        reranker: Arc<dyn Reranker>,
    ) -> Result<Self> {
        let mut effective_filter = scope_filter.cloned();
        let mut corpus = store.get_all(scope_filter).await?;
        if corpus.is_empty() && scope_filter.is_some() {
            tracing::warn!(filter = ?scope_filter, "Scope filter matched no chunks, searching whole collection");
            effective_filter = None;
            corpus = store.get_all(None).await?;
        }

        let texts: Vec<&str> = corpus.iter().map(|c| c.content.as_str()).collect();
        let sparse = Bm25Index::build(&texts);
        tracing::debug!(chunks = sparse.len(), "Built sparse index");

        let index_by_id = corpus
            .iter()
            .enumerate()
            .map(|(idx, chunk)| (chunk.id.clone(), idx))
            .collect();

        Ok(Self {
            store,
            corpus,
            index_by_id,
            sparse,
            effective_filter,
            opts,
            reranker,
        })
    }

    pub fn corpus_len(&self) -> usize {
        self.corpus.len()
    }

    pub async fn search(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        if self.corpus.is_empty() {
            return Ok(Vec::new());
        }

        let sparse_hits = self.sparse.search(query, self.opts.k_sparse);
        let dense_hits = self.dense_search(query).await?;

        let norm_sparse = normalize_scores(&sparse_hits);
        let norm_dense = normalize_scores(&dense_hits);

        // Fuse by chunk index, weighted; missing channel contributes 0.
        let weight_sum = self.opts.dense_weight + self.opts.sparse_weight;
        let (dense_w, sparse_w) = if weight_sum > 0.0 {
            (
                self.opts.dense_weight / weight_sum,
                self.opts.sparse_weight / weight_sum,
            )
        } else {
            (0.5, 0.5)
        };

        let sparse_map: HashMap<usize, f32> = norm_sparse.into_iter().collect();
        let dense_map: HashMap<usize, f32> = norm_dense.into_iter().collect();

        let mut fused: Vec<(usize, f32)> = sparse_map
            .keys()
            .chain(dense_map.keys())
            .copied()
            .collect::<std::collections::BTreeSet<usize>>()
            .into_iter()
            .map(|idx| {
                let s = sparse_map.get(&idx).copied().unwrap_or(0.0);
                let d = dense_map.get(&idx).copied().unwrap_or(0.0);
                (idx, sparse_w * s + dense_w * d)
            })
            .collect();

        if fused.is_empty() {
            return Ok(Vec::new());
        }

        // Rerank every fused candidate, then order by rerank score with the
        // fused score (then id) as tie-breakers.
        let texts: Vec<String> = fused
            .iter()
            .map(|(idx, _)| self.corpus[*idx].content.clone())
            .collect();
        let rerank_scores = self.reranker.score(query, &texts).await?;

        let mut ranked: Vec<(usize, f32, f32)> = fused
            .drain(..)
            .zip(rerank_scores)
            .map(|((idx, fused_score), rerank_score)| (idx, rerank_score, fused_score))
            .collect();

        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| self.corpus[a.0].id.cmp(&self.corpus[b.0].id))
        });
        ranked.truncate(self.opts.top_n);

        Ok(ranked
            .into_iter()
            .map(|(idx, score, _)| {
                let chunk = &self.corpus[idx];
                ScoredChunk {
                    content: chunk.content.clone(),
                    fields: chunk.fields.clone(),
                    score,
                }
            })
            .collect())
    }

    /// Store similarity search under the effective filter, top `k_dense`,
    /// mapped back to corpus indices for fusion.
    async fn dense_search(&self, query: &str) -> Result<Vec<(usize, f32)>> {
        let hits = self
            .store
            .similarity_search(query, self.opts.k_dense, self.effective_filter.as_ref())
            .await?;

        Ok(hits
            .into_iter()
            .filter_map(|(chunk, score)| {
                self.index_by_id.get(&chunk.id).map(|&idx| (idx, score))
            })
            .collect())
    }
}

/// Min-max normalize into [0, 1]; a single-point (or constant) list maps
/// to 1.0 so a lone strong hit is not zeroed out.
fn normalize_scores(hits: &[(usize, f32)]) -> Vec<(usize, f32)> {
    if hits.is_empty() {
        return Vec::new();
    }

    let s_min = hits.iter().map(|(_, s)| *s).fold(f32::INFINITY, f32::min);
    let s_max = hits
        .iter()
        .map(|(_, s)| *s)
        .fold(f32::NEG_INFINITY, f32::max);

    hits.iter()
        .map(|(idx, s)| {
            let norm = if (s_max - s_min).abs() < f32::EPSILON {
                1.0
            } else {
                (s - s_min) / (s_max - s_min)
            };
            (*idx, norm)
        })
        .collect()
}

/// Outcome of a retrieval call meant for tool-style consumers: either a
/// ranked hit list or an error message, never a panic.
#[derive(Debug)]
pub enum RetrievalReply {
    Hits(Vec<ScoredChunk>),
    Error(String),
}

/// One-shot retrieval entry point: open the store, build a retriever for the
/// scope, search, and fold any failure into a printable error string.
pub async fn retrieve(
    config: &Config,
    query: &str,
    scope_filter: Option<&BTreeMap<String, String>>,
    top_n: Option<usize>,
) -> RetrievalReply {
    match retrieve_inner(config, query, scope_filter, top_n).await {
        Ok(hits) => RetrievalReply::Hits(hits),
        Err(e) => RetrievalReply::Error(format!("Retrieval failed: {:#}", e)),
    }
}

async fn retrieve_inner(
    config: &Config,
    query: &str,
    scope_filter: Option<&BTreeMap<String, String>>,
    top_n: Option<usize>,
) -> Result<Vec<ScoredChunk>> {
    let provider = crate::embedding::create_provider(&config.embedding)?;
    let store = Arc::new(Store::open(&config.store.path, &config.store.collection, provider).await?);
    let reranker = shared_reranker(&config.reranker)?;

    let mut opts = config.retrieval.clone();
    if let Some(n) = top_n {
        opts.top_n = n;
    }

    let retriever = HybridRetriever::new(store.clone(), scope_filter, opts, reranker).await?;
    let hits = retriever.search(query).await;
    store.close().await;
    hits
}

/// Concatenate hits into a context block, each prefixed with its provenance.
pub fn format_context(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .map(|hit| {
            let mut block = format!("Source: {}\n", hit.provenance());
            if let Some(title) = hit.fields.get("title") {
                block.push_str(&format!("Title: {}\n", title));
            }
            block.push_str(&hit.content);
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}
