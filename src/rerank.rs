//! Cross-encoder reranking.
//!
//! The reranker scores each (query, candidate) pair directly, which is more
//! accurate than embedding similarity but too expensive to initialize per
//! query. [`shared_reranker`] holds one process-wide instance behind a
//! `OnceLock`: the first caller builds it, every later caller (including
//! concurrent ones) reuses it. Scoring is stateless, so the shared instance
//! needs no further locking.
//!
//! Providers:
//! - **`lexical`** — deterministic IDF-weighted term-overlap scorer; no model
//!   download, used as the default and in tests.
//! - **`http`** — TEI-style `POST /rerank` endpoint (`{"query", "texts"}` in,
//!   `[{"index", "score"}]` out) with the same retry policy as the embedding
//!   client.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config::RerankerConfig;
use crate::sparse::tokenize;

#[async_trait]
pub trait Reranker: Send + Sync {
    fn model_name(&self) -> &str;
    /// Relevance score for each text against the query, in input order.
    /// Higher is more relevant.
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>>;
}

static SHARED: OnceLock<Arc<dyn Reranker>> = OnceLock::new();

/// Process-wide reranker, built lazily from the first config seen. Concurrent
/// first calls may race to build, but only one instance is ever installed.
pub fn shared_reranker(config: &RerankerConfig) -> Result<Arc<dyn Reranker>> {
    if let Some(existing) = SHARED.get() {
        return Ok(existing.clone());
    }
    let built = build_reranker(config)?;
    Ok(SHARED.get_or_init(|| built).clone())
}

pub fn build_reranker(config: &RerankerConfig) -> Result<Arc<dyn Reranker>> {
    match config.provider.as_str() {
        "lexical" => Ok(Arc::new(LexicalReranker)),
        "http" => Ok(Arc::new(HttpReranker::new(config)?)),
        other => bail!("Unknown reranker provider: {}", other),
    }
}

// ============ Lexical reranker ============

/// IDF-weighted term overlap between the query and each candidate, dampened
/// by candidate length. Deterministic and dependency-free; a stand-in for a
/// neural cross-encoder with the same interface and ordering contract.
pub struct LexicalReranker;

#[async_trait]
impl Reranker for LexicalReranker {
    fn model_name(&self) -> &str {
        "lexical"
    }

    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Ok(vec![0.0; texts.len()]);
        }

        let candidates: Vec<Vec<String>> = texts.iter().map(|t| tokenize(t)).collect();
        let n = candidates.len().max(1) as f32;

        // Document frequency over the candidate set for IDF weighting.
        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for tokens in &candidates {
            let mut seen: Vec<&str> = tokens.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for token in seen {
                *doc_freq.entry(token).or_insert(0) += 1;
            }
        }

        let mut distinct_query: Vec<&str> = query_tokens.iter().map(String::as_str).collect();
        distinct_query.sort_unstable();
        distinct_query.dedup();

        let scores = candidates
            .iter()
            .map(|tokens| {
                if tokens.is_empty() {
                    return 0.0;
                }
                let mut score = 0.0f32;
                for term in &distinct_query {
                    let tf = tokens.iter().filter(|t| t.as_str() == *term).count() as f32;
                    if tf == 0.0 {
                        continue;
                    }
                    let df = doc_freq.get(term).copied().unwrap_or(0) as f32;
                    let idf = (1.0 + n / (df + 0.5)).ln();
                    score += idf * (1.0 + tf.ln());
                }
                score / (tokens.len() as f32).sqrt()
            })
            .collect();

        Ok(scores)
    }
}

// ============ HTTP reranker ============

pub struct HttpReranker {
    model: String,
    endpoint: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpReranker {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow::anyhow!("reranker.endpoint required for http provider"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "cross-encoder".to_string()),
            endpoint,
            max_retries: config.max_retries,
            client,
        })
    }

    async fn call(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "query": query,
            "texts": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(&self.endpoint).json(&body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_rerank_response(&json, texts.len());
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("rerank API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("rerank API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("rerank failed after retries")))
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    fn model_name(&self) -> &str {
        &self.model
    }
    async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        self.call(query, texts).await
    }
}

/// Parse `[{"index": 0, "score": 0.93}, ...]`, restoring input order.
fn parse_rerank_response(json: &serde_json::Value, expected: usize) -> Result<Vec<f32>> {
    let entries = json
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("invalid rerank response: expected array"))?;

    let mut scores = vec![0.0f32; expected];
    for entry in entries {
        let index = entry
            .get("index")
            .and_then(|i| i.as_u64())
            .ok_or_else(|| anyhow::anyhow!("invalid rerank response: missing index"))?
            as usize;
        let score = entry
            .get("score")
            .and_then(|s| s.as_f64())
            .ok_or_else(|| anyhow::anyhow!("invalid rerank response: missing score"))?;
        if index >= expected {
            bail!("invalid rerank response: index {} out of range", index);
        }
        scores[index] = score as f32;
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lexical_prefers_matching_text() {
        let reranker = LexicalReranker;
        let texts = vec![
            "The AWESOME Sink converts overflow into coupons.".to_string(),
            "Cattle pastures require fresh water daily.".to_string(),
        ];
        let scores = reranker
            .score("What is the AWESOME Sink?", &texts)
            .await
            .unwrap();
        assert!(scores[0] > scores[1]);
    }

    #[tokio::test]
    async fn test_lexical_empty_query() {
        let reranker = LexicalReranker;
        let scores = reranker
            .score("???", &["some text".to_string()])
            .await
            .unwrap();
        assert_eq!(scores, vec![0.0]);
    }

    #[tokio::test]
    async fn test_lexical_scores_align_with_input_order() {
        let reranker = LexicalReranker;
        let texts = vec![
            "nothing relevant here".to_string(),
            "deployment pipeline configuration".to_string(),
            "unrelated again".to_string(),
        ];
        let scores = reranker
            .score("deployment pipeline", &texts)
            .await
            .unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores[1] > scores[0]);
        assert!(scores[1] > scores[2]);
    }

    #[test]
    fn test_parse_rerank_response_restores_order() {
        let json = serde_json::json!([
            {"index": 1, "score": 0.9},
            {"index": 0, "score": 0.2},
        ]);
        let scores = parse_rerank_response(&json, 2).unwrap();
        assert!((scores[0] - 0.2).abs() < 1e-6);
        assert!((scores[1] - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_parse_rerank_response_rejects_bad_index() {
        let json = serde_json::json!([{"index": 5, "score": 0.9}]);
        assert!(parse_rerank_response(&json, 2).is_err());
    }

    #[test]
    fn test_shared_reranker_returns_same_instance() {
        let config = RerankerConfig::default();
        let a = shared_reranker(&config).unwrap();
        let b = shared_reranker(&config).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
