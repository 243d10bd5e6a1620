//! In-memory BM25 lexical index.
//!
//! Built per retriever over the materialized corpus (the corpus sizes in
//! scope are thousands to tens of thousands of chunks, so a full rebuild is
//! cheap). Standard Okapi BM25 with k1 = 1.2, b = 0.75.

use std::collections::HashMap;

const K1: f32 = 1.2;
const B: f32 = 0.75;

/// Lowercase alphanumeric tokenizer shared by the sparse index and the
/// lexical reranker.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

pub struct Bm25Index {
    doc_tokens: Vec<Vec<String>>,
    doc_freq: HashMap<String, usize>,
    avg_doc_len: f32,
}

impl Bm25Index {
    pub fn build<S: AsRef<str>>(texts: &[S]) -> Bm25Index {
        let doc_tokens: Vec<Vec<String>> =
            texts.iter().map(|t| tokenize(t.as_ref())).collect();

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for tokens in &doc_tokens {
            let mut seen: Vec<&String> = tokens.iter().collect();
            seen.sort_unstable();
            seen.dedup();
            for token in seen {
                *doc_freq.entry(token.clone()).or_insert(0) += 1;
            }
        }

        let total_len: usize = doc_tokens.iter().map(Vec::len).sum();
        let avg_doc_len = if doc_tokens.is_empty() {
            1.0
        } else {
            (total_len as f32 / doc_tokens.len() as f32).max(1.0)
        };

        Bm25Index {
            doc_tokens,
            doc_freq,
            avg_doc_len,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_tokens.is_empty()
    }

    /// Top-k documents by BM25 score, descending. Documents with no query
    /// term in common are omitted.
    pub fn search(&self, query: &str, k: usize) -> Vec<(usize, f32)> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || self.doc_tokens.is_empty() {
            return Vec::new();
        }

        let n = self.doc_tokens.len() as f32;
        let mut hits: Vec<(usize, f32)> = Vec::new();

        for (doc_idx, tokens) in self.doc_tokens.iter().enumerate() {
            let doc_len = tokens.len() as f32;
            let mut score = 0.0f32;

            for term in &query_tokens {
                let tf = tokens.iter().filter(|t| *t == term).count() as f32;
                if tf == 0.0 {
                    continue;
                }
                let df = self.doc_freq.get(term).copied().unwrap_or(0) as f32;
                let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                let norm = tf * (K1 + 1.0) / (tf + K1 * (1.0 - B + B * doc_len / self.avg_doc_len));
                score += idf * norm;
            }

            if score > 0.0 {
                hits.push((doc_idx, score));
            }
        }

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        hits.truncate(k);
        hits
    }
}
