//! Core data types flowing through the ingestion and retrieval pipeline.
//!
//! Metadata is typed per source kind ([`DocMetadata`]) and converted to flat
//! string fields exactly once, at the store boundary ([`DocMetadata::to_fields`]).

use std::collections::BTreeMap;

/// Pre-chunking unit: raw text plus provenance, one per source file or URL.
/// Created by a source, consumed by the chunker, never persisted itself.
#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub metadata: DocMetadata,
}

/// Provenance metadata, one variant per source kind.
#[derive(Debug, Clone)]
pub enum DocMetadata {
    /// A file inside a GitHub repository checkout.
    RepoFile {
        /// `owner/repo`.
        repo: String,
        /// Path relative to the repository root.
        path: String,
        /// Splitting-policy hint, e.g. `rust`, `python`, `markdown`, `text`.
        language: String,
    },
    /// A web page or local pseudo-URL document.
    Page {
        url: String,
        title: String,
        language: String,
    },
}

impl DocMetadata {
    /// Stable location key used for chunk identity. Re-ingesting the same
    /// file or URL reuses the same key.
    pub fn scope_key(&self) -> String {
        match self {
            DocMetadata::RepoFile { repo, path, .. } => format!("{}/{}", repo, path),
            DocMetadata::Page { url, .. } => url.clone(),
        }
    }

    pub fn language(&self) -> &str {
        match self {
            DocMetadata::RepoFile { language, .. } => language,
            DocMetadata::Page { language, .. } => language,
        }
    }

    /// File path hint for splitter-policy selection, when the source is a file.
    pub fn path(&self) -> Option<&str> {
        match self {
            DocMetadata::RepoFile { path, .. } => Some(path),
            DocMetadata::Page { .. } => None,
        }
    }

    /// The single stringify step: every value becomes a flat string field so
    /// the store never sees a non-scalar.
    pub fn to_fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        match self {
            DocMetadata::RepoFile {
                repo,
                path,
                language,
            } => {
                fields.insert("repo".to_string(), repo.clone());
                fields.insert("source".to_string(), path.clone());
                fields.insert("language".to_string(), language.clone());
            }
            DocMetadata::Page {
                url,
                title,
                language,
            } => {
                fields.insert("url".to_string(), url.clone());
                fields.insert("title".to_string(), title.clone());
                fields.insert("language".to_string(), language.clone());
            }
        }
        fields
    }
}

/// The atomic retrievable unit, ready for the store.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Content-derived id; see [`crate::identity::chunk_id`].
    pub id: String,
    pub content: String,
    pub fields: BTreeMap<String, String>,
}

/// A chunk returned from retrieval, carrying its final reranked score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub content: String,
    pub fields: BTreeMap<String, String>,
    pub score: f32,
}

impl ScoredChunk {
    /// Human-readable provenance line for tool output.
    pub fn provenance(&self) -> String {
        if let (Some(repo), Some(source)) = (self.fields.get("repo"), self.fields.get("source")) {
            return format!("https://github.com/{}/blob/main/{}", repo, source);
        }
        if let Some(url) = self.fields.get("url") {
            return url.clone();
        }
        "unknown".to_string()
    }
}
