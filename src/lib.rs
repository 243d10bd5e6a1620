//! # ragweave
//!
//! A hybrid-retrieval engine for grounding AI answers in ingested content.
//!
//! ragweave pulls documents from GitHub repositories, web pages, and local
//! directories, splits them into language-aware chunks with content-derived
//! ids, embeds them, and stores everything in SQLite. Retrieval fuses BM25
//! lexical scores with dense cosine similarity and reranks the fused
//! candidates with a cross-encoder before returning the top results.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │   Sources     │──▶│   Pipeline    │──▶│  SQLite   │
//! │ GitHub/Web/FS │   │ Chunk+Embed  │   │  chunks   │
//! └──────────────┘   └──────────────┘   └────┬─────┘
//!                                            │
//!                              ┌─────────────┤
//!                              ▼             ▼
//!                        ┌──────────┐  ┌──────────┐
//!                        │   BM25   │  │  Dense   │
//!                        └────┬─────┘  └────┬─────┘
//!                             └──── fuse ───┘
//!                                    │
//!                                 rerank
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag init                          # create the store
//! rag ingest github                 # index configured repositories
//! rag ingest web                    # index configured pages
//! rag search "deployment pipeline"  # hybrid search
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunker`] | Language-aware recursive text splitting |
//! | [`identity`] | Content-derived chunk ids |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`sparse`] | In-memory BM25 index |
//! | [`rerank`] | Cross-encoder reranking |
//! | [`store`] | SQLite chunk store |
//! | [`retriever`] | Hybrid dense + sparse retrieval |
//! | [`ingest`] | Source-to-store ingestion pipeline |
//! | [`source_github`] | GitHub repository source |
//! | [`source_web`] | Web page source |
//! | [`source_local`] | Local directory source |

pub mod chunker;
pub mod config;
pub mod embedding;
pub mod identity;
pub mod ingest;
pub mod models;
pub mod rerank;
pub mod retriever;
pub mod source_github;
pub mod source_local;
pub mod source_web;
pub mod sparse;
pub mod store;
