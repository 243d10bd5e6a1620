//! Local directory source.
//!
//! Reads files with a configured extension from the top level of a
//! directory. Each file becomes one document whose title is derived from
//! the file name, so locally maintained notes can be indexed alongside
//! remote sources.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::{ChunkSpec, LocalSourceConfig};
use crate::ingest::DocumentSource;
use crate::models::{DocMetadata, Document};

pub struct LocalSource {
    dir: std::path::PathBuf,
    extension: String,
    spec: ChunkSpec,
}

impl LocalSource {
    pub fn new(config: &LocalSourceConfig, spec: ChunkSpec) -> Self {
        Self {
            dir: config.dir.clone(),
            extension: config.extension.to_ascii_lowercase(),
            spec,
        }
    }
}

#[async_trait]
impl DocumentSource for LocalSource {
    fn name(&self) -> &str {
        "local"
    }

    fn chunk_spec(&self) -> ChunkSpec {
        self.spec
    }

    async fn load_documents(&self) -> Result<Vec<Document>> {
        anyhow::ensure!(
            self.dir.is_dir(),
            "Local source directory not found: {}",
            self.dir.display()
        );

        let mut documents = Vec::new();

        for entry in WalkDir::new(&self.dir)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            let matches_ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase() == self.extension)
                .unwrap_or(false);
            if !matches_ext {
                continue;
            }

            let content = match std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))
            {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                    continue;
                }
            };
            if content.trim().is_empty() {
                continue;
            }

            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            documents.push(Document {
                content,
                metadata: DocMetadata::Page {
                    url: format!("local://{}", file_name),
                    title: title_from_path(path),
                    language: if self.extension == "md" {
                        "markdown".to_string()
                    } else {
                        "text".to_string()
                    },
                },
            });
        }

        info!(dir = %self.dir.display(), files = documents.len(), "Loaded local files");
        Ok(documents)
    }
}

/// `release_notes_2024.md` becomes `Release Notes 2024`.
fn title_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    stem.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
