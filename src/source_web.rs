//! Web page source.
//!
//! Fetches each configured URL and extracts readable text from the page
//! body: paragraphs, headings, list items, preformatted blocks, and quotes
//! inside `<article>`, `<main>`, or `<body>`. Nested matches are collapsed
//! to their outermost element so text is never duplicated. Failed fetches
//! and empty pages are skipped with a warning.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{ChunkSpec, WebSourceConfig};
use crate::ingest::DocumentSource;
use crate::models::{DocMetadata, Document};

pub struct WebSource {
    urls: Vec<String>,
    client: reqwest::Client,
    spec: ChunkSpec,
}

impl WebSource {
    pub fn new(config: &WebSourceConfig, spec: ChunkSpec) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("ragweave/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            urls: config.urls.clone(),
            client,
            spec,
        })
    }
}

#[async_trait]
impl DocumentSource for WebSource {
    fn name(&self) -> &str {
        "web"
    }

    fn chunk_spec(&self) -> ChunkSpec {
        self.spec
    }

    async fn load_documents(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();

        for url in &self.urls {
            let html = match self.fetch(url).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(url, error = %e, "Failed to fetch page, skipping");
                    continue;
                }
            };

            // `Html` is not Send, so parsing stays inside this sync call and
            // is never held across an await point.
            let page = match extract_page(&html) {
                Ok(p) => p,
                Err(e) => {
                    warn!(url, error = %e, "Failed to extract page, skipping");
                    continue;
                }
            };

            if page.text.is_empty() {
                warn!(url, "Page yielded no text, skipping");
                continue;
            }

            info!(url, chars = page.text.len(), title = %page.title, "Fetched page");
            documents.push(Document {
                content: page.text,
                metadata: DocMetadata::Page {
                    url: url.clone(),
                    title: page.title,
                    language: "text".to_string(),
                },
            });
        }

        Ok(documents)
    }
}

impl WebSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Request to {} returned an error status", url))?;
        Ok(response.text().await?)
    }
}

struct ExtractedPage {
    title: String,
    text: String,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector '{}': {}", css, e))
}

/// Pull the title and readable text out of an HTML document.
fn extract_page(html: &str) -> Result<ExtractedPage> {
    let document = Html::parse_document(html);

    let title_sel = selector("title")?;
    let title = document
        .select(&title_sel)
        .next()
        .map(|t| clean_text(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Unknown title".to_string());

    // Prefer the semantic content container when the page has one.
    let container_sel = selector("article, main, body")?;
    let text_sel = selector("p, h1, h2, h3, h4, h5, h6, li, pre, blockquote")?;

    let container = match document.select(&container_sel).next() {
        Some(c) => c,
        None => {
            return Ok(ExtractedPage {
                title,
                text: String::new(),
            })
        }
    };

    let matched: Vec<_> = container.select(&text_sel).collect();
    let matched_ids: HashSet<_> = matched.iter().map(|el| el.id()).collect();

    let mut blocks = Vec::new();
    for element in &matched {
        // An element whose ancestor also matched contributes its text through
        // that ancestor; emitting both would duplicate it.
        let nested = element
            .ancestors()
            .any(|ancestor| matched_ids.contains(&ancestor.id()));
        if nested {
            continue;
        }

        let text = clean_text(&element.text().collect::<String>());
        if !text.is_empty() {
            blocks.push(text);
        }
    }

    Ok(ExtractedPage {
        title,
        text: blocks.join("\n\n"),
    })
}

/// Collapse all runs of whitespace to single spaces.
fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  a\n\n  b\tc  "), "a b c");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn test_extract_title_and_paragraphs() {
        let html = r#"
            <html><head><title>  Release  Notes </title></head>
            <body>
              <article>
                <h1>Version 2.0</h1>
                <p>Faster ingestion.</p>
              </article>
            </body></html>
        "#;
        let page = extract_page(html).unwrap();
        assert_eq!(page.title, "Release Notes");
        assert!(page.text.contains("Version 2.0"));
        assert!(page.text.contains("Faster ingestion."));
    }

    #[test]
    fn test_extract_prefers_article_over_body() {
        let html = r#"
            <html><body>
              <nav><p>Menu item</p></nav>
              <article><p>Real content.</p></article>
            </body></html>
        "#;
        let page = extract_page(html).unwrap();
        assert!(page.text.contains("Real content."));
        assert!(!page.text.contains("Menu item"));
    }

    #[test]
    fn test_nested_matches_not_duplicated() {
        let html = r#"
            <html><body><article>
              <blockquote><p>Quoted line.</p></blockquote>
            </article></body></html>
        "#;
        let page = extract_page(html).unwrap();
        assert_eq!(page.text.matches("Quoted line.").count(), 1);
    }

    #[test]
    fn test_missing_title_gets_placeholder() {
        let html = "<html><body><article><p>Text only.</p></article></body></html>";
        let page = extract_page(html).unwrap();
        assert_eq!(page.title, "Unknown title");
    }
}
