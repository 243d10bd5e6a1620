//! GitHub repository source.
//!
//! Clones each configured repository shallowly with the `git` CLI into a
//! temp directory, walks the checkout with an include/exclude glob filter,
//! and yields one [`Document`] per readable text file. A repository that
//! fails to clone is skipped with an error log; the remaining repositories
//! still load. Checkouts are removed when the load finishes.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::{ChunkSpec, GithubSourceConfig};
use crate::ingest::DocumentSource;
use crate::models::{DocMetadata, Document};

/// Extensions worth indexing from a code repository.
const INCLUDE_EXTENSIONS: &[&str] = &[
    "py", "pyi", "ipynb", "js", "jsx", "ts", "tsx", "java", "kt", "kts", "rs", "go", "c", "cpp",
    "h", "hpp", "cs", "swift", "dart", "php", "rb", "sh", "bash", "zsh", "ps1", "sql", "r", "md",
    "markdown", "rst", "adoc", "txt", "json", "yaml", "yml", "toml", "xml", "env", "ini",
];

/// Well-known files without a useful extension.
const INCLUDE_NAMES: &[&str] = &[
    "Dockerfile*",
    "Makefile*",
    "Procfile*",
    "Jenkinsfile*",
    "Vagrantfile*",
    "Gemfile*",
    "Rakefile*",
    "Cargo.lock",
    "go.mod",
    "go.sum",
    "pyproject.toml",
    "package.json",
];

const EXCLUDE_DIRS: &[&str] = &[
    "**/.git/**",
    "**/node_modules/**",
    "**/__pycache__/**",
    "**/dist/**",
    "**/build/**",
    "**/venv/**",
    "**/.env/**",
];

pub struct GithubSource {
    repos: Vec<String>,
    branch: String,
    spec: ChunkSpec,
}

impl GithubSource {
    pub fn new(config: &GithubSourceConfig, spec: ChunkSpec) -> Self {
        Self {
            repos: config.repos.clone(),
            branch: config.branch.clone(),
            spec,
        }
    }

}

fn load_repo(repo: &str, branch: &str) -> Result<Vec<Document>> {
    // Fallible setup happens before the clone; from the clone on, nothing
    // returns early, so cleanup_checkout always runs.
    let include = build_include_set()?;
    let exclude = build_exclude_set()?;

    let checkout = checkout_dir(repo);
    // Stale dir from a crashed run; start clean.
    if checkout.exists() {
        std::fs::remove_dir_all(&checkout).ok();
    }

    clone_repo(repo, branch, &checkout)?;

    let mut documents = Vec::new();
    for entry in WalkDir::new(&checkout)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let relative = match entry.path().strip_prefix(&checkout) {
            Ok(p) => p,
            Err(_) => continue,
        };

        if exclude.is_match(relative) || !include.is_match(relative) {
            continue;
        }

        let content = match std::fs::read_to_string(entry.path()) {
            Ok(c) => c,
            Err(e) => {
                debug!(path = %relative.display(), error = %e, "Skipping unreadable file");
                continue;
            }
        };
        if content.trim().is_empty() {
            continue;
        }

        let rel_str = relative.to_string_lossy().replace('\\', "/");
        documents.push(Document {
            metadata: DocMetadata::RepoFile {
                repo: repo.to_string(),
                path: rel_str.clone(),
                language: language_for(&rel_str).to_string(),
            },
            content,
        });
    }

    cleanup_checkout(&checkout);
    Ok(documents)
}

#[async_trait]
impl DocumentSource for GithubSource {
    fn name(&self) -> &str {
        "github"
    }

    fn chunk_spec(&self) -> ChunkSpec {
        self.spec
    }

    async fn load_documents(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();

        for repo in &self.repos {
            info!(repo, branch = %self.branch, "Loading repository");
            // Clone and walk are blocking; repositories are processed
            // sequentially so this runs on the blocking pool one at a time.
            let repo_name = repo.clone();
            let branch = self.branch.clone();
            let loaded =
                tokio::task::spawn_blocking(move || load_repo(&repo_name, &branch)).await?;

            match loaded {
                Ok(mut docs) => {
                    info!(repo, files = docs.len(), "Repository loaded");
                    documents.append(&mut docs);
                }
                Err(e) => {
                    error!(repo, error = %e, "Failed to load repository, skipping");
                }
            }
        }

        Ok(documents)
    }
}

fn checkout_dir(repo: &str) -> PathBuf {
    let safe: String = repo
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    std::env::temp_dir().join(format!("ragweave-git-{}-{}", std::process::id(), safe))
}

/// Shallow single-branch clone. If the requested branch does not exist the
/// clone is retried without `--branch` so repositories whose default branch
/// is not the configured one still load.
fn clone_repo(repo: &str, branch: &str, dest: &Path) -> Result<()> {
    let url = format!("https://github.com/{}.git", repo);

    let attempt = |with_branch: bool| -> Result<()> {
        let mut cmd = Command::new("git");
        cmd.args(["clone", "--depth", "1"]);
        if with_branch {
            cmd.args(["--branch", branch, "--single-branch"]);
        }
        cmd.arg(&url);
        cmd.arg(dest);

        let output = cmd
            .output()
            .with_context(|| "Failed to execute 'git clone'. Is git installed?")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git clone failed: {}", stderr.trim());
        }
        Ok(())
    };

    match attempt(true) {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!(repo, branch, error = %e, "Branch clone failed, retrying with default branch");
            std::fs::remove_dir_all(dest).ok();
            attempt(false)
        }
    }
}

/// Remove a checkout with a few retries. Editors and indexers can hold
/// handles briefly on some platforms; a leftover directory is only worth a
/// warning, not a failed ingestion.
fn cleanup_checkout(dir: &Path) {
    for attempt in 0..3 {
        match std::fs::remove_dir_all(dir) {
            Ok(()) => return,
            Err(_) if attempt < 2 => {
                std::thread::sleep(Duration::from_millis(200 << attempt));
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Failed to remove checkout");
            }
        }
    }
}

fn build_include_set() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for ext in INCLUDE_EXTENSIONS {
        builder.add(
            GlobBuilder::new(&format!("**/*.{}", ext))
                .case_insensitive(true)
                .build()?,
        );
    }
    for name in INCLUDE_NAMES {
        builder.add(
            GlobBuilder::new(&format!("**/{}", name))
                .case_insensitive(true)
                .build()?,
        );
    }
    Ok(builder.build()?)
}

fn build_exclude_set() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in EXCLUDE_DIRS {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Language tag recorded in chunk metadata, keyed by file extension.
fn language_for(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "rs" => "rust",
        "py" | "pyi" | "ipynb" => "python",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "go" => "go",
        "c" | "h" => "c",
        "cpp" | "hpp" => "cpp",
        "cs" => "csharp",
        "swift" => "swift",
        "dart" => "dart",
        "php" => "php",
        "rb" => "ruby",
        "sh" | "bash" | "zsh" => "shell",
        "ps1" => "powershell",
        "sql" => "sql",
        "r" => "r",
        "md" | "markdown" => "markdown",
        "html" => "html",
        _ => "text",
    }
}
