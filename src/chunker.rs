//! Structure-aware document chunking.
//!
//! Splits a [`Document`] into bounded-size text chunks. The splitting policy
//! is chosen from the document's language or file extension: source code is
//! split along syntactic boundaries, markdown along its header hierarchy, and
//! everything else along a generic separator ladder (paragraph → line →
//! sentence → word → character). Adjacent chunks share `chunk_overlap`
//! characters so context survives a split boundary.
//!
//! Chunks are built to at most `chunk_size` bytes before the overlap is
//! prepended, so every produced chunk is at most `chunk_size + chunk_overlap`.

use crate::config::ChunkSpec;
use crate::models::Document;

/// Splitting policy derived from a document's declared or inferred type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitPolicy {
    Rust,
    Python,
    JavaScript,
    Java,
    Kotlin,
    Go,
    C,
    CSharp,
    Swift,
    Php,
    Ruby,
    Html,
    Markdown,
    Generic,
}

impl SplitPolicy {
    /// Select a policy from the document metadata: an explicit language tag
    /// wins, then the file extension, then the generic fallback. Unsupported
    /// types never fail, they just get the generic ladder.
    pub fn for_document(doc: &Document) -> SplitPolicy {
        match doc.metadata.language() {
            "markdown" => return SplitPolicy::Markdown,
            "text" => return SplitPolicy::Generic,
            _ => {}
        }
        doc.metadata
            .path()
            .map(SplitPolicy::for_path)
            .unwrap_or(SplitPolicy::Generic)
    }

    pub fn for_path(path: &str) -> SplitPolicy {
        let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
        match ext.as_str() {
            "rs" => SplitPolicy::Rust,
            "py" | "pyi" => SplitPolicy::Python,
            "js" | "jsx" | "ts" | "tsx" => SplitPolicy::JavaScript,
            "java" => SplitPolicy::Java,
            "kt" | "kts" => SplitPolicy::Kotlin,
            "go" => SplitPolicy::Go,
            "c" | "cpp" | "h" | "hpp" => SplitPolicy::C,
            "cs" => SplitPolicy::CSharp,
            "swift" => SplitPolicy::Swift,
            "php" => SplitPolicy::Php,
            "rb" => SplitPolicy::Ruby,
            "html" => SplitPolicy::Html,
            "md" | "markdown" => SplitPolicy::Markdown,
            _ => SplitPolicy::Generic,
        }
    }

    /// Ordered separator ladder for this policy. Earlier separators mark
    /// stronger structural boundaries; the empty string is the final
    /// character-level fallback and must always be last.
    fn separators(self) -> &'static [&'static str] {
        match self {
            SplitPolicy::Rust => &[
                "\nimpl ", "\npub fn ", "\nfn ", "\npub struct ", "\nstruct ", "\nenum ",
                "\ntrait ", "\nmod ", "\n\n", "\n", " ", "",
            ],
            SplitPolicy::Python => &[
                "\nclass ", "\ndef ", "\n\tdef ", "\n    def ", "\n\n", "\n", " ", "",
            ],
            SplitPolicy::JavaScript => &[
                "\nfunction ", "\nexport ", "\nclass ", "\nconst ", "\nlet ", "\nvar ", "\n\n",
                "\n", " ", "",
            ],
            SplitPolicy::Java | SplitPolicy::CSharp => &[
                "\nclass ", "\npublic ", "\nprotected ", "\nprivate ", "\nstatic ", "\n\n", "\n",
                " ", "",
            ],
            SplitPolicy::Kotlin => &[
                "\nclass ", "\nobject ", "\nfun ", "\nval ", "\nvar ", "\n\n", "\n", " ", "",
            ],
            SplitPolicy::Go => &[
                "\nfunc ", "\ntype ", "\nvar ", "\nconst ", "\n\n", "\n", " ", "",
            ],
            SplitPolicy::C => &[
                "\nstatic ", "\nvoid ", "\nint ", "\nstruct ", "\nclass ", "\n\n", "\n", " ", "",
            ],
            SplitPolicy::Swift => &[
                "\nclass ", "\nstruct ", "\nfunc ", "\nenum ", "\n\n", "\n", " ", "",
            ],
            SplitPolicy::Php => &["\nfunction ", "\nclass ", "\n\n", "\n", " ", ""],
            SplitPolicy::Ruby => &[
                "\nclass ", "\nmodule ", "\ndef ", "\n\n", "\n", " ", "",
            ],
            SplitPolicy::Html => &[
                "<body", "<div", "<section", "<p", "<h1", "<h2", "\n\n", "\n", " ", "",
            ],
            SplitPolicy::Markdown => &[
                "\n# ", "\n## ", "\n### ", "\n#### ", "\n##### ", "\n###### ", "```\n", "\n\n",
                "\n", " ", "",
            ],
            SplitPolicy::Generic => &["\n\n", "\n", ". ", " ", ""],
        }
    }
}

/// Split a document into chunk texts. Pure function of the document, its
/// policy, and the size/overlap parameters. Empty or whitespace-only input
/// yields an empty output.
pub fn split_document(doc: &Document, spec: &ChunkSpec) -> Vec<String> {
    let policy = SplitPolicy::for_document(doc);
    split_text(&doc.content, policy, spec.chunk_size, spec.chunk_overlap)
}

pub fn split_text(
    text: &str,
    policy: SplitPolicy,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let pieces = split_recursive(text, policy.separators(), chunk_size);
    let pieces = apply_overlap(pieces, chunk_overlap);

    pieces
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Recursively split `text` using the first separator present in it, merging
/// adjacent small pieces back together up to `chunk_size`. Pieces that still
/// exceed the budget descend to the next, weaker separator; the empty-string
/// base case splits at character boundaries and never mid-character.
fn split_recursive(text: &str, separators: &[&str], chunk_size: usize) -> Vec<String> {
    let (sep_index, sep) = match separators
        .iter()
        .enumerate()
        .find(|(_, s)| s.is_empty() || text.contains(**s))
    {
        Some((i, s)) => (i, *s),
        None => return hard_split(text, chunk_size),
    };

    if sep.is_empty() {
        return hard_split(text, chunk_size);
    }

    let remaining = &separators[sep_index + 1..];
    let splits = split_keeping(text, sep);

    let mut out = Vec::new();
    let mut buf = String::new();

    for piece in splits {
        if piece.len() > chunk_size {
            if !buf.is_empty() {
                out.push(std::mem::take(&mut buf));
            }
            out.extend(split_recursive(&piece, remaining, chunk_size));
        } else if buf.len() + piece.len() <= chunk_size {
            buf.push_str(&piece);
        } else {
            out.push(std::mem::take(&mut buf));
            buf = piece;
        }
    }
    if !buf.is_empty() {
        out.push(buf);
    }

    out
}

/// Split on `sep`, keeping the separator attached to the start of the
/// following piece so no bytes are lost. A match at position 0 stays fused
/// to the first piece.
fn split_keeping(text: &str, sep: &str) -> Vec<String> {
    let cuts: Vec<usize> = text
        .match_indices(sep)
        .map(|(i, _)| i)
        .filter(|&i| i > 0)
        .collect();

    if cuts.is_empty() {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts {
        pieces.push(text[start..cut].to_string());
        start = cut;
    }
    pieces.push(text[start..].to_string());
    pieces
}

/// Last-resort split into pieces of at most `chunk_size` bytes, cutting only
/// at character boundaries.
fn hard_split(text: &str, chunk_size: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if !current.is_empty() && current.len() + ch.len_utf8() > chunk_size {
            out.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Prepend the tail of each chunk to its successor so `chunk_overlap` bytes
/// (rounded down to a character boundary) are shared across the split.
fn apply_overlap(chunks: Vec<String>, overlap: usize) -> Vec<String> {
    if overlap == 0 || chunks.len() < 2 {
        return chunks;
    }

    let mut out = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            out.push(chunk.clone());
            continue;
        }
        let prev = &chunks[i - 1];
        let tail = overlap_tail(prev, overlap);
        if tail.is_empty() {
            out.push(chunk.clone());
        } else {
            out.push(format!("{}{}", tail, chunk));
        }
    }
    out
}

/// Longest suffix of `text` that fits in `budget` bytes without splitting a
/// character.
fn overlap_tail(text: &str, budget: usize) -> &str {
    if text.len() <= budget {
        return text;
    }
    let start = text
        .char_indices()
        .map(|(i, _)| i)
        .find(|&i| text.len() - i <= budget)
        .unwrap_or(text.len());
    &text[start..]
}
