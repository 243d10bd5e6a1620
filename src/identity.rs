//! Content-addressed chunk identity.
//!
//! Ids are derived from the chunk's stable scope key (repo + path, or URL)
//! and a digest of the full content. Re-ingesting identical content under the
//! same scope key yields the same id, so repeated runs upsert instead of
//! duplicating; any edit at the same location changes the id. The full-content
//! digest is deliberate — a content-prefix scheme misses edits past the
//! prefix.

use sha2::{Digest, Sha256};

/// Compute the store upsert key for one chunk.
pub fn chunk_id(scope_key: &str, content: &str) -> String {
    let content_digest = Sha256::digest(content.as_bytes());

    let mut hasher = Sha256::new();
    hasher.update(scope_key.as_bytes());
    hasher.update([0u8]);
    hasher.update(content_digest);
    hex::encode(hasher.finalize())
}
