// Retrieval module
// Wraps the embedding client and the vector store behind a single boundary:
// query text in, top-K similar passages out.

pub mod embedding;
pub mod store;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

pub use embedding::EmbeddingClient;
pub use store::PassageStore;

/// A retrieved unit of reference text from the document index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub content: String,
}

impl Passage {
    #[inline]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// SHA-256 over the concatenated passage contents, as lowercase hex.
///
/// Identity for dedup and cache-keying of a passage set. Distinct sets
/// hashing identically are treated as identical; an accepted approximation.
pub fn fingerprint(passages: &[Passage]) -> String {
    let mut hasher = Sha256::new();
    for passage in passages {
        hasher.update(passage.content.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Similarity-search boundary: a query string in, an ordered list of up to
/// `limit` passages out.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<Passage>>;
}

/// Production retriever: embeds the query via the Ollama client, then runs a
/// vector search against the LanceDB passage store.
pub struct VectorRetriever {
    embedder: EmbeddingClient,
    store: PassageStore,
}

impl VectorRetriever {
    #[inline]
    pub fn new(embedder: EmbeddingClient, store: PassageStore) -> Self {
        Self { embedder, store }
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<Passage>> {
        debug!("Retrieving up to {} passages", limit);

        // The embedding client is blocking HTTP; keep it off the async runtime.
        let embedder = self.embedder.clone();
        let text = query.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.generate_embedding(&text))
            .await
            .context("Embedding task panicked")?
            .context("Failed to embed query")?;

        let results = self
            .store
            .search(&vector, limit)
            .await
            .context("Vector search failed")?;

        Ok(results
            .into_iter()
            .map(|result| Passage::new(result.content))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_same_contents() {
        let a = vec![Passage::new("alpha"), Passage::new("beta")];
        let b = vec![Passage::new("alpha"), Passage::new("beta")];
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_differs_for_different_contents() {
        let a = vec![Passage::new("alpha")];
        let b = vec![Passage::new("beta")];
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_of_empty_set_is_well_defined() {
        assert_eq!(fingerprint(&[]).len(), 64);
    }
}
