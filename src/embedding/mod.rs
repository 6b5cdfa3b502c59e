//! Precomputed word and card embeddings.
//!
//! Vectors are produced offline; the game server only ever looks them up.
//! Every consumer must cope with a provider that is not ready or with a
//! lookup that comes back empty.

mod cache;

pub use cache::StaticEmbeddings;

use std::path::PathBuf;
use std::sync::Arc;

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("failed to read embedding cache {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse embedding cache {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("embedding cache has inconsistent dimensions (expected {expected}, found {found} for '{key}')")]
    Dimension {
        key: String,
        expected: usize,
        found: usize,
    },
}

/// Lookup interface over precomputed vectors
pub trait EmbeddingProvider: Send + Sync {
    /// False when no vectors are loaded at all
    fn is_ready(&self) -> bool;

    fn word_vector(&self, text: &str) -> Option<&[f32]>;

    /// Card ids are looked up by [`card_key`], so `12.png` and `12.webp` share a vector
    fn card_vector(&self, card_id: &str) -> Option<&[f32]>;
}

/// Strip a trailing file extension from a card id (`deck/12.webp` -> `deck/12`)
pub fn card_key(card_id: &str) -> &str {
    let name_start = card_id.rfind('/').map(|i| i + 1).unwrap_or(0);
    match card_id[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &card_id[..name_start + dot],
        _ => card_id,
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmbeddingConfig {
    /// JSON file with `{"words": {...}, "cards": {...}}`
    pub cache_file: Option<PathBuf>,
}

impl EmbeddingConfig {
    pub fn from_env() -> Self {
        let cache_file = std::env::var("EMBEDDING_CACHE_FILE").ok().and_then(|path| {
            let trimmed = path.trim();
            (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
        });
        Self { cache_file }
    }

    /// Load the configured provider, degrading to an empty (not ready) one on failure
    pub fn build_provider(&self) -> Arc<dyn EmbeddingProvider> {
        let Some(path) = &self.cache_file else {
            tracing::warn!("EMBEDDING_CACHE_FILE not set, automated players will choose at random");
            return Arc::new(StaticEmbeddings::unavailable());
        };

        match StaticEmbeddings::from_json_file(path) {
            Ok(cache) => {
                tracing::info!(
                    "Loaded embeddings: {} words, {} cards",
                    cache.word_count(),
                    cache.card_count()
                );
                Arc::new(cache)
            }
            Err(e) => {
                tracing::warn!("{}. Automated players will choose at random.", e);
                Arc::new(StaticEmbeddings::unavailable())
            }
        }
    }
}
