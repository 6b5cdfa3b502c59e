//! Word pool the storyteller's candidates are drawn from.

use crate::types::{WordItem, WORD_CANDIDATES};
use rand::seq::IndexedRandom;
use rand::Rng;
use std::path::{Path, PathBuf};

/// Small starter list used when no word list file is configured
const STARTER_WORDS: &[(&str, &str)] = &[
    ("바다", "sea"),
    ("꿈", "dream"),
    ("기억", "memory"),
    ("여행", "journey"),
    ("비밀", "secret"),
    ("고독", "solitude"),
    ("시간", "time"),
    ("희망", "hope"),
    ("그림자", "shadow"),
    ("약속", "promise"),
    ("축제", "festival"),
    ("미로", "maze"),
    ("용기", "courage"),
    ("침묵", "silence"),
    ("우주", "universe"),
    ("거울", "mirror"),
];

#[derive(Debug, thiserror::Error)]
pub enum WordListError {
    #[error("failed to read word list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse word list {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("word list {0} is empty")]
    Empty(PathBuf),
}

#[derive(Debug, Clone)]
pub struct WordPool {
    words: Vec<WordItem>,
}

impl Default for WordPool {
    fn default() -> Self {
        Self {
            words: STARTER_WORDS
                .iter()
                .map(|(ko, en)| WordItem::Localized {
                    primary: ko.to_string(),
                    secondary: en.to_string(),
                })
                .collect(),
        }
    }
}

impl WordPool {
    pub fn new(words: Vec<WordItem>) -> Self {
        Self { words }
    }

    /// Load a JSON array of plain strings and/or `{"ko": .., "en": ..}` objects
    pub fn from_json_file(path: &Path) -> Result<Self, WordListError> {
        let raw = std::fs::read_to_string(path).map_err(|source| WordListError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let words: Vec<WordItem> =
            serde_json::from_str(&raw).map_err(|source| WordListError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if words.is_empty() {
            return Err(WordListError::Empty(path.to_path_buf()));
        }
        Ok(Self { words })
    }

    /// Resolve from `WORD_LIST_FILE`, falling back to the starter list
    pub fn from_env() -> Self {
        let Some(path) = std::env::var("WORD_LIST_FILE")
            .ok()
            .filter(|p| !p.trim().is_empty())
        else {
            return Self::default();
        };

        match Self::from_json_file(Path::new(path.trim())) {
            Ok(pool) => {
                tracing::info!("Loaded {} words from {}", pool.len(), path);
                pool
            }
            Err(e) => {
                tracing::warn!("{}. Using the built-in word list.", e);
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[WordItem] {
        &self.words
    }

    /// Draw a fresh candidate set of up to ten distinct words
    pub fn draw_candidates<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<WordItem> {
        self.words
            .choose_multiple(rng, WORD_CANDIDATES.min(self.words.len()))
            .cloned()
            .collect()
    }
}
