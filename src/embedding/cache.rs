use super::{card_key, EmbeddingError, EmbeddingProvider, EmbeddingResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// On-disk layout of the exported vector cache
#[derive(Debug, Default, Deserialize)]
struct CacheFile {
    #[serde(default)]
    words: HashMap<String, Vec<f32>>,
    #[serde(default)]
    cards: HashMap<String, Vec<f32>>,
}

/// Embeddings held in memory, loaded once at startup
#[derive(Debug, Default)]
pub struct StaticEmbeddings {
    words: HashMap<String, Vec<f32>>,
    cards: HashMap<String, Vec<f32>>,
    ready: bool,
}

impl StaticEmbeddings {
    /// A provider with no vectors; every lookup misses
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn new(words: HashMap<String, Vec<f32>>, cards: HashMap<String, Vec<f32>>) -> Self {
        let cards = cards
            .into_iter()
            .map(|(id, vec)| (card_key(&id).to_string(), vec))
            .collect();
        Self {
            words,
            cards,
            ready: true,
        }
    }

    pub fn from_json_file(path: &Path) -> EmbeddingResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| EmbeddingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: CacheFile =
            serde_json::from_str(&raw).map_err(|source| EmbeddingError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        check_dimensions(file.words.iter().chain(file.cards.iter()))?;
        Ok(Self::new(file.words, file.cards))
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }
}

fn check_dimensions<'a>(
    entries: impl Iterator<Item = (&'a String, &'a Vec<f32>)>,
) -> EmbeddingResult<()> {
    let mut expected = None;
    for (key, vec) in entries {
        match expected {
            None => expected = Some(vec.len()),
            Some(len) if len != vec.len() => {
                return Err(EmbeddingError::Dimension {
                    key: key.clone(),
                    expected: len,
                    found: vec.len(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

impl EmbeddingProvider for StaticEmbeddings {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn word_vector(&self, text: &str) -> Option<&[f32]> {
        self.words.get(text).map(Vec::as_slice)
    }

    fn card_vector(&self, card_id: &str) -> Option<&[f32]> {
        self.cards.get(card_key(card_id)).map(Vec::as_slice)
    }
}
