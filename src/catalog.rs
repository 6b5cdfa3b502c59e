//! Card catalog: the ids available for a room's deck and where their images live.

use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Path prefix used when cards are served by this server
pub const LOCAL_CARD_ROUTE: &str = "/static/cards";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read card list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse card list {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// JSON array of card file names
    pub card_list_file: PathBuf,
    /// Directory scanned when the list file is missing
    pub static_cards_path: PathBuf,
    /// Base URL of externally hosted images
    pub external_image_url: Option<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            card_list_file: PathBuf::from("card_list.json"),
            static_cards_path: PathBuf::from("static/cards"),
            external_image_url: None,
        }
    }
}

impl CatalogConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let non_empty = |name: &str| {
            std::env::var(name).ok().and_then(|v| {
                let trimmed = v.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
        };

        Self {
            card_list_file: non_empty("CARD_LIST_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.card_list_file),
            static_cards_path: non_empty("STATIC_CARDS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_cards_path),
            external_image_url: non_empty("EXTERNAL_IMAGE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
        }
    }
}

/// Ordered list of card ids plus the id -> image URL mapping
#[derive(Debug, Clone, Default)]
pub struct CardCatalog {
    cards: Vec<String>,
    external_image_url: Option<String>,
}

impl CardCatalog {
    pub fn new(cards: Vec<String>, external_image_url: Option<String>) -> Self {
        Self {
            cards,
            external_image_url,
        }
    }

    /// Load from the card list file, falling back to scanning the image directory.
    /// A catalog with neither source is empty, not an error: starting a game
    /// reports it to the room instead.
    pub fn load(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let cards = if config.card_list_file.exists() {
            read_card_list(&config.card_list_file)?
        } else if config.static_cards_path.is_dir() {
            scan_image_dir(&config.static_cards_path)?
        } else {
            tracing::warn!(
                "No card list at {} and no image directory at {}",
                config.card_list_file.display(),
                config.static_cards_path.display()
            );
            Vec::new()
        };

        Ok(Self::new(cards, config.external_image_url.clone()))
    }

    pub fn cards(&self) -> &[String] {
        &self.cards
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn card_url(&self, card_id: &str) -> String {
        match &self.external_image_url {
            Some(base) => format!("{}/{}", base, card_id),
            None => format!("{}/{}", LOCAL_CARD_ROUTE, card_id),
        }
    }
}

fn read_card_list(path: &Path) -> Result<Vec<String>, CatalogError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CatalogError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn scan_image_dir(dir: &Path) -> Result<Vec<String>, CatalogError> {
    let io_err = |source| CatalogError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut cards = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let name = entry.map_err(io_err)?.file_name().to_string_lossy().to_string();
        let is_image = Path::new(&name)
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                IMAGE_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false);
        if is_image {
            cards.push(name);
        }
    }
    cards.sort();
    Ok(cards)
}
