use serde::{Deserialize, Deserializer, Serialize};

/// Opaque ID types for readability
pub type RoomId = String;
pub type UserId = String;
pub type CardId = String;

/// Cards dealt into every hand
pub const HAND_SIZE: usize = 7;
/// Size of a freshly drawn word candidate set
pub const WORD_CANDIDATES: usize = 10;
/// Word rerolls granted to the storyteller each round
pub const REROLLS_PER_ROUND: u32 = 10;
/// Room capacity (humans and automated actors together)
pub const MAX_PLAYERS: usize = 6;
/// Suffix appended to the display name of automated actors
pub const AI_NAME_SUFFIX: &str = " (AI)";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    #[default]
    Waiting,
    Playing,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    StorytellerChoosing,
    AudienceSubmitting,
    Voting,
    Result,
    GameOver,
}

/// A word as stored in the word list: either plain text or a localized pair.
///
/// Every comparison and embedding lookup goes through [`WordItem::text`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum WordItem {
    Plain(String),
    Localized {
        #[serde(rename = "ko")]
        primary: String,
        #[serde(rename = "en")]
        secondary: String,
    },
}

impl WordItem {
    /// Canonical text used for lookups and comparisons
    pub fn text(&self) -> &str {
        match self {
            WordItem::Plain(text) => text,
            WordItem::Localized { primary, .. } => primary,
        }
    }
}

impl From<&str> for WordItem {
    fn from(text: &str) -> Self {
        WordItem::Plain(text.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Card {
    pub id: CardId,
    pub src: String,
    #[serde(default)]
    pub is_new: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    pub user_id: UserId,
    pub card_id: CardId,
    pub card_src: String,
    pub username: String,
    pub is_storyteller: bool,
}

/// A submission as shown on the result screen, with the names of its voters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundResult {
    #[serde(flatten)]
    pub submission: Submission,
    pub voters: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    #[serde(default)]
    pub status: RoomStatus,
    /// Only meaningful while playing
    #[serde(default)]
    pub phase: Option<Phase>,
    #[serde(default)]
    pub host_id: Option<UserId>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub current_round: u32,
    #[serde(default)]
    pub total_rounds: u32,
    #[serde(default)]
    pub storyteller_id: Option<UserId>,
    #[serde(default)]
    pub word_candidates: Vec<WordItem>,
    #[serde(default)]
    pub selected_word: Option<WordItem>,
    #[serde(default)]
    pub storyteller_card_id: Option<CardId>,
    #[serde(default = "default_card_limit")]
    pub audience_card_limit: u32,
    #[serde(default)]
    pub reroll_count: u32,
    #[serde(default)]
    pub voting_candidates: Vec<Submission>,
    #[serde(default)]
    pub round_results: Vec<RoundResult>,
}

fn default_card_limit() -> u32 {
    1
}

impl Room {
    pub fn new(id: RoomId, name: String) -> Self {
        Self {
            id,
            name,
            status: RoomStatus::Waiting,
            phase: None,
            host_id: None,
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            current_round: 0,
            total_rounds: 0,
            storyteller_id: None,
            word_candidates: Vec::new(),
            selected_word: None,
            storyteller_card_id: None,
            audience_card_limit: 1,
            reroll_count: 0,
            voting_candidates: Vec::new(),
            round_results: Vec::new(),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.status == RoomStatus::Playing
    }

    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_id.as_deref() == Some(user_id)
    }

    pub fn is_storyteller(&self, user_id: &str) -> bool {
        self.storyteller_id.as_deref() == Some(user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub user_id: UserId,
    pub username: String,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub is_ai: bool,
    #[serde(default = "default_true")]
    pub connected: bool,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub hand: Vec<Card>,
    #[serde(default)]
    pub submitted_count: u32,
    #[serde(default)]
    pub submitted: bool,
    #[serde(default)]
    pub voted: bool,
    /// Unix seconds at join time, used for display ordering
    #[serde(default)]
    pub joined_at: f64,
    #[serde(default)]
    pub last_gained_score: i32,
    #[serde(default)]
    pub last_score_reason: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Player {
    pub fn new(user_id: UserId, username: String) -> Self {
        Self {
            user_id,
            username,
            is_ai: false,
            connected: true,
            ready: false,
            score: 0,
            hand: Vec::new(),
            submitted_count: 0,
            submitted: false,
            voted: false,
            joined_at: now_secs(),
            last_gained_score: 0,
            last_score_reason: None,
        }
    }

    pub fn has_card(&self, card_id: &str) -> bool {
        self.hand.iter().any(|c| c.id == card_id)
    }

    /// Display name without the automated-actor suffix
    pub fn base_name(&self) -> &str {
        strip_ai_suffix(&self.username)
    }

    /// Clear per-round flags
    pub fn reset_round_flags(&mut self) {
        self.submitted_count = 0;
        self.submitted = false;
        self.voted = false;
    }
}

pub fn strip_ai_suffix(name: &str) -> &str {
    name.strip_suffix(AI_NAME_SUFFIX).unwrap_or(name)
}

pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Older room records stored `is_ai` as the text "true"/"false"
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => s.trim().eq_ignore_ascii_case("true"),
    })
}
