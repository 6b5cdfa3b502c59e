//! Room state machine.
//!
//! Every state-changing operation on a room lives in an `impl AppState` block
//! in one of the submodules. Operations read the current record from the
//! shared store, validate, and write back. There is no lock around the
//! read-validate-write sequence; the guards inside each operation are what
//! keep duplicate or stale calls harmless.

mod game;
mod room;
mod submission;
mod vote;

pub use game::{audience_card_limit, DEFAULT_ROUNDS_PER_USER};
pub use room::{Disconnect, Joined};
pub use submission::voting_ready;

use crate::actors::{self, ActorConfig, PassRegistry};
use crate::catalog::CardCatalog;
use crate::decision::DecisionEngine;
use crate::embedding::{EmbeddingProvider, StaticEmbeddings};
use crate::protocol::{NotificationKind, RoomBroadcast, ServerMessage};
use crate::store::{self, keys, MemoryStore, SharedStateStore, StoreError};
use crate::types::*;
use crate::words::WordPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// How long a player who dropped out of the lobby keeps their seat
pub const LOBBY_RECONNECT_GRACE: Duration = Duration::from_secs(3);

pub type GameResult<T> = Result<T, GameError>;

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("no cards available to build a deck")]
    EmptyCatalog,

    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why an operation left the room untouched.
///
/// Callers treat these as "try again later", never as failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOp {
    NotPlaying,
    AlreadyPlaying,
    NoPlayers,
    WrongPhase,
    NotStoryteller,
    IsStoryteller,
    PlayerNotFound,
    CardUnavailable,
    LimitReached,
    NotACandidate,
    OwnCard,
    AlreadyVoted,
    AlreadyScored,
    NotHost,
    RoomFull,
    NoRerollsLeft,
    Reconnected,
}

#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T = ()> {
    Applied(T),
    Ignored(NoOp),
}

impl<T> Outcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Outcome::Applied(value) => Some(value),
            Outcome::Ignored(_) => None,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SharedStateStore>,
    pub decisions: DecisionEngine,
    pub catalog: Arc<CardCatalog>,
    pub words: Arc<WordPool>,
    pub actor_config: ActorConfig,
    pub lobby_grace: Duration,
    /// Every outbound message, tagged with its room
    pub broadcast: broadcast::Sender<RoomBroadcast>,
    pub passes: Arc<PassRegistry>,
}

impl AppState {
    pub fn new(store: Arc<dyn SharedStateStore>) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            store,
            decisions: DecisionEngine::new(Arc::new(StaticEmbeddings::unavailable())),
            catalog: Arc::new(CardCatalog::default()),
            words: Arc::new(WordPool::default()),
            actor_config: ActorConfig::default(),
            lobby_grace: LOBBY_RECONNECT_GRACE,
            broadcast: tx,
            passes: Arc::new(PassRegistry::default()),
        }
    }

    pub fn with_embeddings(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.decisions = DecisionEngine::new(provider);
        self
    }

    pub fn with_catalog(mut self, catalog: CardCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn with_words(mut self, words: WordPool) -> Self {
        self.words = Arc::new(words);
        self
    }

    pub fn with_actor_config(mut self, config: ActorConfig) -> Self {
        self.actor_config = config;
        self
    }

    pub fn with_lobby_grace(mut self, grace: Duration) -> Self {
        self.lobby_grace = grace;
        self
    }

    fn store(&self) -> &dyn SharedStateStore {
        self.store.as_ref()
    }

    pub async fn get_room(&self, room_id: &str) -> GameResult<Option<Room>> {
        Ok(store::get_json(self.store(), &keys::room(room_id)).await?)
    }

    pub(crate) async fn load_room(&self, room_id: &str) -> GameResult<Room> {
        self.get_room(room_id)
            .await?
            .ok_or_else(|| GameError::RoomNotFound(room_id.to_string()))
    }

    pub(crate) async fn save_room(&self, room: &Room) -> GameResult<()> {
        Ok(store::set_json(self.store(), &keys::room(&room.id), room).await?)
    }

    pub async fn get_player(&self, room_id: &str, user_id: &str) -> GameResult<Option<Player>> {
        Ok(store::hash_get_json(self.store(), &keys::users(room_id), user_id).await?)
    }

    pub(crate) async fn save_player(&self, room_id: &str, player: &Player) -> GameResult<()> {
        Ok(
            store::hash_set_json(self.store(), &keys::users(room_id), &player.user_id, player)
                .await?,
        )
    }

    pub async fn get_players(&self, room_id: &str) -> GameResult<HashMap<UserId, Player>> {
        Ok(store::hash_get_all_json(self.store(), &keys::users(room_id)).await?)
    }

    pub async fn get_submissions(&self, room_id: &str) -> GameResult<HashMap<CardId, Submission>> {
        Ok(store::hash_get_all_json(self.store(), &keys::submissions(room_id)).await?)
    }

    /// Voter id -> voted card id
    pub async fn get_votes(&self, room_id: &str) -> GameResult<HashMap<UserId, CardId>> {
        Ok(self.store.hash_get_all(&keys::votes(room_id)).await?)
    }

    /// Players in display order
    pub async fn user_list(&self, room_id: &str) -> GameResult<Vec<Player>> {
        let host_id = self.get_room(room_id).await?.and_then(|r| r.host_id);
        let mut players: Vec<Player> = self.get_players(room_id).await?.into_values().collect();
        sort_for_display(&mut players, host_id.as_deref());
        Ok(players)
    }

    /// Send a message to everyone in a room
    pub fn emit(&self, room_id: &str, message: ServerMessage) {
        // No subscribers is fine
        let _ = self.broadcast.send(RoomBroadcast {
            room_id: room_id.to_string(),
            message,
        });
    }

    pub fn notify(&self, room_id: &str, kind: NotificationKind, key: &str, name: Option<&str>) {
        let mut params = HashMap::new();
        if let Some(name) = name {
            params.insert("name".to_string(), name.to_string());
        }
        self.emit(
            room_id,
            ServerMessage::Notification {
                kind,
                key: key.to_string(),
                params,
            },
        );
    }

    pub async fn emit_user_list(&self, room_id: &str) -> GameResult<()> {
        let users = self.user_list(room_id).await?;
        self.emit(room_id, ServerMessage::UpdateUserList { users });
        Ok(())
    }

    pub async fn emit_game_state(&self, room_id: &str) -> GameResult<()> {
        let Some(room) = self.get_room(room_id).await? else {
            return Ok(());
        };
        let users = self.user_list(room_id).await?;
        self.emit(room_id, ServerMessage::GameStateUpdate { room, users });
        Ok(())
    }

    /// Announce a state change: broadcast the new room state and schedule
    /// an automated-actor pass for the room. While a pass is running this
    /// only queues another round of it.
    pub async fn publish_change(self: &Arc<Self>, room_id: &str) -> GameResult<()> {
        self.emit_game_state(room_id).await?;
        actors::spawn_pass(self.clone(), room_id.to_string());
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }
}

/// Host first, then humans, then automated players; earlier joiners first
pub fn sort_for_display(players: &mut [Player], host_id: Option<&str>) {
    let rank = |p: &Player| {
        if Some(p.user_id.as_str()) == host_id {
            0
        } else if !p.is_ai {
            1
        } else {
            2
        }
    };
    players.sort_by(|a, b| {
        rank(a)
            .cmp(&rank(b))
            .then(a.joined_at.total_cmp(&b.joined_at))
    });
}
