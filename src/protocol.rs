use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinGame {
        room_id: RoomId,
        user_id: UserId,
        username: String,
    },
    UpdateProfile {
        room_id: RoomId,
        user_id: UserId,
        username: String,
    },
    // Host-only lobby messages
    AddAi {
        room_id: RoomId,
        user_id: UserId,
    },
    KickUser {
        room_id: RoomId,
        user_id: UserId,
        target_user_id: UserId,
    },
    StartGame {
        room_id: RoomId,
        /// Defaults to two turns as storyteller per player
        #[serde(default)]
        rounds_per_user: Option<u32>,
    },
    // Round messages
    RefreshWords {
        room_id: RoomId,
        user_id: UserId,
    },
    SubmitStory {
        room_id: RoomId,
        /// Checked against the current storyteller when present
        #[serde(default)]
        user_id: Option<UserId>,
        card_id: CardId,
        word: WordItem,
    },
    SubmitCard {
        room_id: RoomId,
        user_id: UserId,
        card_id: CardId,
    },
    SubmitVote {
        room_id: RoomId,
        user_id: UserId,
        card_id: CardId,
    },
    NextRound {
        room_id: RoomId,
    },
}

impl ClientMessage {
    pub fn room_id(&self) -> &str {
        match self {
            ClientMessage::JoinGame { room_id, .. }
            | ClientMessage::UpdateProfile { room_id, .. }
            | ClientMessage::AddAi { room_id, .. }
            | ClientMessage::KickUser { room_id, .. }
            | ClientMessage::StartGame { room_id, .. }
            | ClientMessage::RefreshWords { room_id, .. }
            | ClientMessage::SubmitStory { room_id, .. }
            | ClientMessage::SubmitCard { room_id, .. }
            | ClientMessage::SubmitVote { room_id, .. }
            | ClientMessage::NextRound { room_id } => room_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Players in display order (host, humans, automated players)
    UpdateUserList {
        users: Vec<Player>,
    },
    GameStateUpdate {
        room: Room,
        users: Vec<Player>,
    },
    /// Localisable toast; `key` names the message, `params` fills it in
    Notification {
        #[serde(rename = "type")]
        kind: NotificationKind,
        key: String,
        #[serde(default)]
        params: HashMap<String, String>,
    },
    Error {
        message: String,
    },
    Kicked {
        target_id: UserId,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
}

/// Notification keys understood by the client
pub mod notification {
    pub const DISCONNECT_AI: &str = "notification_disconnect_ai";
    pub const USER_RECONNECTED: &str = "notification_user_reconnected";
    pub const AI_ADDED: &str = "notification_ai_added";
    pub const USER_KICKED: &str = "notification_user_kicked";
    pub const HOST_CHANGED: &str = "notification_host_changed";
}

/// A server message addressed to every socket in one room
#[derive(Debug, Clone)]
pub struct RoomBroadcast {
    pub room_id: RoomId,
    pub message: ServerMessage,
}
