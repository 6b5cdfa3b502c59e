//! WebSocket message dispatch
//!
//! Every inbound message maps onto one `AppState` operation. Operations that
//! change the room are followed by a game state broadcast and an automated
//! player pass; ignored operations change nothing and send nothing.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{AppState, GameError, GameResult, Outcome};
use std::sync::Arc;

use super::{lobby, round};

/// Shown to the room when a game cannot start for lack of cards
pub const EMPTY_CATALOG_MESSAGE: &str = "The card list is missing or empty.";
pub const GAME_IN_PROGRESS_MESSAGE: &str = "The game in this room has already started.";

/// Handle client messages and return optional response
pub async fn handle_message(msg: ClientMessage, state: &Arc<AppState>) -> Option<ServerMessage> {
    let room_id = msg.room_id().to_string();

    let result = match msg {
        // Lobby messages
        ClientMessage::JoinGame {
            room_id,
            user_id,
            username,
        } => lobby::handle_join(state, &room_id, &user_id, &username).await,

        ClientMessage::UpdateProfile {
            room_id,
            user_id,
            username,
        } => lobby::handle_update_profile(state, &room_id, &user_id, &username).await,

        ClientMessage::AddAi { room_id, user_id } => {
            lobby::handle_add_ai(state, &room_id, &user_id).await
        }

        ClientMessage::KickUser {
            room_id,
            user_id,
            target_user_id,
        } => lobby::handle_kick(state, &room_id, &user_id, &target_user_id).await,

        // Round messages
        ClientMessage::StartGame {
            room_id,
            rounds_per_user,
        } => round::handle_start_game(state, &room_id, rounds_per_user).await,

        ClientMessage::RefreshWords { room_id, user_id } => {
            round::handle_refresh_words(state, &room_id, &user_id).await
        }

        ClientMessage::SubmitStory {
            room_id,
            user_id,
            card_id,
            word,
        } => round::handle_submit_story(state, &room_id, user_id.as_deref(), &card_id, word).await,

        ClientMessage::SubmitCard {
            room_id,
            user_id,
            card_id,
        } => round::handle_submit_card(state, &room_id, &user_id, &card_id).await,

        ClientMessage::SubmitVote {
            room_id,
            user_id,
            card_id,
        } => round::handle_submit_vote(state, &room_id, &user_id, &card_id).await,

        ClientMessage::NextRound { room_id } => round::handle_next_round(state, &room_id).await,
    };

    match result {
        Ok(reply) => reply,
        Err(GameError::EmptyCatalog) => {
            tracing::warn!("Room {} cannot start: no cards", room_id);
            state.emit(
                &room_id,
                ServerMessage::Error {
                    message: EMPTY_CATALOG_MESSAGE.to_string(),
                },
            );
            None
        }
        Err(e) => {
            tracing::error!("Room {}: {}", room_id, e);
            Some(ServerMessage::Error {
                message: e.to_string(),
            })
        }
    }
}

/// A socket that had joined a room went away
pub async fn handle_disconnect(state: &Arc<AppState>, room_id: &str, user_id: &str) {
    if let Err(e) = lobby::handle_disconnect(state, room_id, user_id).await {
        tracing::error!("Disconnect of {} from room {} failed: {}", user_id, room_id, e);
    }
}

/// Broadcast and schedule automated players after an applied change
pub(super) async fn publish_if_applied<T>(
    state: &Arc<AppState>,
    room_id: &str,
    action: &str,
    outcome: Outcome<T>,
) -> GameResult<Option<ServerMessage>> {
    match outcome {
        Outcome::Applied(_) => state.publish_change(room_id).await?,
        Outcome::Ignored(reason) => {
            tracing::debug!("{} in room {} ignored: {:?}", action, room_id, reason)
        }
    }
    Ok(None)
}
