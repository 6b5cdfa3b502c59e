//! Lobby message handlers
//!
//! Joining, renaming, seating automated players, kicking, and dropping out.

use crate::protocol::{notification, NotificationKind, ServerMessage};
use crate::state::{AppState, Disconnect, GameResult, Outcome};
use std::sync::Arc;

use super::handlers::GAME_IN_PROGRESS_MESSAGE;

pub async fn handle_join(
    state: &Arc<AppState>,
    room_id: &str,
    user_id: &str,
    username: &str,
) -> GameResult<Option<ServerMessage>> {
    let joined = match state.join(room_id, user_id, username).await? {
        Outcome::Applied(joined) => joined,
        Outcome::Ignored(reason) => {
            tracing::debug!("Join of {} to room {} refused: {:?}", user_id, room_id, reason);
            return Ok(Some(ServerMessage::Error {
                message: GAME_IN_PROGRESS_MESSAGE.to_string(),
            }));
        }
    };

    if joined.reconnected_from_ai {
        state.notify(
            room_id,
            NotificationKind::Success,
            notification::USER_RECONNECTED,
            Some(&joined.player.username),
        );
    }

    state.emit_user_list(room_id).await?;
    state.publish_change(room_id).await?;
    Ok(None)
}

pub async fn handle_update_profile(
    state: &Arc<AppState>,
    room_id: &str,
    user_id: &str,
    username: &str,
) -> GameResult<Option<ServerMessage>> {
    if state.update_profile(room_id, user_id, username).await?.is_applied() {
        state.emit_user_list(room_id).await?;
    }
    Ok(None)
}

pub async fn handle_add_ai(
    state: &Arc<AppState>,
    room_id: &str,
    requester_id: &str,
) -> GameResult<Option<ServerMessage>> {
    match state.add_ai(room_id, requester_id).await? {
        Outcome::Applied(player) => {
            state.notify(
                room_id,
                NotificationKind::Success,
                notification::AI_ADDED,
                Some(player.base_name()),
            );
            state.emit_user_list(room_id).await?;
            state.emit_game_state(room_id).await?;
        }
        Outcome::Ignored(reason) => {
            tracing::debug!("Add AI in room {} ignored: {:?}", room_id, reason);
        }
    }
    Ok(None)
}

pub async fn handle_kick(
    state: &Arc<AppState>,
    room_id: &str,
    requester_id: &str,
    target_id: &str,
) -> GameResult<Option<ServerMessage>> {
    match state.kick(room_id, requester_id, target_id).await? {
        Outcome::Applied(target) => {
            state.notify(
                room_id,
                NotificationKind::Warning,
                notification::USER_KICKED,
                Some(&target.username),
            );
            state.emit(
                room_id,
                ServerMessage::Kicked {
                    target_id: target.user_id,
                },
            );
            state.emit_user_list(room_id).await?;
            state.publish_change(room_id).await?;
        }
        Outcome::Ignored(reason) => {
            tracing::debug!("Kick in room {} ignored: {:?}", room_id, reason);
        }
    }
    Ok(None)
}

/// Mid-game an automated player takes the seat at once. In the lobby the
/// seat is held for the grace period and only then given up.
pub async fn handle_disconnect(state: &Arc<AppState>, room_id: &str, user_id: &str) -> GameResult<()> {
    let disconnect = match state.disconnect(room_id, user_id).await? {
        Outcome::Applied(disconnect) => disconnect,
        Outcome::Ignored(reason) => {
            tracing::debug!("Disconnect of {} ignored: {:?}", user_id, reason);
            return Ok(());
        }
    };

    match disconnect {
        Disconnect::ConvertedToAi(player) => {
            state.notify(
                room_id,
                NotificationKind::Warning,
                notification::DISCONNECT_AI,
                Some(&player.username),
            );
            state.emit_user_list(room_id).await?;
            state.publish_change(room_id).await?;
        }
        Disconnect::Pending => {
            tokio::time::sleep(state.lobby_grace).await;

            let new_host = match state.remove_if_disconnected(room_id, user_id).await? {
                Outcome::Applied(new_host) => new_host,
                Outcome::Ignored(_) => return Ok(()),
            };
            state.emit_user_list(room_id).await?;
            if new_host.is_some() {
                state.notify(room_id, NotificationKind::Info, notification::HOST_CHANGED, None);
            }
            state.publish_change(room_id).await?;
        }
    }
    Ok(())
}
