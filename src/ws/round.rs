//! Round message handlers

use super::handlers::publish_if_applied;
use crate::protocol::ServerMessage;
use crate::state::{AppState, GameResult, DEFAULT_ROUNDS_PER_USER};
use crate::types::WordItem;
use std::sync::Arc;

pub async fn handle_start_game(
    state: &Arc<AppState>,
    room_id: &str,
    rounds_per_user: Option<u32>,
) -> GameResult<Option<ServerMessage>> {
    let rounds = rounds_per_user.unwrap_or(DEFAULT_ROUNDS_PER_USER);
    let outcome = state.start_game(room_id, rounds).await?;
    publish_if_applied(state, room_id, "Start game", outcome).await
}

pub async fn handle_refresh_words(
    state: &Arc<AppState>,
    room_id: &str,
    user_id: &str,
) -> GameResult<Option<ServerMessage>> {
    let outcome = state.reroll_words(room_id, user_id).await?;
    publish_if_applied(state, room_id, "Word reroll", outcome).await
}

pub async fn handle_submit_story(
    state: &Arc<AppState>,
    room_id: &str,
    user_id: Option<&str>,
    card_id: &str,
    word: WordItem,
) -> GameResult<Option<ServerMessage>> {
    let outcome = state.submit_story(room_id, user_id, card_id, word).await?;
    publish_if_applied(state, room_id, "Story", outcome).await
}

pub async fn handle_submit_card(
    state: &Arc<AppState>,
    room_id: &str,
    user_id: &str,
    card_id: &str,
) -> GameResult<Option<ServerMessage>> {
    let outcome = state.submit_card(room_id, user_id, card_id).await?;
    publish_if_applied(state, room_id, "Card", outcome).await
}

pub async fn handle_submit_vote(
    state: &Arc<AppState>,
    room_id: &str,
    user_id: &str,
    card_id: &str,
) -> GameResult<Option<ServerMessage>> {
    let outcome = state.submit_vote(room_id, user_id, card_id).await?;
    publish_if_applied(state, room_id, "Vote", outcome).await
}

pub async fn handle_next_round(state: &Arc<AppState>, room_id: &str) -> GameResult<Option<ServerMessage>> {
    let outcome = state.next_round(room_id).await?;
    publish_if_applied(state, room_id, "Next round", outcome).await
}
