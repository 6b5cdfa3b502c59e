use super::{AppState, GameError, GameResult, NoOp, Outcome};
use crate::store::keys;
use crate::types::*;
use rand::seq::SliceRandom;
use std::collections::HashMap;

/// Rounds each player gets as storyteller when the client does not say
pub const DEFAULT_ROUNDS_PER_USER: u32 = 2;

/// Audience cards per player: two in a three-player game, otherwise one
pub fn audience_card_limit(players: usize) -> u32 {
    if players == 3 {
        2
    } else {
        1
    }
}

fn shuffled<T>(mut items: Vec<T>) -> Vec<T> {
    items.shuffle(&mut rand::rng());
    items
}

/// The player after `current` in sorted id order, wrapping around
fn next_storyteller(mut user_ids: Vec<UserId>, current: Option<&str>) -> Option<UserId> {
    user_ids.sort();
    let next = current
        .and_then(|id| user_ids.iter().position(|u| u == id))
        .map(|idx| (idx + 1) % user_ids.len())
        .unwrap_or(0);
    user_ids.into_iter().nth(next)
}

impl AppState {
    /// Pop up to `count` cards off the room's deck
    async fn draw_cards(&self, room_id: &str, count: usize, is_new: bool) -> GameResult<Vec<Card>> {
        let deck_key = keys::deck(room_id);
        let mut cards = Vec::with_capacity(count);
        for _ in 0..count {
            let Some(id) = self.store.list_pop(&deck_key).await? else {
                break;
            };
            cards.push(Card {
                src: self.catalog.card_url(&id),
                id,
                is_new,
            });
        }
        Ok(cards)
    }

    fn draw_word_candidates(&self) -> Vec<WordItem> {
        self.words.draw_candidates(&mut rand::rng())
    }

    /// Deal hands and open round one
    pub async fn start_game(&self, room_id: &str, rounds_per_user: u32) -> GameResult<Outcome> {
        let mut room = self.load_room(room_id).await?;
        if room.status != RoomStatus::Waiting {
            return Ok(Outcome::Ignored(NoOp::AlreadyPlaying));
        }
        if self.catalog.is_empty() {
            return Err(GameError::EmptyCatalog);
        }

        let players = self.get_players(room_id).await?;
        if players.is_empty() {
            return Ok(Outcome::Ignored(NoOp::NoPlayers));
        }

        let deck_key = keys::deck(room_id);
        self.store.delete(&deck_key).await?;
        self.store
            .list_push(&deck_key, shuffled(self.catalog.cards().to_vec()))
            .await?;

        let order = shuffled(players.keys().cloned().collect::<Vec<_>>());
        let mut players = players;
        for user_id in &order {
            let Some(mut player) = players.remove(user_id) else {
                continue;
            };
            player.hand = self.draw_cards(room_id, HAND_SIZE, false).await?;
            player.score = 0;
            player.last_gained_score = 0;
            player.last_score_reason = None;
            player.reset_round_flags();
            self.save_player(room_id, &player).await?;
        }

        let rounds_per_user = rounds_per_user.max(1);
        room.status = RoomStatus::Playing;
        room.phase = Some(Phase::StorytellerChoosing);
        room.current_round = 1;
        room.total_rounds = order.len() as u32 * rounds_per_user;
        room.storyteller_id = order.first().cloned();
        room.word_candidates = self.draw_word_candidates();
        room.selected_word = None;
        room.storyteller_card_id = None;
        room.audience_card_limit = audience_card_limit(order.len());
        room.reroll_count = REROLLS_PER_ROUND;
        room.voting_candidates.clear();
        room.round_results.clear();
        self.save_room(&room).await?;

        self.store.delete(&keys::submissions(room_id)).await?;
        self.store.delete(&keys::votes(room_id)).await?;

        tracing::info!(
            "Room {} started: {} players, {} rounds, {} card(s) per audience member",
            room_id,
            order.len(),
            room.total_rounds,
            room.audience_card_limit
        );
        Ok(Outcome::Applied(()))
    }

    /// Leave the result screen: open the next round, or end the game after the last one
    pub async fn next_round(&self, room_id: &str) -> GameResult<Outcome> {
        let mut room = self.load_room(room_id).await?;
        if !room.is_playing() {
            return Ok(Outcome::Ignored(NoOp::NotPlaying));
        }
        if room.phase != Some(Phase::Result) {
            return Ok(Outcome::Ignored(NoOp::WrongPhase));
        }

        if room.current_round >= room.total_rounds {
            room.phase = Some(Phase::GameOver);
            self.save_room(&room).await?;
            tracing::info!("Room {} finished after {} rounds", room_id, room.current_round);
            return Ok(Outcome::Applied(()));
        }

        let players = self.get_players(room_id).await?;
        let submissions = self.get_submissions(room_id).await?;

        let mut used: HashMap<&str, Vec<&str>> = HashMap::new();
        for (card_id, submission) in &submissions {
            used.entry(submission.user_id.as_str())
                .or_default()
                .push(card_id.as_str());
        }

        room.current_round += 1;
        room.storyteller_id = next_storyteller(
            players.keys().cloned().collect(),
            room.storyteller_id.as_deref(),
        );

        // Sorted so deck order maps to players deterministically
        let mut players: Vec<Player> = players.into_values().collect();
        players.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        for mut player in players {
            let spent = used.get(player.user_id.as_str());
            player
                .hand
                .retain(|card| !spent.is_some_and(|ids| ids.contains(&card.id.as_str())));
            for card in &mut player.hand {
                card.is_new = false;
            }
            let missing = HAND_SIZE.saturating_sub(player.hand.len());
            let fresh = self.draw_cards(room_id, missing, true).await?;
            player.hand.extend(fresh);
            player.reset_round_flags();
            self.save_player(room_id, &player).await?;
        }

        room.phase = Some(Phase::StorytellerChoosing);
        room.selected_word = None;
        room.storyteller_card_id = None;
        room.word_candidates = self.draw_word_candidates();
        room.reroll_count = REROLLS_PER_ROUND;
        room.voting_candidates.clear();
        self.save_room(&room).await?;

        self.store.delete(&keys::submissions(room_id)).await?;
        self.store.delete(&keys::votes(room_id)).await?;

        tracing::info!(
            "Room {} round {}/{}: storyteller {:?}",
            room_id,
            room.current_round,
            room.total_rounds,
            room.storyteller_id
        );
        Ok(Outcome::Applied(()))
    }

    /// Storyteller asks for a fresh set of word candidates
    pub async fn reroll_words(&self, room_id: &str, user_id: &str) -> GameResult<Outcome> {
        let mut room = self.load_room(room_id).await?;
        if room.phase != Some(Phase::StorytellerChoosing) {
            return Ok(Outcome::Ignored(NoOp::WrongPhase));
        }
        if !room.is_storyteller(user_id) {
            return Ok(Outcome::Ignored(NoOp::NotStoryteller));
        }
        if room.reroll_count == 0 {
            return Ok(Outcome::Ignored(NoOp::NoRerollsLeft));
        }

        room.word_candidates = self.draw_word_candidates();
        room.reroll_count -= 1;
        self.save_room(&room).await?;
        Ok(Outcome::Applied(()))
    }
}
