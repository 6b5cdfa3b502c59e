use super::{AppState, GameResult, NoOp, Outcome};
use crate::store::{self, keys};
use crate::types::*;
use rand::seq::SliceRandom;

/// Whether the audience phase is complete.
///
/// The count check is authoritative: every audience member must have played
/// their full quota and the submission total must reach
/// `(players - 1) * limit + 1`. The single-card fallback only exists to
/// absorb count drift and is evaluated when the count check is not met, so
/// it can never advance the room ahead of it.
pub fn voting_ready(players: usize, limit: u32, submissions: usize, all_submitted: bool) -> bool {
    let limit = limit as usize;
    let required = players.saturating_sub(1) * limit + 1;
    if submissions >= required {
        all_submitted
    } else {
        limit == 1 && submissions >= players && all_submitted
    }
}

impl AppState {
    /// Storyteller commits the round's card and word
    pub async fn submit_story(
        &self,
        room_id: &str,
        user_id: Option<&str>,
        card_id: &str,
        word: WordItem,
    ) -> GameResult<Outcome> {
        let mut room = self.load_room(room_id).await?;
        if room.phase != Some(Phase::StorytellerChoosing) {
            return Ok(Outcome::Ignored(NoOp::WrongPhase));
        }
        let Some(storyteller_id) = room.storyteller_id.clone() else {
            return Ok(Outcome::Ignored(NoOp::NotStoryteller));
        };
        if user_id.is_some_and(|id| id != storyteller_id) {
            return Ok(Outcome::Ignored(NoOp::NotStoryteller));
        }
        let Some(storyteller) = self.get_player(room_id, &storyteller_id).await? else {
            return Ok(Outcome::Ignored(NoOp::PlayerNotFound));
        };
        if !storyteller.has_card(card_id) {
            return Ok(Outcome::Ignored(NoOp::CardUnavailable));
        }

        let submission = Submission {
            user_id: storyteller_id.clone(),
            card_id: card_id.to_string(),
            card_src: self.catalog.card_url(card_id),
            username: storyteller.username.clone(),
            is_storyteller: true,
        };
        store::hash_set_json(
            self.store.as_ref(),
            &keys::submissions(room_id),
            card_id,
            &submission,
        )
        .await?;

        tracing::info!(
            "Room {} round {}: storyteller {} chose '{}'",
            room_id,
            room.current_round,
            storyteller.username,
            word.text()
        );

        room.selected_word = Some(word);
        room.storyteller_card_id = Some(card_id.to_string());
        room.phase = Some(Phase::AudienceSubmitting);
        self.save_room(&room).await?;

        Ok(Outcome::Applied(()))
    }

    /// An audience member plays a card. Moves the room to voting once every
    /// audience member has played their quota.
    pub async fn submit_card(&self, room_id: &str, user_id: &str, card_id: &str) -> GameResult<Outcome> {
        let mut room = self.load_room(room_id).await?;
        if room.phase != Some(Phase::AudienceSubmitting) {
            return Ok(Outcome::Ignored(NoOp::WrongPhase));
        }
        if room.is_storyteller(user_id) {
            return Ok(Outcome::Ignored(NoOp::IsStoryteller));
        }
        let Some(mut player) = self.get_player(room_id, user_id).await? else {
            return Ok(Outcome::Ignored(NoOp::PlayerNotFound));
        };

        let limit = room.audience_card_limit;
        if player.submitted_count >= limit {
            tracing::debug!(
                "{} already played {}/{} cards, ignoring extra card",
                player.username,
                player.submitted_count,
                limit
            );
            return Ok(Outcome::Ignored(NoOp::LimitReached));
        }

        let submissions_key = keys::submissions(room_id);
        let Some(card) = player.hand.iter().find(|c| c.id == card_id).cloned() else {
            return Ok(Outcome::Ignored(NoOp::CardUnavailable));
        };
        if self.store.hash_exists(&submissions_key, card_id).await? {
            return Ok(Outcome::Ignored(NoOp::CardUnavailable));
        }

        let submission = Submission {
            user_id: user_id.to_string(),
            card_id: card.id.clone(),
            card_src: card.src.clone(),
            username: player.username.clone(),
            is_storyteller: false,
        };
        store::hash_set_json(self.store.as_ref(), &submissions_key, card_id, &submission).await?;

        player.submitted_count += 1;
        player.submitted = player.submitted_count >= limit;
        self.save_player(room_id, &player).await?;

        let players = self.get_players(room_id).await?;
        let submitted_total = self.store.hash_len(&submissions_key).await?;
        let all_submitted = players
            .values()
            .filter(|p| !room.is_storyteller(&p.user_id))
            .all(|p| p.submitted_count >= limit);

        tracing::debug!(
            "Room {} submissions: {} of {} players, limit {}",
            room_id,
            submitted_total,
            players.len(),
            limit
        );

        if voting_ready(players.len(), limit, submitted_total, all_submitted) {
            self.start_voting(&mut room).await?;
        }

        Ok(Outcome::Applied(()))
    }

    async fn start_voting(&self, room: &mut Room) -> GameResult<()> {
        let mut candidates: Vec<Submission> =
            self.get_submissions(&room.id).await?.into_values().collect();
        candidates.shuffle(&mut rand::rng());

        room.phase = Some(Phase::Voting);
        room.voting_candidates = candidates;
        self.save_room(room).await?;
        self.store.delete(&keys::votes(&room.id)).await?;

        tracing::info!(
            "Room {} round {}: voting on {} cards",
            room.id,
            room.current_round,
            room.voting_candidates.len()
        );
        Ok(())
    }
}
