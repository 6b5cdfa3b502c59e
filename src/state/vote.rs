use super::{AppState, GameResult, NoOp, Outcome};
use crate::scoring::{self, RoundScore};
use crate::store::keys;
use crate::types::*;
use std::collections::HashMap;

impl AppState {
    /// Record a vote; the last expected vote scores the round
    pub async fn submit_vote(&self, room_id: &str, voter_id: &str, card_id: &str) -> GameResult<Outcome> {
        let room = self.load_room(room_id).await?;
        if room.phase != Some(Phase::Voting) {
            return Ok(Outcome::Ignored(NoOp::WrongPhase));
        }
        if room.is_storyteller(voter_id) {
            return Ok(Outcome::Ignored(NoOp::IsStoryteller));
        }
        let Some(mut voter) = self.get_player(room_id, voter_id).await? else {
            return Ok(Outcome::Ignored(NoOp::PlayerNotFound));
        };

        let votes_key = keys::votes(room_id);
        if voter.voted || self.store.hash_exists(&votes_key, voter_id).await? {
            return Ok(Outcome::Ignored(NoOp::AlreadyVoted));
        }
        let Some(candidate) = room.voting_candidates.iter().find(|c| c.card_id == card_id) else {
            return Ok(Outcome::Ignored(NoOp::NotACandidate));
        };
        if candidate.user_id == voter_id {
            return Ok(Outcome::Ignored(NoOp::OwnCard));
        }

        self.store
            .hash_set(&votes_key, voter_id, card_id.to_string())
            .await?;
        voter.voted = true;
        self.save_player(room_id, &voter).await?;

        let players = self.store.hash_len(&keys::users(room_id)).await?;
        let votes = self.store.hash_len(&votes_key).await?;
        tracing::debug!("Room {} votes: {}/{}", room_id, votes, players.saturating_sub(1));

        if votes >= players.saturating_sub(1) {
            if let Outcome::Ignored(reason) = self.calculate_round_result(room_id).await? {
                tracing::debug!("Round result not computed: {:?}", reason);
            }
        }

        Ok(Outcome::Applied(()))
    }

    /// Score the round and move to the result screen.
    ///
    /// A room already showing results is left alone, so two final votes
    /// landing together score the round once.
    pub async fn calculate_round_result(&self, room_id: &str) -> GameResult<Outcome<RoundScore>> {
        let mut room = self.load_room(room_id).await?;
        match room.phase {
            Some(Phase::Voting) => {}
            Some(Phase::Result) => return Ok(Outcome::Ignored(NoOp::AlreadyScored)),
            _ => return Ok(Outcome::Ignored(NoOp::WrongPhase)),
        }

        // Claim the round before the slower scoring work
        room.phase = Some(Phase::Result);
        self.save_room(&room).await?;

        let storyteller_id = room.storyteller_id.clone().unwrap_or_default();
        let target_card_id = room.storyteller_card_id.clone().unwrap_or_default();

        let votes = self.get_votes(room_id).await?;
        let mut submissions: Vec<Submission> =
            self.get_submissions(room_id).await?.into_values().collect();
        // Results follow the order cards were shown in
        submissions.sort_by_key(|s| {
            room.voting_candidates
                .iter()
                .position(|c| c.card_id == s.card_id)
                .unwrap_or(usize::MAX)
        });

        let players = self.get_players(room_id).await?;
        let usernames: HashMap<UserId, String> = players
            .iter()
            .map(|(id, p)| (id.clone(), p.username.clone()))
            .collect();

        let score = scoring::compute_round(
            &storyteller_id,
            &target_card_id,
            &votes,
            &submissions,
            &usernames,
        );

        for (user_id, mut player) in players {
            let gained = score.delta(&user_id);
            player.score += gained;
            player.last_gained_score = gained;
            player.last_score_reason = Some(score.reason(&user_id).to_string());
            self.save_player(room_id, &player).await?;
        }

        room.round_results = score.results.clone();
        self.save_room(&room).await?;

        tracing::info!(
            "Room {} round {} scored: storyteller {} {:+}",
            room_id,
            room.current_round,
            storyteller_id,
            score.delta(&storyteller_id)
        );
        Ok(Outcome::Applied(score))
    }
}
