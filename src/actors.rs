//! Automated players.
//!
//! After every state change one pass runs for the affected room. A pass looks
//! at the current phase, lets each automated player that still has something
//! to do take its turn, and feeds the result back through the same
//! `AppState` operations human input goes through.
//!
//! Turns are delayed to feel human. Before acting after a delay the pass
//! compares the room against the [`StalenessToken`] it captured on start and
//! abandons all remaining work if the round or phase has moved on.

use crate::decision::{DecisionEngine, WordVerdict};
use crate::state::{AppState, GameResult};
use crate::types::*;
use crate::words::WordPool;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ActorConfig {
    /// Wait before a pass reads the room, so the triggering write lands first
    pub settle: Duration,
    /// Seconds an automated player "thinks" before playing a card
    pub submit_delay: RangeInclusive<f64>,
    /// Seconds an automated player "thinks" before voting
    pub vote_delay: RangeInclusive<f64>,
    /// Analyses of the storyteller's word candidates before picking at random
    pub max_word_rerolls: u32,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(500),
            submit_delay: 2.0..=4.0,
            vote_delay: 3.0..=6.0,
            max_word_rerolls: 3,
        }
    }
}

impl ActorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let settle = std::env::var("AI_SETTLE_MS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.settle);

        let max_word_rerolls = std::env::var("AI_MAX_WORD_REROLLS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.max_word_rerolls);

        Self {
            settle,
            submit_delay: delay_range_from_env(
                "AI_SUBMIT_DELAY_MIN",
                "AI_SUBMIT_DELAY_MAX",
                &defaults.submit_delay,
            ),
            vote_delay: delay_range_from_env(
                "AI_VOTE_DELAY_MIN",
                "AI_VOTE_DELAY_MAX",
                &defaults.vote_delay,
            ),
            max_word_rerolls,
        }
    }

    /// No waiting at all; used by tests and local tooling
    pub fn immediate() -> Self {
        Self {
            settle: Duration::ZERO,
            submit_delay: 0.0..=0.0,
            vote_delay: 0.0..=0.0,
            max_word_rerolls: 3,
        }
    }
}

fn env_secs(name: &str) -> Option<f64> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
}

fn delay_range_from_env(min: &str, max: &str, default: &RangeInclusive<f64>) -> RangeInclusive<f64> {
    let lo = env_secs(min).unwrap_or(*default.start());
    let hi = env_secs(max).unwrap_or(*default.end());
    if lo <= hi {
        lo..=hi
    } else {
        hi..=lo
    }
}

fn pick_delay<R: Rng + ?Sized>(range: &RangeInclusive<f64>, rng: &mut R) -> Duration {
    let (lo, hi) = (range.start().max(0.0), range.end().max(0.0));
    let secs = if hi > lo { rng.random_range(lo..=hi) } else { lo };
    Duration::from_secs_f64(secs)
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// `(phase, round)` of the room when a pass started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessToken {
    pub phase: Option<Phase>,
    pub round: u32,
}

impl StalenessToken {
    pub fn capture(room: &Room) -> Self {
        Self {
            phase: room.phase,
            round: room.current_round,
        }
    }

    pub fn matches(&self, room: &Room) -> bool {
        room.phase == self.phase && room.current_round == self.round
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Nothing for automated players to do
    Idle,
    /// At least one automated action was attempted
    Completed,
    /// The room moved on mid-pass; remaining work was dropped
    Stale,
}

/// Word chosen by an automated storyteller
#[derive(Debug, Clone, PartialEq)]
pub struct WordChoice {
    pub word: Option<WordItem>,
    /// Candidate sets analysed
    pub attempts: u32,
    /// No analysis produced a usable word
    pub fell_back: bool,
}

/// Bounded reroll loop for the storyteller's word.
///
/// Each attempt analyses the current candidate set; a reroll verdict draws a
/// fresh set from `words`. Once `max_attempts` analyses have asked for a
/// reroll, a word is taken at random from the set in hand. The drawn sets
/// are scratch work and are never written back to the room.
pub fn choose_word<R: Rng + ?Sized>(
    decisions: &DecisionEngine,
    words: &WordPool,
    card_id: &str,
    candidates: Vec<WordItem>,
    max_attempts: u32,
    rng: &mut R,
) -> WordChoice {
    let mut candidates = candidates;
    for attempt in 1..=max_attempts {
        match decisions.analyze_storyteller_candidates(card_id, &candidates, rng) {
            WordVerdict::Chosen(word) => {
                return WordChoice {
                    word: Some(word),
                    attempts: attempt,
                    fell_back: false,
                }
            }
            WordVerdict::Reroll => {
                tracing::debug!(
                    "Storyteller rerolling candidates ({}/{})",
                    attempt,
                    max_attempts
                );
                candidates = words.draw_candidates(rng);
            }
        }
    }

    tracing::warn!(
        "No usable word after {} attempts, picking at random",
        max_attempts
    );
    WordChoice {
        word: candidates.choose(rng).cloned(),
        attempts: max_attempts,
        fell_back: true,
    }
}

/// Rooms with a pass in flight.
///
/// At most one pass runs per room. A trigger that arrives while one is
/// running only flags the room, and the running task goes round again once
/// it finishes, so automated turns never overlap.
#[derive(Debug, Default)]
pub struct PassRegistry {
    /// Room id -> another pass was requested while this one ran
    rooms: Mutex<HashMap<RoomId, bool>>,
}

impl PassRegistry {
    fn rooms(&self) -> MutexGuard<'_, HashMap<RoomId, bool>> {
        self.rooms.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `true` when the caller owns the room's pass and must run it;
    /// `false` when a running pass was asked to go again instead
    pub fn begin(&self, room_id: &str) -> bool {
        let mut rooms = self.rooms();
        match rooms.get_mut(room_id) {
            Some(rerun) => {
                *rerun = true;
                false
            }
            None => {
                rooms.insert(room_id.to_string(), false);
                true
            }
        }
    }

    /// `true` when a rerun was requested meanwhile (and is now consumed);
    /// otherwise the room is released
    pub fn finish(&self, room_id: &str) -> bool {
        let mut rooms = self.rooms();
        let rerun = rooms.get(room_id).copied().unwrap_or(false);
        if rerun {
            rooms.insert(room_id.to_string(), false);
        } else {
            rooms.remove(room_id);
        }
        rerun
    }

    pub fn is_running(&self, room_id: &str) -> bool {
        self.rooms().contains_key(room_id)
    }
}

/// Run a pass for `room_id` in the background, or ask the one already
/// running to go again
pub fn spawn_pass(state: Arc<AppState>, room_id: RoomId) {
    if !state.passes.begin(&room_id) {
        tracing::debug!("Automated pass for room {} already running, rerun queued", room_id);
        return;
    }

    tokio::spawn(async move {
        let mut rng = StdRng::from_os_rng();
        loop {
            match run_pass(&state, &room_id, &mut rng).await {
                Ok(outcome) => {
                    tracing::debug!("Automated pass for room {}: {:?}", room_id, outcome)
                }
                Err(e) => tracing::error!("Automated pass for room {} failed: {}", room_id, e),
            }
            if !state.passes.finish(&room_id) {
                break;
            }
        }
    });
}

pub async fn run_pass<R: Rng + Send>(
    state: &Arc<AppState>,
    room_id: &str,
    rng: &mut R,
) -> GameResult<PassOutcome> {
    pause(state.actor_config.settle).await;

    let Some(room) = state.get_room(room_id).await? else {
        return Ok(PassOutcome::Idle);
    };
    if !room.is_playing() {
        return Ok(PassOutcome::Idle);
    }

    let token = StalenessToken::capture(&room);
    let players = state.get_players(room_id).await?;

    match room.phase {
        Some(Phase::StorytellerChoosing) => storyteller_turn(state, &room, &players, rng).await,
        Some(Phase::AudienceSubmitting) => audience_turn(state, &room, &players, token, rng).await,
        Some(Phase::Voting) => voting_turn(state, &room, &players, token, rng).await,
        _ => Ok(PassOutcome::Idle),
    }
}

/// Automated, non-storyteller players sorted by id
fn automated_audience<'a>(
    room: &Room,
    players: &'a HashMap<UserId, Player>,
    needs_turn: impl Fn(&Player) -> bool,
) -> Vec<&'a Player> {
    let mut actors: Vec<&Player> = players
        .values()
        .filter(|p| p.is_ai && !room.is_storyteller(&p.user_id) && needs_turn(p))
        .collect();
    actors.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    actors
}

/// Reload the room after a delay; `None` when the pass should stop
async fn still_current(
    state: &AppState,
    room_id: &str,
    token: StalenessToken,
) -> GameResult<Option<Room>> {
    let Some(room) = state.get_room(room_id).await? else {
        return Ok(None);
    };
    if !token.matches(&room) {
        tracing::warn!(
            "Room {} moved on ({:?}/{} -> {:?}/{}), dropping automated turns",
            room_id,
            token.phase,
            token.round,
            room.phase,
            room.current_round
        );
        return Ok(None);
    }
    Ok(Some(room))
}

async fn storyteller_turn<R: Rng + Send>(
    state: &Arc<AppState>,
    room: &Room,
    players: &HashMap<UserId, Player>,
    rng: &mut R,
) -> GameResult<PassOutcome> {
    let Some(storyteller) = room.storyteller_id.as_ref().and_then(|id| players.get(id)) else {
        return Ok(PassOutcome::Idle);
    };
    if !storyteller.is_ai {
        return Ok(PassOutcome::Idle);
    }

    // Card is random for variety; only the word is chosen with care
    let Some(card) = storyteller.hand.choose(rng) else {
        tracing::warn!("Automated storyteller {} has an empty hand", storyteller.username);
        return Ok(PassOutcome::Idle);
    };

    let choice = choose_word(
        &state.decisions,
        &state.words,
        &card.id,
        room.word_candidates.clone(),
        state.actor_config.max_word_rerolls,
        rng,
    );
    let Some(word) = choice.word else {
        tracing::warn!("Room {} has no word candidates for the storyteller", room.id);
        return Ok(PassOutcome::Idle);
    };

    let outcome = state
        .submit_story(&room.id, Some(&storyteller.user_id), &card.id, word)
        .await?;
    if outcome.is_applied() {
        state.publish_change(&room.id).await?;
    } else {
        tracing::debug!("Automated story ignored: {:?}", outcome);
    }
    Ok(PassOutcome::Completed)
}

async fn audience_turn<R: Rng + Send>(
    state: &Arc<AppState>,
    room: &Room,
    players: &HashMap<UserId, Player>,
    token: StalenessToken,
    rng: &mut R,
) -> GameResult<PassOutcome> {
    let Some(word) = room.selected_word.as_ref() else {
        return Ok(PassOutcome::Idle);
    };
    let limit = room.audience_card_limit;
    let actors: Vec<UserId> = automated_audience(room, players, |p| p.submitted_count < limit)
        .into_iter()
        .map(|p| p.user_id.clone())
        .collect();
    if actors.is_empty() {
        return Ok(PassOutcome::Idle);
    }

    for actor_id in actors {
        let Some(player) = state.get_player(&room.id, &actor_id).await? else {
            continue;
        };
        // Cards already on the table are not in play any more
        let played: HashSet<CardId> = state
            .get_submissions(&room.id)
            .await?
            .into_values()
            .filter(|s| s.user_id == actor_id)
            .map(|s| s.card_id)
            .collect();
        let mut scratch: Vec<Card> = player
            .hand
            .iter()
            .filter(|c| !played.contains(&c.id))
            .cloned()
            .collect();
        let mut remaining = limit.saturating_sub(player.submitted_count);

        while remaining > 0 && !scratch.is_empty() {
            pause(pick_delay(&state.actor_config.submit_delay, rng)).await;
            if still_current(state, &room.id, token).await?.is_none() {
                return Ok(PassOutcome::Stale);
            }
            // A human may have reclaimed this seat during the delay
            match state.get_player(&room.id, &actor_id).await? {
                Some(p) if p.is_ai => {}
                _ => break,
            }

            let index = match state
                .decisions
                .best_card(word.text(), &scratch, rng)
                .and_then(|id| scratch.iter().position(|c| c.id == id))
            {
                Some(index) => index,
                None => {
                    tracing::warn!(
                        "No best card for '{}', {} plays at random",
                        word.text(),
                        player.username
                    );
                    rng.random_range(0..scratch.len())
                }
            };
            let card = scratch.remove(index);

            let outcome = state.submit_card(&room.id, &actor_id, &card.id).await?;
            if !outcome.is_applied() {
                tracing::debug!("Automated card from {} ignored: {:?}", player.username, outcome);
                break;
            }
            tracing::debug!("{} played {} for '{}'", player.username, card.id, word.text());
            remaining -= 1;
            state.publish_change(&room.id).await?;

            let phase = state.get_room(&room.id).await?.and_then(|r| r.phase);
            if phase != Some(Phase::AudienceSubmitting) {
                return Ok(PassOutcome::Completed);
            }
        }
    }

    Ok(PassOutcome::Completed)
}

async fn voting_turn<R: Rng + Send>(
    state: &Arc<AppState>,
    room: &Room,
    players: &HashMap<UserId, Player>,
    token: StalenessToken,
    rng: &mut R,
) -> GameResult<PassOutcome> {
    let actors: Vec<UserId> = automated_audience(room, players, |p| !p.voted)
        .into_iter()
        .map(|p| p.user_id.clone())
        .collect();
    if actors.is_empty() {
        return Ok(PassOutcome::Idle);
    }

    for actor_id in actors {
        pause(pick_delay(&state.actor_config.vote_delay, rng)).await;
        let Some(current) = still_current(state, &room.id, token).await? else {
            return Ok(PassOutcome::Stale);
        };
        let Some(player) = state.get_player(&room.id, &actor_id).await? else {
            continue;
        };
        if player.voted || !player.is_ai {
            continue;
        }
        let Some(word) = current.selected_word.as_ref() else {
            return Ok(PassOutcome::Idle);
        };

        // Every card this player put on the table is left out
        let candidates: Vec<Submission> = current
            .voting_candidates
            .iter()
            .filter(|c| c.user_id != actor_id)
            .cloned()
            .collect();

        let Some(card_id) = state
            .decisions
            .best_vote(word.text(), &candidates, None, rng)
        else {
            tracing::warn!("{} has nothing to vote for", player.username);
            continue;
        };

        let outcome = state.submit_vote(&room.id, &actor_id, &card_id).await?;
        if !outcome.is_applied() {
            tracing::debug!("Automated vote from {} ignored: {:?}", player.username, outcome);
            continue;
        }
        tracing::debug!("{} voted for {}", player.username, card_id);
        state.publish_change(&room.id).await?;

        let phase = state.get_room(&room.id).await?.and_then(|r| r.phase);
        if phase != Some(Phase::Voting) {
            return Ok(PassOutcome::Completed);
        }
    }

    Ok(PassOutcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingProvider;
    use crate::state::fixtures;
    use crate::store::keys;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Every card points one way, every word another: all candidates are too weak
    struct CountingEmbeddings {
        card: Vec<f32>,
        word: Vec<f32>,
        card_lookups: AtomicUsize,
    }

    impl CountingEmbeddings {
        fn orthogonal() -> Self {
            Self {
                card: vec![1.0, 0.0],
                word: vec![0.0, 1.0],
                card_lookups: AtomicUsize::new(0),
            }
        }
    }

    impl EmbeddingProvider for CountingEmbeddings {
        fn is_ready(&self) -> bool {
            true
        }

        fn word_vector(&self, _text: &str) -> Option<&[f32]> {
            Some(&self.word)
        }

        fn card_vector(&self, _card_id: &str) -> Option<&[f32]> {
            self.card_lookups.fetch_add(1, Ordering::SeqCst);
            Some(&self.card)
        }
    }

    #[test]
    fn test_reroll_loop_gives_up_after_three_attempts() {
        let provider = Arc::new(CountingEmbeddings::orthogonal());
        let decisions = DecisionEngine::new(provider.clone());
        let words = WordPool::default();
        let mut rng = StdRng::seed_from_u64(7);
        let candidates = words.draw_candidates(&mut rng);

        let choice = choose_word(&decisions, &words, "1.png", candidates, 3, &mut rng);

        assert_eq!(choice.attempts, 3);
        assert!(choice.fell_back);
        assert_eq!(provider.card_lookups.load(Ordering::SeqCst), 3);
        let word = choice.word.unwrap();
        assert!(words.words().contains(&word));
    }

    #[test]
    fn test_word_chosen_on_first_attempt_without_embeddings() {
        let decisions = DecisionEngine::new(Arc::new(
            crate::embedding::StaticEmbeddings::unavailable(),
        ));
        let words = WordPool::default();
        let mut rng = StdRng::seed_from_u64(1);
        let candidates = words.draw_candidates(&mut rng);

        let choice = choose_word(&decisions, &words, "1.png", candidates.clone(), 3, &mut rng);
        assert_eq!(choice.attempts, 1);
        assert!(!choice.fell_back);
        assert!(candidates.contains(&choice.word.unwrap()));
    }

    #[test]
    fn test_staleness_token() {
        let mut room = Room::new("1".to_string(), "r".to_string());
        room.phase = Some(Phase::AudienceSubmitting);
        room.current_round = 2;
        let token = StalenessToken::capture(&room);
        assert!(token.matches(&room));

        room.phase = Some(Phase::Voting);
        assert!(!token.matches(&room));

        room.phase = Some(Phase::AudienceSubmitting);
        room.current_round = 3;
        assert!(!token.matches(&room));
    }

    #[test]
    fn test_pass_registry_queues_reruns() {
        let passes = PassRegistry::default();

        assert!(passes.begin("1000"));
        assert!(passes.is_running("1000"));
        // Triggers while running only queue one more round
        assert!(!passes.begin("1000"));
        assert!(!passes.begin("1000"));
        // Other rooms are independent
        assert!(passes.begin("2000"));

        assert!(passes.finish("1000"));
        assert!(passes.is_running("1000"));
        assert!(!passes.finish("1000"));
        assert!(!passes.is_running("1000"));

        assert!(passes.begin("1000"));
    }

    #[test]
    fn test_pick_delay_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let d = pick_delay(&(2.0..=4.0), &mut rng);
            assert!(d >= Duration::from_secs(2) && d <= Duration::from_secs(4));
        }
        assert_eq!(pick_delay(&(0.0..=0.0), &mut rng), Duration::ZERO);
    }

    #[test]
    #[serial_test::serial]
    fn test_config_from_env() {
        std::env::set_var("AI_SETTLE_MS", "20");
        std::env::set_var("AI_SUBMIT_DELAY_MIN", "5");
        std::env::set_var("AI_SUBMIT_DELAY_MAX", "1");
        std::env::set_var("AI_VOTE_DELAY_MIN", "nope");
        std::env::set_var("AI_MAX_WORD_REROLLS", "5");

        let config = ActorConfig::from_env();
        assert_eq!(config.settle, Duration::from_millis(20));
        assert_eq!(config.submit_delay, 1.0..=5.0);
        assert_eq!(config.vote_delay, 3.0..=6.0);
        assert_eq!(config.max_word_rerolls, 5);

        for name in [
            "AI_SETTLE_MS",
            "AI_SUBMIT_DELAY_MIN",
            "AI_SUBMIT_DELAY_MAX",
            "AI_VOTE_DELAY_MIN",
            "AI_MAX_WORD_REROLLS",
        ] {
            std::env::remove_var(name);
        }
        assert_eq!(ActorConfig::from_env(), ActorConfig::default());
    }

    async fn make_automated(state: &AppState, room_id: &str, user_id: &str) {
        let mut player = fixtures::player(state, room_id, user_id).await;
        player.is_ai = true;
        state.save_player(room_id, &player).await.unwrap();
    }

    async fn snapshot(state: &AppState, room_id: &str) -> Vec<String> {
        let mut dump = vec![state
            .store
            .get_value(&keys::room(room_id))
            .await
            .unwrap()
            .unwrap_or_default()];
        for key in [keys::users(room_id), keys::submissions(room_id), keys::votes(room_id)] {
            let mut entries: Vec<_> = state.store.hash_get_all(&key).await.unwrap().into_iter().collect();
            entries.sort();
            dump.push(format!("{:?}", entries));
        }
        dump
    }

    #[tokio::test]
    async fn test_stale_pass_makes_no_changes() {
        let config = ActorConfig {
            submit_delay: 0.3..=0.3,
            ..ActorConfig::immediate()
        };
        let state = Arc::new(fixtures::state_with_cards(40).with_actor_config(config));
        let room_id = fixtures::started(&state, &["alice", "bob", "carol", "dave"]).await;
        let (storyteller, _) = fixtures::tell_story(&state, &room_id).await;
        for user in ["alice", "bob", "carol", "dave"] {
            if user != storyteller {
                make_automated(&state, &room_id, user).await;
            }
        }

        let pass = {
            let state = state.clone();
            let room_id = room_id.clone();
            tokio::spawn(async move {
                let mut rng = StdRng::seed_from_u64(11);
                run_pass(&state, &room_id, &mut rng).await
            })
        };

        // Move the room on while the first automated player is thinking
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut room = fixtures::room(&state, &room_id).await;
        room.current_round += 1;
        state.save_room(&room).await.unwrap();
        let before = snapshot(&state, &room_id).await;

        let outcome = pass.await.unwrap().unwrap();
        assert_eq!(outcome, PassOutcome::Stale);
        assert_eq!(snapshot(&state, &room_id).await, before);
    }

    #[tokio::test]
    async fn test_human_turns_leave_pass_idle() {
        let state = Arc::new(fixtures::state_with_cards(40));
        let room_id = fixtures::started(&state, &["alice", "bob", "carol"]).await;
        let mut rng = StdRng::seed_from_u64(5);

        let outcome = run_pass(&state, &room_id, &mut rng).await.unwrap();
        assert_eq!(outcome, PassOutcome::Idle);
        assert_eq!(
            fixtures::room(&state, &room_id).await.phase,
            Some(Phase::StorytellerChoosing)
        );
    }

    #[tokio::test]
    async fn test_automated_storyteller_tells_story() {
        let state = Arc::new(fixtures::state_with_cards(40));
        let room_id = fixtures::started(&state, &["alice", "bob", "carol"]).await;
        let storyteller = fixtures::room(&state, &room_id)
            .await
            .storyteller_id
            .unwrap();
        make_automated(&state, &room_id, &storyteller).await;

        let mut rng = StdRng::seed_from_u64(9);
        let outcome = run_pass(&state, &room_id, &mut rng).await.unwrap();
        assert_eq!(outcome, PassOutcome::Completed);

        let room = fixtures::room(&state, &room_id).await;
        assert_eq!(room.phase, Some(Phase::AudienceSubmitting));
        let card = room.storyteller_card_id.unwrap();
        assert!(fixtures::player(&state, &room_id, &storyteller).await.has_card(&card));
        assert!(room.selected_word.is_some());
    }

    #[tokio::test]
    async fn test_all_automated_round_reaches_result() {
        let state = Arc::new(fixtures::state_with_cards(60));
        let users = ["alice", "bob", "carol", "dave"];
        let room_id = fixtures::started(&state, &users).await;
        for user in users {
            make_automated(&state, &room_id, user).await;
        }

        state.publish_change(&room_id).await.unwrap();

        let mut phase = None;
        for _ in 0..400 {
            phase = fixtures::room(&state, &room_id).await.phase;
            if phase == Some(Phase::Result) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(phase, Some(Phase::Result));

        let room = fixtures::room(&state, &room_id).await;
        assert_eq!(room.round_results.len(), users.len());
        let players = state.get_players(&room_id).await.unwrap();
        let voted = players.values().filter(|p| p.voted).count();
        assert_eq!(voted, users.len() - 1);
        let total: i32 = players.values().map(|p| p.score).sum();
        assert!(total > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_automated_turns_never_overlap() {
        for run in 0..50 {
            let state = Arc::new(fixtures::state_with_cards(60));
            let users = ["alice", "bob", "carol"];
            let room_id = fixtures::started(&state, &users).await;
            for user in users {
                make_automated(&state, &room_id, user).await;
            }

            state.publish_change(&room_id).await.unwrap();

            let mut room = fixtures::room(&state, &room_id).await;
            for _ in 0..1000 {
                room = fixtures::room(&state, &room_id).await;
                if room.phase == Some(Phase::Result) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            assert_eq!(room.phase, Some(Phase::Result), "run {}", run);

            // Two cards from each of the two audience members plus the story
            assert_eq!(room.audience_card_limit, 2);
            assert_eq!(room.voting_candidates.len(), 5, "run {}", run);
            assert_eq!(state.get_submissions(&room_id).await.unwrap().len(), 5);
            for p in state.get_players(&room_id).await.unwrap().values() {
                if !room.is_storyteller(&p.user_id) {
                    assert_eq!(p.submitted_count, 2, "run {} {}", run, p.user_id);
                }
            }

            for _ in 0..1000 {
                if !state.passes.is_running(&room_id) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            assert!(!state.passes.is_running(&room_id), "run {}", run);
        }
    }
}
