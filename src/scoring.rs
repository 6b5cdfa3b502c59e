//! Round scoring. Pure: callers load votes and submissions and apply the result.

use crate::types::{CardId, RoundResult, Submission, UserId};
use std::collections::{BTreeMap, HashMap};

/// Storyteller points when some but not all voters found the card
pub const STORYTELLER_SUCCESS: i32 = 3;
/// Points for a correct vote in a mixed round
pub const CORRECT_VOTE: i32 = 3;
/// Flat points every voter gets when the round is all-correct or all-wrong
pub const FLAT_VOTER_BONUS: i32 = 2;

/// Reason shown to players who gained nothing this round
pub const NO_REASON: &str = "-";

pub mod reason {
    pub const ALL_CORRECT: &str = "score_all_correct";
    pub const ALL_FAIL: &str = "score_all_fail";
    pub const SUCCESS: &str = "score_success";
    pub const CORRECT_BONUS: &str = "score_correct_bonus";
    pub const FAIL_BONUS: &str = "score_fail_bonus";
    pub const CORRECT: &str = "score_correct";
    pub const FAIL: &str = "score_fail";

    pub fn trick(votes: usize, bonus: i32) -> String {
        format!("score_trick:{}:{}", votes, bonus)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundScore {
    /// Points gained per player; players absent here gained 0
    pub deltas: HashMap<UserId, i32>,
    /// Localisation key explaining each delta
    pub reasons: HashMap<UserId, String>,
    /// Every submission with the names of the players who voted for it
    pub results: Vec<RoundResult>,
}

impl RoundScore {
    pub fn delta(&self, user_id: &str) -> i32 {
        self.deltas.get(user_id).copied().unwrap_or(0)
    }

    pub fn reason(&self, user_id: &str) -> &str {
        self.reasons
            .get(user_id)
            .map(String::as_str)
            .unwrap_or(NO_REASON)
    }
}

/// Score one round.
///
/// `votes` maps voter id to the card they picked, `usernames` maps user id to
/// display name for the result list. Votes for cards nobody submitted count
/// towards the outcome but earn no trick bonus.
pub fn compute_round(
    storyteller_id: &str,
    target_card_id: &str,
    votes: &HashMap<UserId, CardId>,
    submissions: &[Submission],
    usernames: &HashMap<UserId, String>,
) -> RoundScore {
    // Sorted views keep reason strings and voter lists stable
    let votes: BTreeMap<&str, &str> = votes
        .iter()
        .map(|(voter, card)| (voter.as_str(), card.as_str()))
        .collect();

    let mut votes_per_card: BTreeMap<&str, usize> = BTreeMap::new();
    for card in votes.values() {
        *votes_per_card.entry(*card).or_default() += 1;
    }

    let correct = votes.values().filter(|card| **card == target_card_id).count();
    let mut score = RoundScore::default();

    let award = |score: &mut RoundScore, user: &str, points: i32, why: &str| {
        score.deltas.insert(user.to_string(), points);
        score.reasons.insert(user.to_string(), why.to_string());
    };

    if correct == votes.len() {
        award(&mut score, storyteller_id, 0, reason::ALL_CORRECT);
        for voter in votes.keys() {
            award(&mut score, *voter, FLAT_VOTER_BONUS, reason::CORRECT_BONUS);
        }
    } else if correct == 0 {
        award(&mut score, storyteller_id, 0, reason::ALL_FAIL);
        for voter in votes.keys() {
            award(&mut score, *voter, FLAT_VOTER_BONUS, reason::FAIL_BONUS);
        }
    } else {
        award(&mut score, storyteller_id, STORYTELLER_SUCCESS, reason::SUCCESS);
        for (voter, card) in &votes {
            if *card == target_card_id {
                award(&mut score, *voter, CORRECT_VOTE, reason::CORRECT);
            } else {
                award(&mut score, *voter, 0, reason::FAIL);
            }
        }
    }

    let owners: HashMap<&str, &str> = submissions
        .iter()
        .map(|s| (s.card_id.as_str(), s.user_id.as_str()))
        .collect();

    for (card, count) in &votes_per_card {
        if *card == target_card_id {
            continue;
        }
        let Some(owner) = owners.get(card).copied() else {
            continue;
        };
        if owner == storyteller_id {
            continue;
        }

        let bonus = *count as i32;
        *score.deltas.entry(owner.to_string()).or_insert(0) += bonus;

        let trick = reason::trick(*count, bonus);
        let combined = match score.reasons.get(owner).map(String::as_str) {
            None | Some(reason::FAIL) => trick,
            Some(existing) => format!("{}|{}", existing, trick),
        };
        score.reasons.insert(owner.to_string(), combined);
    }

    score.results = submissions
        .iter()
        .map(|submission| RoundResult {
            submission: submission.clone(),
            voters: votes
                .iter()
                .filter(|(_, card)| **card == submission.card_id)
                .map(|(voter, _)| {
                    usernames
                        .get(*voter)
                        .cloned()
                        .unwrap_or_else(|| voter.to_string())
                })
                .collect(),
        })
        .collect();

    score
}
