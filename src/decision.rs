//! Choice logic for automated players.
//!
//! Everything here is a pure function of the embeddings and the supplied RNG.
//! The `rank_*` functions report why a semantic decision is impossible; the
//! public `best_*`/`analyze_*` functions turn that into a uniform random pick
//! so an automated player always has something to play.

use crate::embedding::EmbeddingProvider;
use crate::types::{Card, CardId, Submission, WordItem};
use rand::seq::IndexedRandom;
use rand::Rng;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Similarity band that makes a clue neither obvious nor unguessable
pub const SWEET_SPOT: RangeInclusive<f32> = 0.40..=0.70;

/// Best candidate below this is too weak to be a fair clue
pub const TOO_WEAK: f32 = 0.35;

/// Best candidate above this gives the card away
pub const TOO_OBVIOUS: f32 = 0.85;

/// Score given to cards without an embedding so they rank last
pub const MISSING_CARD_SCORE: f32 = -1.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecisionUnavailable {
    #[error("embeddings are not loaded")]
    NotReady,

    #[error("no embedding for card '{0}'")]
    MissingCard(String),

    #[error("no embedding for word '{0}'")]
    MissingWord(String),
}

/// Outcome of analysing the storyteller's current word candidates
#[derive(Debug, Clone, PartialEq)]
pub enum WordVerdict {
    Chosen(WordItem),
    /// Every candidate is too weak or too obvious; draw a new set
    Reroll,
}

/// Cosine similarity; 0 when either vector has zero norm
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[derive(Clone)]
pub struct DecisionEngine {
    embeddings: Arc<dyn EmbeddingProvider>,
}

impl DecisionEngine {
    pub fn new(embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embeddings }
    }

    pub fn is_ready(&self) -> bool {
        self.embeddings.is_ready()
    }

    fn word_vector(&self, word: &str) -> Result<&[f32], DecisionUnavailable> {
        if !self.embeddings.is_ready() {
            return Err(DecisionUnavailable::NotReady);
        }
        self.embeddings
            .word_vector(word)
            .ok_or_else(|| DecisionUnavailable::MissingWord(word.to_string()))
    }

    /// Score candidates that have an embedding against the card, best first.
    /// Candidates without an embedding are left out.
    pub fn rank_words<'a>(
        &self,
        card_id: &str,
        candidates: &'a [WordItem],
    ) -> Result<Vec<(&'a WordItem, f32)>, DecisionUnavailable> {
        if !self.embeddings.is_ready() {
            return Err(DecisionUnavailable::NotReady);
        }
        let card_vec = self
            .embeddings
            .card_vector(card_id)
            .ok_or_else(|| DecisionUnavailable::MissingCard(card_id.to_string()))?;

        let mut scores: Vec<_> = candidates
            .iter()
            .filter_map(|word| {
                self.embeddings
                    .word_vector(word.text())
                    .map(|vec| (word, similarity(card_vec, vec)))
            })
            .collect();
        // Stable: equal scores keep candidate order
        scores.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(scores)
    }

    /// Score each card id against the word; cards without an embedding get
    /// [`MISSING_CARD_SCORE`]. Order follows the input.
    pub fn rank_cards<'a>(
        &self,
        word: &str,
        card_ids: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<(&'a str, f32)>, DecisionUnavailable> {
        let word_vec = self.word_vector(word)?;
        Ok(card_ids
            .into_iter()
            .map(|id| {
                let score = self
                    .embeddings
                    .card_vector(id)
                    .map(|vec| similarity(vec, word_vec))
                    .unwrap_or(MISSING_CARD_SCORE);
                (id, score)
            })
            .collect())
    }

    /// Pick the storyteller's word for `card_id` from `candidates`
    pub fn analyze_storyteller_candidates<R: Rng + ?Sized>(
        &self,
        card_id: &str,
        candidates: &[WordItem],
        rng: &mut R,
    ) -> WordVerdict {
        if candidates.is_empty() {
            return WordVerdict::Reroll;
        }

        let scores = match self.rank_words(card_id, candidates) {
            Ok(scores) => scores,
            Err(e) => {
                tracing::debug!("Storyteller falling back to a random word: {}", e);
                return random_word(candidates, rng);
            }
        };

        let sweet: Vec<_> = scores
            .iter()
            .filter(|(_, score)| SWEET_SPOT.contains(score))
            .collect();
        if let Some((word, score)) = sweet.choose(rng) {
            tracing::debug!(
                "Storyteller found a sweet spot for {}: '{}' ({:.2})",
                card_id,
                word.text(),
                score
            );
            return WordVerdict::Chosen((*word).clone());
        }

        let top = scores.first().map(|(_, s)| *s).unwrap_or(0.0);
        if top < TOO_WEAK {
            tracing::debug!("Candidates too weak (top {:.2}), asking for reroll", top);
            return WordVerdict::Reroll;
        }
        if top > TOO_OBVIOUS {
            tracing::debug!("Candidates too obvious (top {:.2}), asking for reroll", top);
            return WordVerdict::Reroll;
        }

        // Usable but outside the sweet spot; take the best rather than reroll forever
        WordVerdict::Chosen(scores[0].0.clone())
    }

    /// Card from `hand` that best matches `word`
    pub fn best_card<R: Rng + ?Sized>(
        &self,
        word: &str,
        hand: &[Card],
        rng: &mut R,
    ) -> Option<CardId> {
        let ids: Vec<&str> = hand.iter().map(|c| c.id.as_str()).collect();
        self.pick_best(word, &ids, rng)
    }

    /// Voting candidate that best matches `word`, never `exclude`.
    /// Callers should already have removed every card they own.
    pub fn best_vote<R: Rng + ?Sized>(
        &self,
        word: &str,
        candidates: &[Submission],
        exclude: Option<&str>,
        rng: &mut R,
    ) -> Option<CardId> {
        let ids: Vec<&str> = candidates
            .iter()
            .map(|c| c.card_id.as_str())
            .filter(|id| Some(*id) != exclude)
            .collect();
        self.pick_best(word, &ids, rng)
    }

    fn pick_best<R: Rng + ?Sized>(&self, word: &str, ids: &[&str], rng: &mut R) -> Option<CardId> {
        if ids.is_empty() {
            return None;
        }

        match self.rank_cards(word, ids.iter().copied()) {
            Ok(scores) => {
                // First maximum wins ties
                let (best, score) = scores
                    .into_iter()
                    .fold(None, |best: Option<(&str, f32)>, (id, score)| match best {
                        Some((_, top)) if score <= top => best,
                        _ => Some((id, score)),
                    })?;
                tracing::debug!("Best match for '{}': {} ({:.2})", word, best, score);
                Some(best.to_string())
            }
            Err(e) => {
                tracing::debug!("Falling back to a random card for '{}': {}", word, e);
                ids.choose(rng).map(|id| id.to_string())
            }
        }
    }
}

fn random_word<R: Rng + ?Sized>(candidates: &[WordItem], rng: &mut R) -> WordVerdict {
    match candidates.choose(rng) {
        Some(word) => WordVerdict::Chosen(word.clone()),
        None => WordVerdict::Reroll,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::StaticEmbeddings;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    /// Unit vector whose similarity to [1, 0] is `sim`
    fn at(sim: f32) -> Vec<f32> {
        vec![sim, (1.0 - sim * sim).max(0.0).sqrt()]
    }

    fn engine(words: &[(&str, f32)], cards: &[(&str, Vec<f32>)]) -> DecisionEngine {
        let words: HashMap<_, _> = words.iter().map(|(w, s)| (w.to_string(), at(*s))).collect();
        let cards: HashMap<_, _> = cards
            .iter()
            .map(|(id, v)| (id.to_string(), v.clone()))
            .collect();
        DecisionEngine::new(Arc::new(StaticEmbeddings::new(words, cards)))
    }

    fn words(texts: &[&str]) -> Vec<WordItem> {
        texts.iter().map(|t| WordItem::from(*t)).collect()
    }

    fn hand(ids: &[&str]) -> Vec<Card> {
        ids.iter()
            .map(|id| Card {
                id: id.to_string(),
                src: format!("/static/cards/{}", id),
                is_new: false,
            })
            .collect()
    }

    fn submission(user: &str, card: &str) -> Submission {
        Submission {
            user_id: user.to_string(),
            card_id: card.to_string(),
            card_src: String::new(),
            username: user.to_string(),
            is_storyteller: false,
        }
    }

    #[test]
    fn test_similarity() {
        assert!((similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((similarity(&[1.0, 0.0], &[-2.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_sweet_spot_is_preferred() {
        let engine = engine(
            &[("obvious", 0.9), ("fair", 0.6), ("weak", 0.2)],
            &[("c1", vec![1.0, 0.0])],
        );
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let verdict = engine.analyze_storyteller_candidates(
                "c1.png",
                &words(&["obvious", "fair", "weak"]),
                &mut rng,
            );
            assert_eq!(verdict, WordVerdict::Chosen(WordItem::from("fair")));
        }
    }

    #[test]
    fn test_all_low_scores_request_reroll() {
        let engine = engine(&[("a", 0.2), ("b", 0.1)], &[("c1", vec![1.0, 0.0])]);
        let mut rng = StdRng::seed_from_u64(2);
        let verdict = engine.analyze_storyteller_candidates("c1", &words(&["a", "b"]), &mut rng);
        assert_eq!(verdict, WordVerdict::Reroll);
    }

    #[test]
    fn test_all_high_scores_request_reroll() {
        let engine = engine(&[("a", 0.95), ("b", 0.9)], &[("c1", vec![1.0, 0.0])]);
        let mut rng = StdRng::seed_from_u64(3);
        let verdict = engine.analyze_storyteller_candidates("c1", &words(&["a", "b"]), &mut rng);
        assert_eq!(verdict, WordVerdict::Reroll);
    }

    #[test]
    fn test_usable_top_pick_outside_sweet_spot() {
        // 0.8 is above the sweet spot but below "too obvious"
        let engine = engine(&[("a", 0.8), ("b", 0.3)], &[("c1", vec![1.0, 0.0])]);
        let mut rng = StdRng::seed_from_u64(4);
        let verdict = engine.analyze_storyteller_candidates("c1", &words(&["b", "a"]), &mut rng);
        assert_eq!(verdict, WordVerdict::Chosen(WordItem::from("a")));
    }

    #[test]
    fn test_no_scored_candidates_request_reroll() {
        let engine = engine(&[], &[("c1", vec![1.0, 0.0])]);
        let mut rng = StdRng::seed_from_u64(5);
        let verdict = engine.analyze_storyteller_candidates("c1", &words(&["x", "y"]), &mut rng);
        assert_eq!(verdict, WordVerdict::Reroll);
    }

    #[test]
    fn test_missing_card_embedding_picks_random_candidate() {
        let engine = engine(&[("a", 0.9)], &[]);
        let candidates = words(&["a", "b", "c"]);
        let mut rng = StdRng::seed_from_u64(6);
        match engine.analyze_storyteller_candidates("unknown", &candidates, &mut rng) {
            WordVerdict::Chosen(word) => assert!(candidates.contains(&word)),
            WordVerdict::Reroll => panic!("missing card must not ask for reroll"),
        }
    }

    #[test]
    fn test_not_ready_provider_falls_back() {
        let engine = DecisionEngine::new(Arc::new(StaticEmbeddings::unavailable()));
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            engine.rank_words("c1", &words(&["a"])).unwrap_err(),
            DecisionUnavailable::NotReady
        );
        assert!(matches!(
            engine.analyze_storyteller_candidates("c1", &words(&["a"]), &mut rng),
            WordVerdict::Chosen(_)
        ));
        let pick = engine.best_card("a", &hand(&["x", "y"]), &mut rng).unwrap();
        assert!(pick == "x" || pick == "y");
    }

    #[test]
    fn test_localized_words_use_primary_text() {
        let engine = engine(&[("바다", 0.55)], &[("c1", vec![1.0, 0.0])]);
        let candidates = vec![WordItem::Localized {
            primary: "바다".to_string(),
            secondary: "sea".to_string(),
        }];
        let mut rng = StdRng::seed_from_u64(8);
        assert_eq!(
            engine.analyze_storyteller_candidates("c1", &candidates, &mut rng),
            WordVerdict::Chosen(candidates[0].clone())
        );
    }

    #[test]
    fn test_best_card_ranks_missing_embeddings_last() {
        let engine = engine(
            &[("sea", 1.0)],
            &[("near.png", at(0.8)), ("far.png", at(0.1))],
        );
        let mut rng = StdRng::seed_from_u64(9);
        let pick = engine
            .best_card("sea", &hand(&["nothing.png", "far.png", "near.webp"]), &mut rng)
            .unwrap();
        assert_eq!(pick, "near.webp");
    }

    #[test]
    fn test_best_card_ties_keep_encounter_order() {
        let engine = engine(&[("sea", 1.0)], &[("a", at(0.5)), ("b", at(0.5))]);
        let mut rng = StdRng::seed_from_u64(10);
        assert_eq!(
            engine.best_card("sea", &hand(&["b", "a"]), &mut rng).as_deref(),
            Some("b")
        );
        // All cards unknown: every score is -1, first wins
        assert_eq!(
            engine.best_card("sea", &hand(&["x", "y"]), &mut rng).as_deref(),
            Some("x")
        );
    }

    #[test]
    fn test_best_card_unknown_word_is_random_from_hand() {
        let engine = engine(&[], &[("a", at(0.5))]);
        let mut rng = StdRng::seed_from_u64(11);
        let ids = ["a", "b", "c"];
        let pick = engine.best_card("mystery", &hand(&ids), &mut rng).unwrap();
        assert!(ids.contains(&pick.as_str()));
        assert!(engine.best_card("mystery", &[], &mut rng).is_none());
    }

    #[test]
    fn test_best_vote_excludes_own_card() {
        let engine = engine(&[("sea", 1.0)], &[("mine", at(0.99)), ("theirs", at(0.4))]);
        let candidates = vec![submission("me", "mine"), submission("you", "theirs")];
        let mut rng = StdRng::seed_from_u64(12);

        assert_eq!(
            engine
                .best_vote("sea", &candidates, Some("mine"), &mut rng)
                .as_deref(),
            Some("theirs")
        );
        assert!(engine
            .best_vote("sea", &candidates[..1], Some("mine"), &mut rng)
            .is_none());
    }

    #[test]
    fn test_best_vote_random_fallback_never_picks_excluded() {
        let engine = DecisionEngine::new(Arc::new(StaticEmbeddings::unavailable()));
        let candidates = vec![submission("me", "mine"), submission("you", "theirs")];
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..20 {
            assert_eq!(
                engine
                    .best_vote("sea", &candidates, Some("mine"), &mut rng)
                    .as_deref(),
                Some("theirs")
            );
        }
    }
}
