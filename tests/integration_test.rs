use mindsync::actors::ActorConfig;
use mindsync::catalog::CardCatalog;
use mindsync::protocol::{ClientMessage, RoomBroadcast, ServerMessage};
use mindsync::state::AppState;
use mindsync::types::{Phase, Player, Room, RoomStatus, WordItem, HAND_SIZE};
use mindsync::ws::handlers::handle_message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

fn test_state() -> Arc<AppState> {
    let cards = (1..=80).map(|i| format!("{}.png", i)).collect();
    Arc::new(
        AppState::default()
            .with_catalog(CardCatalog::new(cards, None))
            .with_actor_config(ActorConfig::immediate()),
    )
}

async fn send(state: &Arc<AppState>, msg: ClientMessage) {
    let reply = handle_message(msg, state).await;
    assert!(
        !matches!(reply, Some(ServerMessage::Error { .. })),
        "unexpected error reply: {:?}",
        reply
    );
}

async fn room(state: &AppState, room_id: &str) -> Room {
    state.get_room(room_id).await.unwrap().expect("room exists")
}

async fn player(state: &AppState, room_id: &str, user_id: &str) -> Player {
    state
        .get_player(room_id, user_id)
        .await
        .unwrap()
        .expect("player exists")
}

fn drain(rx: &mut Receiver<RoomBroadcast>) -> Vec<RoomBroadcast> {
    let mut out = Vec::new();
    while let Ok(b) = rx.try_recv() {
        out.push(b);
    }
    out
}

/// Poll until the room satisfies `done` or give up after about two seconds
async fn wait_for(state: &AppState, room_id: &str, done: impl Fn(&Room) -> bool) -> Room {
    for _ in 0..400 {
        let current = room(state, room_id).await;
        if done(&current) {
            return current;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let current = room(state, room_id).await;
    panic!("room never reached the expected state: {:?}", current.phase);
}

/// End-to-end integration test for a complete three-player game
#[tokio::test]
async fn test_full_game_flow() {
    let state = test_state();
    let users = ["alice", "bob", "carol"];

    // 1. Setup: create the room and join
    let created = state.create_room(Some("Friday".to_string())).await.unwrap();
    let room_id = created.id.clone();
    for user in users {
        send(
            &state,
            ClientMessage::JoinGame {
                room_id: room_id.clone(),
                user_id: user.to_string(),
                username: user.to_uppercase(),
            },
        )
        .await;
    }
    assert_eq!(room(&state, &room_id).await.host_id.as_deref(), Some("alice"));

    // 2. Start: one storyteller turn each
    send(
        &state,
        ClientMessage::StartGame {
            room_id: room_id.clone(),
            rounds_per_user: Some(1),
        },
    )
    .await;

    let started = room(&state, &room_id).await;
    assert_eq!(started.status, RoomStatus::Playing);
    assert_eq!(started.total_rounds, 3);
    assert_eq!(started.audience_card_limit, 2);
    assert_eq!(started.reroll_count, 10);
    for user in users {
        assert_eq!(player(&state, &room_id, user).await.hand.len(), HAND_SIZE);
    }

    let mut storytellers = Vec::new();
    for round in 1..=3 {
        let current = room(&state, &room_id).await;
        assert_eq!(current.current_round, round);
        assert_eq!(current.phase, Some(Phase::StorytellerChoosing));
        let storyteller = current.storyteller_id.clone().unwrap();
        storytellers.push(storyteller.clone());

        // 3. Storyteller rerolls once and then tells the story
        send(
            &state,
            ClientMessage::RefreshWords {
                room_id: room_id.clone(),
                user_id: storyteller.clone(),
            },
        )
        .await;
        assert_eq!(room(&state, &room_id).await.reroll_count, 9);

        let target = player(&state, &room_id, &storyteller).await.hand[0].id.clone();
        send(
            &state,
            ClientMessage::SubmitStory {
                room_id: room_id.clone(),
                user_id: Some(storyteller.clone()),
                card_id: target.clone(),
                word: WordItem::Localized {
                    primary: "바다".to_string(),
                    secondary: "sea".to_string(),
                },
            },
        )
        .await;
        assert_eq!(
            room(&state, &room_id).await.phase,
            Some(Phase::AudienceSubmitting)
        );

        // 4. Audience plays two cards each; a third is ignored
        let audience: Vec<&str> = users.into_iter().filter(|u| *u != storyteller).collect();
        for user in &audience {
            let hand = player(&state, &room_id, user).await.hand;
            for card in hand.iter().take(3) {
                send(
                    &state,
                    ClientMessage::SubmitCard {
                        room_id: room_id.clone(),
                        user_id: user.to_string(),
                        card_id: card.id.clone(),
                    },
                )
                .await;
            }
        }

        let voting = room(&state, &room_id).await;
        assert_eq!(voting.phase, Some(Phase::Voting));
        assert_eq!(voting.voting_candidates.len(), 5);

        // 5. Everyone finds the storyteller's card
        for user in &audience {
            send(
                &state,
                ClientMessage::SubmitVote {
                    room_id: room_id.clone(),
                    user_id: user.to_string(),
                    card_id: target.clone(),
                },
            )
            .await;
        }

        let result = room(&state, &room_id).await;
        assert_eq!(result.phase, Some(Phase::Result));
        assert_eq!(result.round_results.len(), 5);

        send(
            &state,
            ClientMessage::NextRound {
                room_id: room_id.clone(),
            },
        )
        .await;
    }

    // 6. Every player told exactly one story
    storytellers.sort();
    assert_eq!(storytellers, vec!["alice", "bob", "carol"]);

    let finished = room(&state, &room_id).await;
    assert_eq!(finished.phase, Some(Phase::GameOver));

    // All-correct rounds pay each voter 2; everyone voted twice
    for user in users {
        let p = player(&state, &room_id, user).await;
        assert_eq!(p.score, 4, "{} score", user);
        let expected = if finished.is_storyteller(&p.user_id) { 0 } else { 2 };
        assert_eq!(p.last_gained_score, expected);
        // The final round's cards are not discarded once the game is over
        assert_eq!(p.hand.len(), HAND_SIZE);
    }
}

#[tokio::test]
async fn test_game_against_automated_players() {
    let state = test_state();
    let created = state.create_room(None).await.unwrap();
    let room_id = created.id.clone();

    send(
        &state,
        ClientMessage::JoinGame {
            room_id: room_id.clone(),
            user_id: "alice".to_string(),
            username: "Alice".to_string(),
        },
    )
    .await;
    for _ in 0..2 {
        send(
            &state,
            ClientMessage::AddAi {
                room_id: room_id.clone(),
                user_id: "alice".to_string(),
            },
        )
        .await;
    }
    let players = state.get_players(&room_id).await.unwrap();
    assert_eq!(players.len(), 3);
    assert_eq!(players.values().filter(|p| p.is_ai).count(), 2);

    send(
        &state,
        ClientMessage::StartGame {
            room_id: room_id.clone(),
            rounds_per_user: Some(1),
        },
    )
    .await;

    // Alice plays her part whenever it is her turn; the others play themselves
    let mut finished = None;
    for _ in 0..400 {
        let current = room(&state, &room_id).await;
        let alice = player(&state, &room_id, "alice").await;
        let alice_tells = current.is_storyteller("alice");

        match current.phase {
            Some(Phase::StorytellerChoosing) if alice_tells => {
                send(
                    &state,
                    ClientMessage::SubmitStory {
                        room_id: room_id.clone(),
                        user_id: Some("alice".to_string()),
                        card_id: alice.hand[0].id.clone(),
                        word: WordItem::from("꿈"),
                    },
                )
                .await;
            }
            Some(Phase::AudienceSubmitting)
                if !alice_tells && alice.submitted_count < current.audience_card_limit =>
            {
                let card = alice.hand[alice.submitted_count as usize].id.clone();
                send(
                    &state,
                    ClientMessage::SubmitCard {
                        room_id: room_id.clone(),
                        user_id: "alice".to_string(),
                        card_id: card,
                    },
                )
                .await;
            }
            Some(Phase::Voting) if !alice_tells && !alice.voted => {
                let choice = current
                    .voting_candidates
                    .iter()
                    .find(|c| c.user_id != "alice")
                    .map(|c| c.card_id.clone())
                    .unwrap();
                send(
                    &state,
                    ClientMessage::SubmitVote {
                        room_id: room_id.clone(),
                        user_id: "alice".to_string(),
                        card_id: choice,
                    },
                )
                .await;
            }
            Some(Phase::Result) => {
                finished = Some(current);
                break;
            }
            _ => {}
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let finished = finished.expect("round reached the result screen");
    assert_eq!(finished.round_results.len(), 5);
    let players = state.get_players(&finished.id).await.unwrap();
    let voters = players
        .values()
        .filter(|p| !finished.is_storyteller(&p.user_id))
        .filter(|p| p.voted)
        .count();
    assert_eq!(voters, 2);
    for p in players.values() {
        assert!(p.last_score_reason.is_some());
    }
}

#[tokio::test]
async fn test_disconnected_player_is_replaced_and_round_continues() {
    let state = test_state();
    let created = state.create_room(None).await.unwrap();
    let room_id = created.id.clone();
    let users = ["alice", "bob", "carol", "dave"];
    for user in users {
        send(
            &state,
            ClientMessage::JoinGame {
                room_id: room_id.clone(),
                user_id: user.to_string(),
                username: user.to_string(),
            },
        )
        .await;
    }
    send(
        &state,
        ClientMessage::StartGame {
            room_id: room_id.clone(),
            rounds_per_user: None,
        },
    )
    .await;

    let storyteller = room(&state, &room_id).await.storyteller_id.unwrap();
    let target = player(&state, &room_id, &storyteller).await.hand[0].id.clone();
    send(
        &state,
        ClientMessage::SubmitStory {
            room_id: room_id.clone(),
            user_id: Some(storyteller.clone()),
            card_id: target.clone(),
            word: WordItem::from("시간"),
        },
    )
    .await;

    // One audience member drops; the rest play on
    let audience: Vec<&str> = users.into_iter().filter(|u| *u != storyteller).collect();
    mindsync::ws::handlers::handle_disconnect(&state, &room_id, audience[0]).await;
    assert!(player(&state, &room_id, audience[0]).await.is_ai);

    for user in &audience[1..] {
        let card = player(&state, &room_id, user).await.hand[0].id.clone();
        send(
            &state,
            ClientMessage::SubmitCard {
                room_id: room_id.clone(),
                user_id: user.to_string(),
                card_id: card,
            },
        )
        .await;
    }
    wait_for(&state, &room_id, |r| r.phase == Some(Phase::Voting)).await;

    for user in &audience[1..] {
        send(
            &state,
            ClientMessage::SubmitVote {
                room_id: room_id.clone(),
                user_id: user.to_string(),
                card_id: target.clone(),
            },
        )
        .await;
    }
    let result = wait_for(&state, &room_id, |r| r.phase == Some(Phase::Result)).await;
    assert_eq!(result.round_results.len(), 4);
    assert!(player(&state, &room_id, audience[0]).await.voted);
}

#[tokio::test]
async fn test_broadcasts_are_tagged_with_their_room() {
    let state = test_state();
    let first = state.create_room(None).await.unwrap();
    let second = state.create_room(None).await.unwrap();
    assert_ne!(first.id, second.id);
    let mut rx = state.broadcast.subscribe();

    send(
        &state,
        ClientMessage::JoinGame {
            room_id: first.id.clone(),
            user_id: "alice".to_string(),
            username: "Alice".to_string(),
        },
    )
    .await;
    send(
        &state,
        ClientMessage::JoinGame {
            room_id: second.id.clone(),
            user_id: "bob".to_string(),
            username: "Bob".to_string(),
        },
    )
    .await;

    let messages = drain(&mut rx);
    let for_first: Vec<_> = messages.iter().filter(|b| b.room_id == first.id).collect();
    let for_second: Vec<_> = messages.iter().filter(|b| b.room_id == second.id).collect();
    assert!(!for_first.is_empty());
    assert!(!for_second.is_empty());
    assert_eq!(for_first.len() + for_second.len(), messages.len());

    for b in for_second {
        if let ServerMessage::UpdateUserList { users } = &b.message {
            assert!(users.iter().all(|u| u.user_id == "bob"));
        }
    }
}
