use super::{AppState, GameResult, NoOp, Outcome};
use crate::store::keys;
use crate::types::*;
use rand::seq::SliceRandom;
use rand::Rng;

/// Names handed out to automated players
const AI_ROSTER: &[&str] = &[
    "AlphaGo", "Jarvis", "Hal-9000", "Skynet", "GLaDOS", "T-800", "Wall-E",
];

/// Result of a successful join
#[derive(Debug, Clone)]
pub struct Joined {
    pub player: Player,
    /// The player had been replaced by an automated actor and took control back
    pub reconnected_from_ai: bool,
    pub is_host: bool,
}

#[derive(Debug, Clone)]
pub enum Disconnect {
    /// Game in progress: an automated actor plays on in their seat
    ConvertedToAi(Player),
    /// Lobby: seat kept until the reconnect grace period runs out
    Pending,
}

/// Pick a roster name nobody in the room uses, numbering when all are taken
fn pick_ai_name<R: Rng + ?Sized>(taken: &[&str], rng: &mut R) -> String {
    let mut roster = AI_ROSTER.to_vec();
    roster.shuffle(rng);

    if let Some(name) = roster.iter().find(|name| !taken.contains(*name)) {
        return name.to_string();
    }

    let base = roster[0];
    let mut suffix = 2;
    loop {
        let candidate = format!("{} {}", base, suffix);
        if !taken.contains(&candidate.as_str()) {
            return candidate;
        }
        suffix += 1;
    }
}

fn new_ai_id() -> UserId {
    let ulid = ulid::Ulid::new().to_string().to_lowercase();
    format!("ai_{}", &ulid[ulid.len() - 6..])
}

impl AppState {
    /// Create a waiting room under a fresh 4-digit id
    pub async fn create_room(&self, name: Option<String>) -> GameResult<Room> {
        let room_id = loop {
            let candidate = rand::rng().random_range(1000..10000).to_string();
            if !self.store.exists(&keys::room(&candidate)).await? {
                break candidate;
            }
        };
        self.create_room_with_id(&room_id, name).await
    }

    pub async fn create_room_with_id(&self, room_id: &str, name: Option<String>) -> GameResult<Room> {
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Room {}", room_id));
        let room = Room::new(room_id.to_string(), name);

        self.save_room(&room).await?;
        self.store.set_add(keys::ACTIVE_ROOMS, room_id).await?;

        tracing::info!("Room {} created", room_id);
        Ok(room)
    }

    pub async fn room_exists(&self, room_id: &str) -> GameResult<bool> {
        Ok(self.store.exists(&keys::room(room_id)).await?)
    }

    /// Join a room, or take back a seat that already exists.
    ///
    /// A returning player always regains control from an automated actor.
    /// The first joiner of a room without host becomes host. New seats are
    /// only handed out in the lobby: a player dealt in after the start would
    /// hold no cards and the round could never complete.
    pub async fn join(
        &self,
        room_id: &str,
        user_id: &str,
        username: &str,
    ) -> GameResult<Outcome<Joined>> {
        let mut room = self.load_room(room_id).await?;
        let username = strip_ai_suffix(username).to_string();

        let (player, reconnected_from_ai) = match self.get_player(room_id, user_id).await? {
            Some(mut existing) => {
                let was_replaced = existing.username.ends_with(AI_NAME_SUFFIX);
                existing.is_ai = false;
                existing.username = username;
                existing.connected = true;
                (existing, was_replaced)
            }
            None if room.is_playing() => {
                tracing::info!("{} turned away from room {}, game in progress", user_id, room_id);
                return Ok(Outcome::Ignored(NoOp::AlreadyPlaying));
            }
            None => (Player::new(user_id.to_string(), username), false),
        };
        self.save_player(room_id, &player).await?;

        if room.host_id.is_none() {
            room.host_id = Some(user_id.to_string());
            self.save_room(&room).await?;
        }

        tracing::info!(
            "{} ({}) joined room {}{}",
            player.username,
            user_id,
            room_id,
            if reconnected_from_ai { " and replaced their automated stand-in" } else { "" }
        );

        Ok(Outcome::Applied(Joined {
            is_host: room.is_host(user_id),
            player,
            reconnected_from_ai,
        }))
    }

    pub async fn update_profile(
        &self,
        room_id: &str,
        user_id: &str,
        username: &str,
    ) -> GameResult<Outcome> {
        let Some(mut player) = self.get_player(room_id, user_id).await? else {
            return Ok(Outcome::Ignored(NoOp::PlayerNotFound));
        };
        player.username = username.to_string();
        self.save_player(room_id, &player).await?;
        Ok(Outcome::Applied(()))
    }

    /// Seat a new automated player (host only, lobby only)
    pub async fn add_ai(&self, room_id: &str, requester_id: &str) -> GameResult<Outcome<Player>> {
        let room = self.load_room(room_id).await?;
        if !room.is_host(requester_id) {
            return Ok(Outcome::Ignored(NoOp::NotHost));
        }
        if room.is_playing() {
            return Ok(Outcome::Ignored(NoOp::AlreadyPlaying));
        }

        let players = self.get_players(room_id).await?;
        if players.len() >= MAX_PLAYERS {
            return Ok(Outcome::Ignored(NoOp::RoomFull));
        }

        let taken: Vec<&str> = players.values().map(|p| p.base_name()).collect();
        let name = pick_ai_name(&taken, &mut rand::rng());

        let mut player = Player::new(new_ai_id(), format!("{}{}", name, AI_NAME_SUFFIX));
        player.is_ai = true;
        player.ready = true;
        self.save_player(room_id, &player).await?;

        tracing::info!("Added automated player {} to room {}", player.username, room_id);
        Ok(Outcome::Applied(player))
    }

    /// Remove a player (host only, lobby only). Returns the removed record.
    ///
    /// Mid-game seats are never emptied; a player who leaves is replaced by
    /// an automated actor on disconnect instead.
    pub async fn kick(
        &self,
        room_id: &str,
        requester_id: &str,
        target_id: &str,
    ) -> GameResult<Outcome<Player>> {
        let room = self.load_room(room_id).await?;
        if !room.is_host(requester_id) {
            return Ok(Outcome::Ignored(NoOp::NotHost));
        }
        if room.is_playing() {
            return Ok(Outcome::Ignored(NoOp::AlreadyPlaying));
        }
        let Some(target) = self.get_player(room_id, target_id).await? else {
            return Ok(Outcome::Ignored(NoOp::PlayerNotFound));
        };

        self.store.hash_delete(&keys::users(room_id), target_id).await?;
        tracing::info!("{} kicked from room {}", target.username, room_id);
        Ok(Outcome::Applied(target))
    }

    /// A player's connection dropped
    pub async fn disconnect(&self, room_id: &str, user_id: &str) -> GameResult<Outcome<Disconnect>> {
        let room = self.load_room(room_id).await?;
        let Some(mut player) = self.get_player(room_id, user_id).await? else {
            return Ok(Outcome::Ignored(NoOp::PlayerNotFound));
        };

        if room.is_playing() {
            player.is_ai = true;
            if !player.username.ends_with(AI_NAME_SUFFIX) {
                player.username.push_str(AI_NAME_SUFFIX);
            }
            self.save_player(room_id, &player).await?;
            tracing::info!("{} disconnected mid-game, automated actor takes over", user_id);
            return Ok(Outcome::Applied(Disconnect::ConvertedToAi(player)));
        }

        player.connected = false;
        self.save_player(room_id, &player).await?;
        Ok(Outcome::Applied(Disconnect::Pending))
    }

    /// Drop a lobby player whose grace period ran out without a reconnect.
    /// Returns the new host when the host role moved.
    pub async fn remove_if_disconnected(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> GameResult<Outcome<Option<UserId>>> {
        let Some(player) = self.get_player(room_id, user_id).await? else {
            return Ok(Outcome::Ignored(NoOp::PlayerNotFound));
        };
        if player.connected {
            tracing::debug!("{} came back within the grace period", user_id);
            return Ok(Outcome::Ignored(NoOp::Reconnected));
        }

        self.store.hash_delete(&keys::users(room_id), user_id).await?;
        tracing::info!("{} left room {}", player.username, room_id);

        let mut room = self.load_room(room_id).await?;
        if !room.is_host(user_id) {
            return Ok(Outcome::Applied(None));
        }

        let mut remaining: Vec<Player> = self.get_players(room_id).await?.into_values().collect();
        remaining.sort_by(|a, b| a.is_ai.cmp(&b.is_ai).then(a.joined_at.total_cmp(&b.joined_at)));
        room.host_id = remaining.first().map(|p| p.user_id.clone());
        self.save_room(&room).await?;

        if let Some(host) = &room.host_id {
            tracing::info!("Host of room {} passed to {}", room_id, host);
        }
        Ok(Outcome::Applied(room.host_id))
    }
}
