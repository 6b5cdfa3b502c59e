//! Shared key/value store abstraction.
//!
//! All durable room state (room record, players, deck, submissions, votes)
//! lives behind `SharedStateStore`. The trait mirrors the small subset of
//! Redis-style primitives the game needs: plain values, hashes, lists and
//! sets. Every single call is atomic; nothing spans multiple calls.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("key '{0}' holds a value of a different type")]
    WrongType(String),

    #[error("failed to (de)serialize '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait SharedStateStore: Send + Sync {
    async fn get_value(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_value(&self, key: &str, value: String) -> StoreResult<()>;

    /// Remove a key of any type. Returns whether it existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    async fn hash_set(&self, key: &str, field: &str, value: String) -> StoreResult<()>;

    async fn hash_delete(&self, key: &str, field: &str) -> StoreResult<bool>;

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    async fn hash_keys(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn hash_values(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn hash_len(&self, key: &str) -> StoreResult<usize>;

    async fn hash_exists(&self, key: &str, field: &str) -> StoreResult<bool> {
        Ok(self.hash_get(key, field).await?.is_some())
    }

    /// Append to the tail of a list, returning the new length
    async fn list_push(&self, key: &str, values: Vec<String>) -> StoreResult<usize>;

    /// Pop from the head of a list
    async fn list_pop(&self, key: &str) -> StoreResult<Option<String>>;

    async fn list_len(&self, key: &str) -> StoreResult<usize>;

    /// Returns true if the member was newly added
    async fn set_add(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Health probe
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Key layout shared by every component that touches room state
pub mod keys {
    pub const ACTIVE_ROOMS: &str = "rooms:active";

    pub fn room(room_id: &str) -> String {
        format!("room:{}", room_id)
    }

    pub fn users(room_id: &str) -> String {
        format!("room:{}:users", room_id)
    }

    pub fn deck(room_id: &str) -> String {
        format!("room:{}:deck", room_id)
    }

    pub fn submissions(room_id: &str) -> String {
        format!("room:{}:submissions", room_id)
    }

    pub fn votes(room_id: &str) -> String {
        format!("room:{}:votes", room_id)
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|source| StoreError::Serialization {
        key: key.to_string(),
        source,
    })
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> StoreResult<T> {
    serde_json::from_str(raw).map_err(|source| StoreError::Serialization {
        key: key.to_string(),
        source,
    })
}

/// Read a JSON record stored as a plain value
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn SharedStateStore,
    key: &str,
) -> StoreResult<Option<T>> {
    match store.get_value(key).await? {
        Some(raw) => decode(key, &raw).map(Some),
        None => Ok(None),
    }
}

pub async fn set_json<T: Serialize + Sync>(
    store: &dyn SharedStateStore,
    key: &str,
    value: &T,
) -> StoreResult<()> {
    store.set_value(key, encode(key, value)?).await
}

pub async fn hash_get_json<T: DeserializeOwned>(
    store: &dyn SharedStateStore,
    key: &str,
    field: &str,
) -> StoreResult<Option<T>> {
    match store.hash_get(key, field).await? {
        Some(raw) => decode(key, &raw).map(Some),
        None => Ok(None),
    }
}

pub async fn hash_set_json<T: Serialize + Sync>(
    store: &dyn SharedStateStore,
    key: &str,
    field: &str,
    value: &T,
) -> StoreResult<()> {
    store.hash_set(key, field, encode(key, value)?).await
}

/// Decode every value of a hash, keyed by field
pub async fn hash_get_all_json<T: DeserializeOwned>(
    store: &dyn SharedStateStore,
    key: &str,
) -> StoreResult<HashMap<String, T>> {
    store
        .hash_get_all(key)
        .await?
        .into_iter()
        .map(|(field, raw)| decode(key, &raw).map(|value| (field, value)))
        .collect()
}
