//! In-memory implementation of `SharedStateStore`.
//!
//! All entries live in a single `HashMap` behind a `RwLock`, so each trait
//! call is atomic on its own. State is lost on restart.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{SharedStateStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Entry {
    Value(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    Set(HashSet<String>),
}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType(key.to_string())
}

#[async_trait]
impl SharedStateStore for MemoryStore {
    async fn get_value(&self, key: &str) -> StoreResult<Option<String>> {
        match self.entries.read().await.get(key) {
            Some(Entry::Value(v)) => Ok(Some(v.clone())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set_value(&self, key: &str, value: String) -> StoreResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), Entry::Value(value));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        match self.entries.read().await.get(key) {
            Some(Entry::Hash(h)) => Ok(h.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn hash_set(&self, key: &str, field: &str, value: String) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        match entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(HashMap::new()))
        {
            Entry::Hash(h) => {
                h.insert(field.to_string(), value);
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn hash_delete(&self, key: &str, field: &str) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        let (removed, now_empty) = match entries.get_mut(key) {
            Some(Entry::Hash(h)) => (h.remove(field).is_some(), h.is_empty()),
            Some(_) => return Err(wrong_type(key)),
            None => return Ok(false),
        };
        // Redis drops empty hashes
        if now_empty {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        match self.entries.read().await.get(key) {
            Some(Entry::Hash(h)) => Ok(h.clone()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(HashMap::new()),
        }
    }

    async fn hash_keys(&self, key: &str) -> StoreResult<Vec<String>> {
        match self.entries.read().await.get(key) {
            Some(Entry::Hash(h)) => Ok(h.keys().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn hash_values(&self, key: &str) -> StoreResult<Vec<String>> {
        match self.entries.read().await.get(key) {
            Some(Entry::Hash(h)) => Ok(h.values().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn hash_len(&self, key: &str) -> StoreResult<usize> {
        match self.entries.read().await.get(key) {
            Some(Entry::Hash(h)) => Ok(h.len()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(0),
        }
    }

    async fn list_push(&self, key: &str, values: Vec<String>) -> StoreResult<usize> {
        let mut entries = self.entries.write().await;
        match entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()))
        {
            Entry::List(l) => {
                l.extend(values);
                Ok(l.len())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn list_pop(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.write().await;
        let (popped, now_empty) = match entries.get_mut(key) {
            Some(Entry::List(l)) => (l.pop_front(), l.is_empty()),
            Some(_) => return Err(wrong_type(key)),
            None => return Ok(None),
        };
        if now_empty {
            entries.remove(key);
        }
        Ok(popped)
    }

    async fn list_len(&self, key: &str) -> StoreResult<usize> {
        match self.entries.read().await.get(key) {
            Some(Entry::List(l)) => Ok(l.len()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(0),
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        match entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(HashSet::new()))
        {
            Entry::Set(s) => Ok(s.insert(member.to_string())),
            _ => Err(wrong_type(key)),
        }
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        match self.entries.read().await.get(key) {
            Some(Entry::Set(s)) => Ok(s.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }
}
