use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::StoreError,
    preferences::WeightMap,
    types::{HistoryEntry, MoodEntry},
};

/// Per-user key-value state behind the companion.
#[async_trait]
pub(crate) trait Store: Send + Sync {
    async fn get_weights(&self, user: &str) -> Result<WeightMap, StoreError>;
    async fn set_weights(&self, user: &str, weights: &WeightMap) -> Result<(), StoreError>;
    /// Item ids of the last `n` history entries, oldest first.
    async fn get_recent(&self, user: &str, n: usize) -> Result<Vec<String>, StoreError>;
    async fn append_history(&self, user: &str, entry: HistoryEntry) -> Result<(), StoreError>;
    /// Weights (when given) and the history entry land together or not at all.
    async fn commit_feedback(
        &self,
        user: &str,
        weights: Option<&WeightMap>,
        entry: HistoryEntry,
    ) -> Result<(), StoreError>;
    async fn get_dislikes(&self, user: &str) -> Result<HashSet<String>, StoreError>;
    async fn add_dislike(&self, user: &str, item_id: &str) -> Result<(), StoreError>;
    async fn append_mood(&self, user: &str, entry: MoodEntry) -> Result<(), StoreError>;
    async fn get_moods(&self, user: &str) -> Result<Vec<MoodEntry>, StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserRecord {
    #[serde(default)]
    weights: WeightMap,
    #[serde(default)]
    history: Vec<HistoryEntry>,
    #[serde(default)]
    dislikes: BTreeSet<String>,
    #[serde(default)]
    moods: Vec<MoodEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    users: BTreeMap<String, UserRecord>,
}

impl StoreState {
    fn user(&self, user: &str) -> Option<&UserRecord> {
        self.users.get(user)
    }

    fn user_mut(&mut self, user: &str) -> &mut UserRecord {
        self.users.entry(user.to_string()).or_default()
    }

    fn weights(&self, user: &str) -> WeightMap {
        self.user(user)
            .map(|record| record.weights.clone())
            .unwrap_or_default()
    }

    fn recent(&self, user: &str, n: usize) -> Vec<String> {
        let Some(record) = self.user(user) else {
            return Vec::new();
        };
        let skip = record.history.len().saturating_sub(n);
        record
            .history
            .iter()
            .skip(skip)
            .map(|entry| entry.item_id.clone())
            .collect()
    }

    fn dislikes(&self, user: &str) -> HashSet<String> {
        self.user(user)
            .map(|record| record.dislikes.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn commit_feedback(&mut self, user: &str, weights: Option<&WeightMap>, entry: HistoryEntry) {
        let record = self.user_mut(user);
        if let Some(weights) = weights {
            record.weights = weights.clone();
        }
        record.history.push(entry);
    }

    fn moods(&self, user: &str) -> Vec<MoodEntry> {
        self.user(user)
            .map(|record| record.moods.clone())
            .unwrap_or_default()
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    state: parking_lot::Mutex<StoreState>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_weights(&self, user: &str) -> Result<WeightMap, StoreError> {
        Ok(self.state.lock().weights(user))
    }

    async fn set_weights(&self, user: &str, weights: &WeightMap) -> Result<(), StoreError> {
        self.state.lock().user_mut(user).weights = weights.clone();
        Ok(())
    }

    async fn get_recent(&self, user: &str, n: usize) -> Result<Vec<String>, StoreError> {
        Ok(self.state.lock().recent(user, n))
    }

    async fn append_history(&self, user: &str, entry: HistoryEntry) -> Result<(), StoreError> {
        self.state.lock().user_mut(user).history.push(entry);
        Ok(())
    }

    async fn commit_feedback(
        &self,
        user: &str,
        weights: Option<&WeightMap>,
        entry: HistoryEntry,
    ) -> Result<(), StoreError> {
        self.state.lock().commit_feedback(user, weights, entry);
        Ok(())
    }

    async fn get_dislikes(&self, user: &str) -> Result<HashSet<String>, StoreError> {
        Ok(self.state.lock().dislikes(user))
    }

    async fn add_dislike(&self, user: &str, item_id: &str) -> Result<(), StoreError> {
        self.state
            .lock()
            .user_mut(user)
            .dislikes
            .insert(item_id.to_string());
        Ok(())
    }

    async fn append_mood(&self, user: &str, entry: MoodEntry) -> Result<(), StoreError> {
        self.state.lock().user_mut(user).moods.push(entry);
        Ok(())
    }

    async fn get_moods(&self, user: &str) -> Result<Vec<MoodEntry>, StoreError> {
        Ok(self.state.lock().moods(user))
    }
}

/// Whole state in one JSON file, rewritten after every change.
pub(crate) struct JsonFileStore {
    path: PathBuf,
    state: tokio::sync::Mutex<StoreState>,
}

impl JsonFileStore {
    pub(crate) async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(err) => return Err(err.into()),
        };
        log::debug!("opened store at {:?}", path);
        Ok(Self {
            path,
            state: tokio::sync::Mutex::new(state),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(state)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// The change is staged on a copy and only kept once it is on disk.
    async fn mutate(&self, change: impl FnOnce(&mut StoreState)) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let mut staged = state.clone();
        change(&mut staged);
        self.persist(&staged).await?;
        *state = staged;
        Ok(())
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn get_weights(&self, user: &str) -> Result<WeightMap, StoreError> {
        Ok(self.state.lock().await.weights(user))
    }

    async fn set_weights(&self, user: &str, weights: &WeightMap) -> Result<(), StoreError> {
        self.mutate(|state| state.user_mut(user).weights = weights.clone())
            .await
    }

    async fn get_recent(&self, user: &str, n: usize) -> Result<Vec<String>, StoreError> {
        Ok(self.state.lock().await.recent(user, n))
    }

    async fn append_history(&self, user: &str, entry: HistoryEntry) -> Result<(), StoreError> {
        self.mutate(|state| state.user_mut(user).history.push(entry))
            .await
    }

    async fn commit_feedback(
        &self,
        user: &str,
        weights: Option<&WeightMap>,
        entry: HistoryEntry,
    ) -> Result<(), StoreError> {
        self.mutate(|state| state.commit_feedback(user, weights, entry))
            .await
    }

    async fn get_dislikes(&self, user: &str) -> Result<HashSet<String>, StoreError> {
        Ok(self.state.lock().await.dislikes(user))
    }

    async fn add_dislike(&self, user: &str, item_id: &str) -> Result<(), StoreError> {
        self.mutate(|state| {
            state.user_mut(user).dislikes.insert(item_id.to_string());
        })
        .await
    }

    async fn append_mood(&self, user: &str, entry: MoodEntry) -> Result<(), StoreError> {
        self.mutate(|state| state.user_mut(user).moods.push(entry))
            .await
    }

    async fn get_moods(&self, user: &str) -> Result<Vec<MoodEntry>, StoreError> {
        Ok(self.state.lock().await.moods(user))
    }
}
