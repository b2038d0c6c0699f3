use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::{
    error::StoreError,
    selector::Exclusions,
    store::Store,
    types::{Feedback, HistoryEntry, VideoItem},
};

/// Categories a liked title can boost.
pub(crate) const BOOST_KEYWORDS: [&str; 6] = [
    "relaxation",
    "meditation",
    "anxiety",
    "stress",
    "sleep",
    "mindfulness",
];

pub(crate) const BOOST_FACTOR: f64 = 1.2;

const INITIAL_WEIGHT: f64 = 1.0;

fn normalize_category(category: &str) -> String {
    category.trim().to_lowercase()
}

fn sanitize_weight(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0. {
        weight
    } else {
        0.
    }
}

/// Category affinities of one user. Keys are lowercase, weights are never negative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub(crate) struct WeightMap(BTreeMap<String, f64>);

impl WeightMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&mut self, category: &str, weight: f64) {
        let category = normalize_category(category);
        if category.is_empty() {
            return;
        }
        self.0.insert(category, sanitize_weight(weight));
    }

    pub(crate) fn get(&self, category: &str) -> Option<f64> {
        self.0.get(&normalize_category(category)).copied()
    }

    /// Multiplies the category's weight. An absent or zero weight starts at 1.0.
    pub(crate) fn boost(&mut self, category: &str, factor: f64) {
        let current = self
            .get(category)
            .filter(|weight| *weight > 0.)
            .unwrap_or(INITIAL_WEIGHT);
        self.set(category, current * factor);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    /// Heaviest first; equal weights in name order.
    pub(crate) fn ranked(&self) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .0
            .iter()
            .map(|(category, weight)| (category.as_str(), *weight))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

impl From<BTreeMap<String, f64>> for WeightMap {
    fn from(raw: BTreeMap<String, f64>) -> Self {
        let mut weights = WeightMap::new();
        for (category, weight) in raw {
            weights.set(&category, weight);
        }
        weights
    }
}

impl From<WeightMap> for BTreeMap<String, f64> {
    fn from(weights: WeightMap) -> Self {
        weights.0
    }
}

impl<'a> FromIterator<(&'a str, f64)> for WeightMap {
    fn from_iter<I: IntoIterator<Item = (&'a str, f64)>>(iter: I) -> Self {
        let mut weights = WeightMap::new();
        for (category, weight) in iter {
            weights.set(category, weight);
        }
        weights
    }
}

/// Keywords named by the item's title or description, in keyword order.
pub(crate) fn matched_keywords(item: &VideoItem) -> Vec<&'static str> {
    let title = item.title.to_lowercase();
    let description = item.description.to_lowercase();
    BOOST_KEYWORDS
        .iter()
        .copied()
        .filter(|keyword| title.contains(keyword) || description.contains(keyword))
        .collect()
}

/// Preference and history access for all users. Read-modify-write of a user's
/// weights happens under that user's lock.
pub(crate) struct PreferenceBook {
    store: Arc<dyn Store>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PreferenceBook {
    pub(crate) fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn user_lock(&self, user: &str) -> Arc<AsyncMutex<()>> {
        Arc::clone(self.locks.lock().entry(user.to_string()).or_default())
    }

    pub(crate) async fn weights(&self, user: &str) -> WeightMap {
        self.store.get_weights(user).await.unwrap_or_else(|err| {
            log::warn!("cannot load weights of {}: {}", user, err);
            WeightMap::new()
        })
    }

    pub(crate) async fn replace_weights(
        &self,
        user: &str,
        weights: &WeightMap,
    ) -> Result<(), StoreError> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;
        self.store.set_weights(user, weights).await
    }

    /// Boosts every keyword category the liked item names. Weights and the
    /// Like entry are stored together.
    pub(crate) async fn record_like(
        &self,
        user: &str,
        item: &VideoItem,
    ) -> Result<WeightMap, StoreError> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;

        let mut weights = self.store.get_weights(user).await?;
        let matched = matched_keywords(item);
        for keyword in &matched {
            weights.boost(keyword, BOOST_FACTOR);
        }
        let changed = (!matched.is_empty()).then_some(&weights);
        self.store
            .commit_feedback(
                user,
                changed,
                HistoryEntry::with_feedback(&item.id, Feedback::Like),
            )
            .await?;
        log::info!("{} liked {} (boosted {:?})", user, item.id, matched);
        Ok(weights)
    }

    /// Dislikes never touch weights; the item is excluded for good.
    pub(crate) async fn record_dislike(&self, user: &str, item_id: &str) -> Result<(), StoreError> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;
        self.store.add_dislike(user, item_id).await?;
        self.store
            .append_history(user, HistoryEntry::with_feedback(item_id, Feedback::Dislike))
            .await
    }

    pub(crate) async fn record_served(&self, user: &str, item_ids: &[String]) {
        for item_id in item_ids {
            if let Err(err) = self
                .store
                .append_history(user, HistoryEntry::served(item_id.clone()))
                .await
            {
                log::warn!("cannot record served item {}: {}", item_id, err);
            }
        }
    }

    pub(crate) async fn recent(&self, user: &str, window: usize) -> HashSet<String> {
        match self.store.get_recent(user, window).await {
            Ok(recent) => recent.into_iter().collect(),
            Err(err) => {
                log::warn!("cannot load history of {}: {}", user, err);
                HashSet::new()
            }
        }
    }

    pub(crate) async fn exclusions(&self, user: &str, recent_window: usize) -> Exclusions {
        let disliked = self.store.get_dislikes(user).await.unwrap_or_else(|err| {
            log::warn!("cannot load dislikes of {}: {}", user, err);
            HashSet::new()
        });
        Exclusions {
            recently_served: self.recent(user, recent_window).await,
            disliked,
        }
    }
}
