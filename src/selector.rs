use std::{collections::HashSet, sync::Arc, time::Duration};

use crate::{
    error::{with_timeout, FallbackReason, UpstreamError},
    preferences::WeightMap,
    sources::VideoSource,
    types::{Emotion, VideoItem},
};

pub(crate) const MAX_ACTIVE_CATEGORIES: usize = 5;

/// Recency exclusion is relaxed when it would leave fewer items than this.
const BACKFILL_FLOOR: usize = 3;

/// Categories used when the user has no stored preferences.
pub(crate) fn fallback_categories(emotion: &Emotion) -> &'static [&'static str] {
    match emotion {
        Emotion::Anxiety => &["relaxation", "breathing", "meditation"],
        Emotion::Stress => &["relaxation", "nature", "sleep"],
        Emotion::Sadness => &["motivation", "positive-thinking", "mindfulness"],
        Emotion::Anger => &["breathing", "meditation", "relaxation"],
        _ => &["meditation", "mindfulness"],
    }
}

pub(crate) fn emotion_search_term(emotion: &Emotion) -> &'static str {
    match emotion {
        Emotion::Anxiety => "anxiety relief",
        Emotion::Stress | Emotion::Overwhelmed => "stress relief",
        Emotion::Sadness | Emotion::Depression => "mood boost",
        Emotion::Anger => "calm down",
        Emotion::Fear => "calming",
        _ => "wellness",
    }
}

pub(crate) fn active_categories(emotion: &Emotion, preferences: &WeightMap) -> Vec<String> {
    if preferences.is_empty() {
        return fallback_categories(emotion)
            .iter()
            .map(|category| category.to_string())
            .collect();
    }
    preferences
        .ranked()
        .into_iter()
        .take(MAX_ACTIVE_CATEGORIES)
        .map(|(category, _)| category.to_string())
        .collect()
}

/// Stated preferences lead; the emotion term trails.
pub(crate) fn search_vector(emotion: &Emotion, preferences: &WeightMap) -> String {
    let mut terms = active_categories(emotion, preferences);
    terms.push(emotion_search_term(emotion).to_string());
    terms.join(" ")
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Exclusions {
    /// Sliding window; may be relaxed to avoid starving the result.
    pub recently_served: HashSet<String>,
    /// Permanent.
    pub disliked: HashSet<String>,
}

pub(crate) fn filter_candidates(
    candidates: Vec<VideoItem>,
    exclusions: &Exclusions,
    limit: usize,
) -> Vec<VideoItem> {
    let mut seen = HashSet::new();
    let candidates: Vec<VideoItem> = candidates
        .into_iter()
        .filter(|item| !exclusions.disliked.contains(&item.id))
        .filter(|item| seen.insert(item.id.clone()))
        .collect();

    let available = candidates.len();
    let (mut kept, held_back): (Vec<VideoItem>, Vec<VideoItem>) = candidates
        .into_iter()
        .partition(|item| !exclusions.recently_served.contains(&item.id));

    if kept.len() < BACKFILL_FLOOR && available > BACKFILL_FLOOR {
        let missing = BACKFILL_FLOOR - kept.len();
        log::debug!("backfilling {} recently served videos", missing);
        kept.extend(held_back.into_iter().take(missing));
    }
    kept.truncate(limit);
    kept
}

/// Shown when the video source cannot help.
pub(crate) fn fallback_videos() -> Vec<VideoItem> {
    let entries = [
        (
            "lumeo-fallback-breathing",
            "5-Minute Guided Breathing for Calm",
            "A slow, guided breathing session to settle your nervous system.",
        ),
        (
            "lumeo-fallback-meditation",
            "10-Minute Mindfulness Meditation",
            "A gentle body scan and mindful awareness practice.",
        ),
        (
            "lumeo-fallback-nature",
            "Forest Stream Sounds for Relaxation",
            "Flowing water and birdsong to help you unwind.",
        ),
        (
            "lumeo-fallback-sleep",
            "Soft Rain for Deep Sleep",
            "Steady rainfall to quiet the mind before bed.",
        ),
    ];
    entries
        .iter()
        .map(|(id, title, description)| VideoItem {
            id: id.to_string(),
            title: title.to_string(),
            channel_title: "Lumeo".to_string(),
            thumbnail_url: String::new(),
            description: description.to_string(),
        })
        .collect()
}

pub(crate) struct RecommendationSelector {
    source: Arc<dyn VideoSource>,
    timeout: Duration,
}

impl RecommendationSelector {
    pub(crate) fn new(source: Arc<dyn VideoSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// Never fails: source trouble yields `fallback_videos`, minus dislikes.
    pub(crate) async fn select(
        &self,
        emotion: &Emotion,
        preferences: &WeightMap,
        exclusions: &Exclusions,
        limit: usize,
    ) -> Vec<VideoItem> {
        let query = search_vector(emotion, preferences);
        match self.try_select(&query, exclusions, limit).await {
            Ok(items) => items,
            Err(reason) => {
                log::warn!("video selection for {:?} fell back: {}", query, reason);
                fallback_videos()
                    .into_iter()
                    .filter(|item| !exclusions.disliked.contains(&item.id))
                    .take(limit)
                    .collect()
            }
        }
    }

    async fn try_select(
        &self,
        query: &str,
        exclusions: &Exclusions,
        limit: usize,
    ) -> Result<Vec<VideoItem>, FallbackReason> {
        let candidates =
            with_timeout(self.timeout, self.source.search(query, limit.saturating_mul(2))).await?;
        if candidates.is_empty() {
            return Err(UpstreamError::Empty.into());
        }
        let picked = filter_candidates(candidates, exclusions, limit);
        if picked.is_empty() {
            return Err(FallbackReason::Exhausted);
        }
        Ok(picked)
    }
}
