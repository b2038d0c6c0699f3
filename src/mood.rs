use std::{collections::HashMap, fmt::Display};

use crate::types::{Emotion, MoodEntry, Sentiment};

const MIN_ENTRIES_FOR_TREND: usize = 4;
const TREND_MARGIN: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trend {
    Improving,
    Steady,
    Declining,
}

impl Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Trend::Improving => "improving",
            Trend::Steady => "steady",
            Trend::Declining => "declining",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MoodStats {
    pub entries: usize,
    pub average_intensity: f32,
    pub dominant_emotion: Option<Emotion>,
    /// `None` until there are enough entries to compare.
    pub trend: Option<Trend>,
}

/// Signed mood of one entry: positive sentiment counts up, negative down.
fn valence(entry: &MoodEntry) -> f32 {
    match entry.sentiment {
        Sentiment::Positive => entry.intensity,
        Sentiment::Negative => -entry.intensity,
        Sentiment::Neutral => 0.,
    }
}

fn mean(values: impl ExactSizeIterator<Item = f32>) -> f32 {
    let len = values.len();
    if len == 0 {
        return 0.;
    }
    values.sum::<f32>() / len as f32
}

impl MoodStats {
    /// `entries` must be in recording order.
    pub(crate) fn from_entries(entries: &[MoodEntry]) -> Self {
        let average_intensity = mean(entries.iter().map(|entry| entry.intensity));

        // Most frequent emotion; ties go to the one seen last.
        let mut counts: HashMap<&Emotion, (usize, usize)> = HashMap::new();
        for (position, entry) in entries.iter().enumerate() {
            let slot = counts.entry(&entry.emotion).or_insert((0, position));
            slot.0 += 1;
            slot.1 = position;
        }
        let dominant_emotion = counts
            .into_iter()
            .max_by_key(|(_, (count, last_seen))| (*count, *last_seen))
            .map(|(emotion, _)| emotion.clone());

        let trend = (entries.len() >= MIN_ENTRIES_FOR_TREND).then(|| {
            let (earlier, later) = entries.split_at(entries.len() / 2);
            let shift = mean(later.iter().map(valence)) - mean(earlier.iter().map(valence));
            if shift > TREND_MARGIN {
                Trend::Improving
            } else if shift < -TREND_MARGIN {
                Trend::Declining
            } else {
                Trend::Steady
            }
        });

        Self {
            entries: entries.len(),
            average_intensity,
            dominant_emotion,
            trend,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn entry(emotion: Emotion, intensity: f32, sentiment: Sentiment) -> MoodEntry {
        MoodEntry {
            emotion,
            intensity,
            sentiment,
            time: Utc::now(),
        }
    }

    #[test]
    fn empty_journal_has_no_stats() {
        let stats = MoodStats::from_entries(&[]);
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.average_intensity, 0.);
        assert_eq!(stats.dominant_emotion, None);
        assert_eq!(stats.trend, None);
    }

    #[test]
    fn dominant_emotion_prefers_frequency_then_recency() {
        let stats = MoodStats::from_entries(&[
            entry(Emotion::Stress, 0.5, Sentiment::Negative),
            entry(Emotion::Joy, 0.5, Sentiment::Positive),
            entry(Emotion::Stress, 0.5, Sentiment::Negative),
            entry(Emotion::Joy, 0.5, Sentiment::Positive),
        ]);
        assert_eq!(stats.dominant_emotion, Some(Emotion::Joy));
        assert!((stats.average_intensity - 0.5).abs() < 1e-6);
    }

    #[test]
    fn trend_compares_later_half_with_earlier_half() {
        let improving = MoodStats::from_entries(&[
            entry(Emotion::Sadness, 0.8, Sentiment::Negative),
            entry(Emotion::Sadness, 0.6, Sentiment::Negative),
            entry(Emotion::Neutral, 0.2, Sentiment::Neutral),
            entry(Emotion::Joy, 0.6, Sentiment::Positive),
        ]);
        assert_eq!(improving.trend, Some(Trend::Improving));

        let declining = MoodStats::from_entries(&[
            entry(Emotion::Joy, 0.7, Sentiment::Positive),
            entry(Emotion::Joy, 0.5, Sentiment::Positive),
            entry(Emotion::Stress, 0.6, Sentiment::Negative),
            entry(Emotion::Anxiety, 0.9, Sentiment::Negative),
        ]);
        assert_eq!(declining.trend, Some(Trend::Declining));

        let steady = MoodStats::from_entries(&[
            entry(Emotion::Neutral, 0.1, Sentiment::Neutral),
            entry(Emotion::Joy, 0.3, Sentiment::Positive),
            entry(Emotion::Neutral, 0.1, Sentiment::Neutral),
            entry(Emotion::Joy, 0.3, Sentiment::Positive),
        ]);
        assert_eq!(steady.trend, Some(Trend::Steady));
    }

    #[test]
    fn short_journal_has_no_trend() {
        let stats = MoodStats::from_entries(&[
            entry(Emotion::Joy, 0.9, Sentiment::Positive),
            entry(Emotion::Sadness, 0.9, Sentiment::Negative),
            entry(Emotion::Sadness, 0.9, Sentiment::Negative),
        ]);
        assert_eq!(stats.trend, None);
        assert_eq!(stats.dominant_emotion, Some(Emotion::Sadness));
    }
}
