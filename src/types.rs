use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub(crate) enum Emotion {
    Anxiety,
    Sadness,
    Anger,
    Fear,
    Joy,
    Neutral,
    Stress,
    Overwhelmed,
    Depression,
    Other(String),
}

impl Emotion {
    /// Maps a model-produced label onto the known set. Unknown labels are kept
    /// lowercased in `Other`, blank ones become `Neutral`.
    pub(crate) fn parse(raw: &str) -> Self {
        let label = raw.trim().to_lowercase();
        match label.as_str() {
            "" | "neutral" | "calm" | "none" => Emotion::Neutral,
            "anxiety" | "anxious" | "nervous" | "worried" | "worry" => Emotion::Anxiety,
            "sadness" | "sad" | "grief" | "lonely" | "loneliness" => Emotion::Sadness,
            "anger" | "angry" | "frustration" | "frustrated" | "irritated" => Emotion::Anger,
            "fear" | "afraid" | "scared" | "fearful" | "panic" => Emotion::Fear,
            "joy" | "happy" | "happiness" | "excited" | "content" => Emotion::Joy,
            "stress" | "stressed" | "tense" => Emotion::Stress,
            "overwhelmed" | "overwhelm" => Emotion::Overwhelmed,
            "depression" | "depressed" | "hopeless" => Emotion::Depression,
            _ => Emotion::Other(label),
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        match self {
            Emotion::Anxiety => "anxiety",
            Emotion::Sadness => "sadness",
            Emotion::Anger => "anger",
            Emotion::Fear => "fear",
            Emotion::Joy => "joy",
            Emotion::Neutral => "neutral",
            Emotion::Stress => "stress",
            Emotion::Overwhelmed => "overwhelmed",
            Emotion::Depression => "depression",
            Emotion::Other(label) => label,
        }
    }
}

impl From<String> for Emotion {
    fn from(raw: String) -> Self {
        Emotion::parse(&raw)
    }
}

impl From<Emotion> for String {
    fn from(emotion: Emotion) -> Self {
        emotion.as_str().to_string()
    }
}

impl Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub(crate) fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }
}

pub(crate) fn clamp_intensity(raw: f32) -> f32 {
    if raw.is_nan() {
        0.
    } else {
        raw.clamp(0., 1.)
    }
}

/// One classifier judgment. `intensity` is private so every value in
/// circulation went through `clamp_intensity`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EmotionAnalysis {
    pub primary_emotion: Emotion,
    pub secondary_emotion: Option<Emotion>,
    intensity: f32,
    pub sentiment: Sentiment,
    pub suggested_approach: Option<String>,
}

impl EmotionAnalysis {
    pub(crate) fn new(primary_emotion: Emotion, intensity: f32, sentiment: Sentiment) -> Self {
        Self {
            primary_emotion,
            secondary_emotion: None,
            intensity: clamp_intensity(intensity),
            sentiment,
            suggested_approach: None,
        }
    }

    pub(crate) fn neutral() -> Self {
        Self::new(Emotion::Neutral, 0., Sentiment::Neutral)
    }

    pub(crate) fn intensity(&self) -> f32 {
        self.intensity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub(crate) fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub(crate) fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub(crate) fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SystemMessage {
    pub content: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct UserMessage {
    pub content: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AssistantMessage {
    pub content: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub(crate) enum Turn {
    System(SystemMessage),
    User(UserMessage),
    Assistant(AssistantMessage),
}

impl Turn {
    pub(crate) fn content(&self) -> &str {
        match self {
            Turn::System(message) => &message.content,
            Turn::User(message) => &message.content,
            Turn::Assistant(message) => &message.content,
        }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        match turn {
            Turn::System(message) => ChatMessage::system(message.content.clone()),
            Turn::User(message) => ChatMessage::user(message.content.clone()),
            Turn::Assistant(message) => ChatMessage::assistant(message.content.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct VideoItem {
    pub id: String,
    pub title: String,
    pub channel_title: String,
    pub thumbnail_url: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Feedback {
    Like,
    Dislike,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct HistoryEntry {
    pub item_id: String,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

impl HistoryEntry {
    pub(crate) fn served(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            time: Utc::now(),
            feedback: None,
        }
    }

    pub(crate) fn with_feedback(item_id: impl Into<String>, feedback: Feedback) -> Self {
        Self {
            feedback: Some(feedback),
            ..Self::served(item_id)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct MoodEntry {
    pub emotion: Emotion,
    pub intensity: f32,
    pub sentiment: Sentiment,
    pub time: DateTime<Utc>,
}

impl From<&EmotionAnalysis> for MoodEntry {
    fn from(analysis: &EmotionAnalysis) -> Self {
        Self {
            emotion: analysis.primary_emotion.clone(),
            intensity: analysis.intensity(),
            sentiment: analysis.sentiment,
            time: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emotion_labels_map_onto_known_variants() {
        assert_eq!(Emotion::parse(" Anxious "), Emotion::Anxiety);
        assert_eq!(Emotion::parse("STRESSED"), Emotion::Stress);
        assert_eq!(Emotion::parse(""), Emotion::Neutral);
        assert_eq!(
            Emotion::parse("Nostalgia"),
            Emotion::Other("nostalgia".to_string())
        );
    }

    #[test]
    fn emotion_serializes_as_plain_label() {
        let json = serde_json::to_string(&Emotion::Overwhelmed).unwrap();
        assert_eq!(json, "\"overwhelmed\"");
        let back: Emotion = serde_json::from_str("\"Depressed\"").unwrap();
        assert_eq!(back, Emotion::Depression);
    }

    #[test]
    fn intensity_is_clamped_on_construction() {
        assert_eq!(
            EmotionAnalysis::new(Emotion::Joy, 1.7, Sentiment::Positive).intensity(),
            1.
        );
        assert_eq!(
            EmotionAnalysis::new(Emotion::Fear, -0.2, Sentiment::Negative).intensity(),
            0.
        );
        assert_eq!(
            EmotionAnalysis::new(Emotion::Fear, f32::NAN, Sentiment::Negative).intensity(),
            0.
        );
    }

    #[test]
    fn unknown_sentiment_is_neutral() {
        assert_eq!(Sentiment::parse("Negative"), Sentiment::Negative);
        assert_eq!(Sentiment::parse("mixed"), Sentiment::Neutral);
    }
}
