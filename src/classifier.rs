use std::{sync::Arc, time::Duration};

use serde::Deserialize;

use crate::{
    client::{ChatCompleter, CompletionOptions},
    error::{with_timeout, FallbackReason},
    types::{ChatMessage, Emotion, EmotionAnalysis, Sentiment},
};

static INSTRUCTION: &str = "You analyse the emotional state behind a single user message. \
Reply with one JSON object with exactly these keys: \
\"primaryEmotion\" (one of anxiety, sadness, anger, fear, joy, neutral, stress, overwhelmed, depression, or another single word), \
\"secondaryEmotion\" (same vocabulary or null), \
\"intensity\" (number from 0 to 1), \
\"sentiment\" (positive, negative or neutral), \
\"suggestedApproach\" (one short sentence on how to respond supportively).";

const MAX_TOKENS: i32 = 150;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    primary_emotion: Option<String>,
    secondary_emotion: Option<String>,
    intensity: Option<f64>,
    sentiment: Option<String>,
    suggested_approach: Option<String>,
}

pub(crate) struct EmotionClassifier {
    completer: Arc<dyn ChatCompleter>,
    model: String,
    timeout: Duration,
}

impl EmotionClassifier {
    pub(crate) fn new(
        completer: Arc<dyn ChatCompleter>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            completer,
            model: model.into(),
            timeout,
        }
    }

    /// Never fails: anything that goes wrong yields `EmotionAnalysis::neutral`.
    pub(crate) async fn classify(&self, text: &str) -> EmotionAnalysis {
        match self.try_classify(text).await {
            Ok(analysis) => analysis,
            Err(FallbackReason::EmptyInput) => EmotionAnalysis::neutral(),
            Err(reason) => {
                log::warn!("emotion classification fell back to neutral: {}", reason);
                EmotionAnalysis::neutral()
            }
        }
    }

    async fn try_classify(&self, text: &str) -> Result<EmotionAnalysis, FallbackReason> {
        let text = text.trim();
        if text.is_empty() {
            return Err(FallbackReason::EmptyInput);
        }
        let options = CompletionOptions {
            model: Some(self.model.clone()),
            temperature: 0.,
            max_tokens: MAX_TOKENS,
            json: true,
        };
        let messages = vec![
            ChatMessage::system(INSTRUCTION),
            ChatMessage::user(text),
        ];
        let reply = with_timeout(self.timeout, self.completer.complete(messages, options)).await?;
        let analysis = parse_analysis(&reply)?;
        log::debug!(
            "classified message as {} ({:.2}, {:?})",
            analysis.primary_emotion,
            analysis.intensity(),
            analysis.sentiment
        );
        Ok(analysis)
    }
}

/// Outermost `{ ... }` span, which also strips Markdown fences and chatter.
fn json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

pub(crate) fn parse_analysis(reply: &str) -> Result<EmotionAnalysis, FallbackReason> {
    let body = json_object(reply)
        .ok_or_else(|| FallbackReason::Malformed("no JSON object in reply".to_string()))?;
    let raw: RawAnalysis =
        serde_json::from_str(body).map_err(|err| FallbackReason::Malformed(err.to_string()))?;

    let primary = raw
        .primary_emotion
        .ok_or_else(|| FallbackReason::Malformed("missing primaryEmotion".to_string()))?;
    let intensity = raw
        .intensity
        .ok_or_else(|| FallbackReason::Malformed("missing intensity".to_string()))?;
    let sentiment = raw
        .sentiment
        .ok_or_else(|| FallbackReason::Malformed("missing sentiment".to_string()))?;

    let mut analysis = EmotionAnalysis::new(
        Emotion::parse(&primary),
        intensity as f32,
        Sentiment::parse(&sentiment),
    );
    analysis.secondary_emotion = raw
        .secondary_emotion
        .filter(|label| !label.trim().is_empty())
        .map(|label| Emotion::parse(&label));
    analysis.suggested_approach = raw
        .suggested_approach
        .map(|hint| hint.trim().to_string())
        .filter(|hint| !hint.is_empty());
    Ok(analysis)
}
