use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::{Emotion, EmotionAnalysis};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InterventionKind {
    Breathing,
    Image,
    Video,
}

impl InterventionKind {
    /// Text surfaced together with the chat reply, before the delayed part.
    pub(crate) fn lead_in(self) -> Option<&'static str> {
        match self {
            InterventionKind::Breathing => Some(
                "It sounds like a lot is racing through your mind. \
                 When you're ready, let's try a short breathing exercise together.",
            ),
            InterventionKind::Video => Some(
                "I have a few calming videos that might help. I'll pull them up in a moment.",
            ),
            InterventionKind::Image => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Intervention {
    pub kind: InterventionKind,
    pub trigger_emotion: Emotion,
    pub trigger_intensity: f32,
    pub delay: Duration,
}

#[derive(Clone, Copy)]
pub(crate) struct PolicyRow {
    pub kind: InterventionKind,
    pub matches: fn(&Emotion) -> bool,
    /// Intensity must be strictly above this.
    pub threshold: f32,
    pub delay_ms: u64,
}

fn is_anxiety(emotion: &Emotion) -> bool {
    matches!(emotion, Emotion::Anxiety)
}

fn is_sadness_or_fear(emotion: &Emotion) -> bool {
    matches!(emotion, Emotion::Sadness | Emotion::Fear)
}

fn is_stress_family(emotion: &Emotion) -> bool {
    matches!(
        emotion,
        Emotion::Stress | Emotion::Overwhelmed | Emotion::Depression
    )
}

/// Checked top to bottom; the first matching row is the only intervention of the turn.
pub(crate) const POLICY: [PolicyRow; 3] = [
    PolicyRow {
        kind: InterventionKind::Breathing,
        matches: is_anxiety,
        threshold: 0.6,
        delay_ms: 4000,
    },
    PolicyRow {
        kind: InterventionKind::Image,
        matches: is_sadness_or_fear,
        threshold: 0.5,
        delay_ms: 3000,
    },
    PolicyRow {
        kind: InterventionKind::Video,
        matches: is_stress_family,
        threshold: 0.4,
        delay_ms: 3000,
    },
];

pub(crate) fn decide(analysis: &EmotionAnalysis) -> Vec<Intervention> {
    decide_with(&POLICY, analysis)
}

pub(crate) fn decide_with(policy: &[PolicyRow], analysis: &EmotionAnalysis) -> Vec<Intervention> {
    policy
        .iter()
        .find(|row| (row.matches)(&analysis.primary_emotion) && analysis.intensity() > row.threshold)
        .map(|row| Intervention {
            kind: row.kind,
            trigger_emotion: analysis.primary_emotion.clone(),
            trigger_intensity: analysis.intensity(),
            delay: Duration::from_millis(row.delay_ms),
        })
        .into_iter()
        .collect()
}

/// Releases interventions after their delay unless the owning session is
/// cancelled first.
pub(crate) struct InterventionScheduler {
    token: CancellationToken,
    deliveries: mpsc::UnboundedSender<Intervention>,
}

impl InterventionScheduler {
    pub(crate) fn new(
        token: CancellationToken,
        deliveries: mpsc::UnboundedSender<Intervention>,
    ) -> Self {
        Self { token, deliveries }
    }

    pub(crate) fn schedule(&self, intervention: Intervention) {
        let token = self.token.clone();
        let deliveries = self.deliveries.clone();
        let delay = intervention.delay;
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    log::debug!("session closed, dropping pending {:?} intervention", intervention.kind);
                }
                _ = tokio::time::sleep(delay) => {
                    if deliveries.send(intervention).is_err() {
                        log::debug!("no receiver left for intervention");
                    }
                }
            }
        });
    }
}

/// 4-7-8 pattern, four cycles.
pub(crate) fn breathing_steps() -> Vec<(&'static str, u64)> {
    let cycle = [("Breathe in through your nose", 4), ("Hold", 7), ("Breathe out slowly", 8)];
    cycle.iter().copied().cycle().take(cycle.len() * 4).collect()
}
