use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    classifier::EmotionClassifier,
    client::{get_answer, ChatCompleter, CompletionOptions},
    conversation::Conversation,
    images::{ImageCurator, TherapeuticImage},
    mood::MoodStats,
    orchestrator::{self, Intervention, InterventionScheduler},
    preferences::PreferenceBook,
    selector::RecommendationSelector,
    sources::{ImageGenerator, VideoSource},
    store::Store,
    types::{Emotion, EmotionAnalysis, HistoryEntry, MoodEntry, Turn, VideoItem},
};

/// Queue depth of one session before `submit` waits.
const SESSION_QUEUE: usize = 16;

#[derive(Debug, Clone)]
pub(crate) struct CompanionSettings {
    pub chat_model: String,
    pub classifier_model: String,
    pub max_reply_tokens: i32,
    pub request_timeout: Duration,
    pub recent_window: usize,
    pub video_limit: usize,
}

/// Shared engine behind every session.
pub(crate) struct Companion {
    completer: Arc<dyn ChatCompleter>,
    classifier: EmotionClassifier,
    selector: RecommendationSelector,
    images: ImageCurator,
    preferences: PreferenceBook,
    store: Arc<dyn Store>,
    settings: CompanionSettings,
}

impl Companion {
    pub(crate) fn new(
        completer: Arc<dyn ChatCompleter>,
        videos: Arc<dyn VideoSource>,
        images: Arc<dyn ImageGenerator>,
        store: Arc<dyn Store>,
        settings: CompanionSettings,
    ) -> Self {
        let timeout = settings.request_timeout;
        Self {
            classifier: EmotionClassifier::new(
                Arc::clone(&completer),
                settings.classifier_model.clone(),
                timeout,
            ),
            selector: RecommendationSelector::new(videos, timeout),
            images: ImageCurator::new(images, timeout),
            preferences: PreferenceBook::new(Arc::clone(&store)),
            completer,
            store,
            settings,
        }
    }

    pub(crate) fn preferences(&self) -> &PreferenceBook {
        &self.preferences
    }

    pub(crate) async fn recommend_videos(
        &self,
        user: &str,
        emotion: &Emotion,
        limit: usize,
    ) -> Vec<VideoItem> {
        let weights = self.preferences.weights(user).await;
        let exclusions = self
            .preferences
            .exclusions(user, self.settings.recent_window)
            .await;
        let items = self.selector.select(emotion, &weights, &exclusions, limit).await;
        let served: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        self.preferences.record_served(user, &served).await;
        items
    }

    pub(crate) async fn therapeutic_image(&self, user: &str, emotion: &Emotion) -> TherapeuticImage {
        let recent = self
            .preferences
            .recent(user, self.settings.recent_window)
            .await;
        let image = self.images.create(emotion, &recent).await;
        if !image.fallback {
            if let Err(err) = self
                .store
                .append_history(user, HistoryEntry::served(image.history_id.clone()))
                .await
            {
                log::warn!("cannot record generated image: {}", err);
            }
        }
        image
    }

    pub(crate) async fn mood_stats(&self, user: &str) -> MoodStats {
        let entries = self.store.get_moods(user).await.unwrap_or_else(|err| {
            log::warn!("cannot load mood journal of {}: {}", user, err);
            Vec::new()
        });
        MoodStats::from_entries(&entries)
    }

    pub(crate) fn video_limit(&self) -> usize {
        self.settings.video_limit
    }

    async fn take_turn(
        &self,
        user: &str,
        conversation: &mut Conversation,
        scheduler: &InterventionScheduler,
        text: &str,
    ) -> TurnOutcome {
        let analysis = self.classifier.classify(text).await;
        conversation.push_user(text);

        if !text.trim().is_empty() {
            if let Err(err) = self.store.append_mood(user, MoodEntry::from(&analysis)).await {
                log::warn!("cannot record mood entry: {}", err);
            }
        }

        let scheduled = orchestrator::decide(&analysis);
        let lead_in = scheduled.first().and_then(|intervention| intervention.kind.lead_in());
        for intervention in &scheduled {
            log::info!(
                "scheduling {:?} for {} ({:.2}) in {:?}",
                intervention.kind,
                intervention.trigger_emotion,
                intervention.trigger_intensity,
                intervention.delay
            );
            scheduler.schedule(intervention.clone());
        }

        let options = CompletionOptions {
            model: Some(self.settings.chat_model.clone()),
            max_tokens: self.settings.max_reply_tokens,
            ..CompletionOptions::default()
        };
        let answer = get_answer(
            self.completer.as_ref(),
            conversation.to_messages(analysis.suggested_approach.as_deref()),
            options,
            self.settings.request_timeout,
        )
        .await;
        let reply = answer.content.clone();
        conversation.push_assistant(answer);

        TurnOutcome {
            reply,
            analysis,
            lead_in,
            scheduled,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TurnOutcome {
    pub reply: String,
    pub analysis: EmotionAnalysis,
    pub lead_in: Option<&'static str>,
    pub scheduled: Vec<Intervention>,
}

enum SessionCommand {
    Turn {
        text: String,
        respond_to: oneshot::Sender<TurnOutcome>,
    },
    Transcript {
        respond_to: oneshot::Sender<Vec<Turn>>,
    },
}

/// One user's conversation. Messages are handled strictly one after another.
pub(crate) struct Session {
    id: Uuid,
    commands: mpsc::Sender<SessionCommand>,
    token: CancellationToken,
    worker: JoinHandle<Conversation>,
}

impl Session {
    /// Returns the session and the receiver of its due interventions.
    pub(crate) fn start(
        companion: Arc<Companion>,
        user: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<Intervention>) {
        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        let (commands, inbox) = mpsc::channel(SESSION_QUEUE);
        let (deliveries, delivered) = mpsc::unbounded_channel();
        let scheduler = InterventionScheduler::new(token.clone(), deliveries);
        let worker = tokio::spawn(run_session(
            companion,
            user.into(),
            Conversation::new(system_prompt),
            inbox,
            scheduler,
            token.clone(),
        ));
        log::debug!("session {} started", id);
        (
            Self {
                id,
                commands,
                token,
                worker,
            },
            delivered,
        )
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }

    /// `None` once the session is cancelled, including while the turn is
    /// still waiting on the model.
    pub(crate) async fn submit(&self, text: impl Into<String>) -> Option<TurnOutcome> {
        if self.token.is_cancelled() {
            return None;
        }
        let (respond_to, outcome) = oneshot::channel();
        let turn = async {
            self.commands
                .send(SessionCommand::Turn {
                    text: text.into(),
                    respond_to,
                })
                .await
                .ok()?;
            outcome.await.ok()
        };
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            outcome = turn => outcome,
        }
    }

    pub(crate) async fn transcript(&self) -> Vec<Turn> {
        let (respond_to, transcript) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Transcript { respond_to })
            .await
            .is_err()
        {
            return Vec::new();
        }
        transcript.await.unwrap_or_default()
    }

    /// Cancels pending interventions and returns the final transcript.
    pub(crate) async fn close(self) -> Option<Conversation> {
        self.token.cancel();
        drop(self.commands);
        match self.worker.await {
            Ok(conversation) => {
                log::debug!("session {} closed", self.id);
                Some(conversation)
            }
            Err(err) => {
                log::error!("session {} worker failed: {}", self.id, err);
                None
            }
        }
    }
}

async fn run_session(
    companion: Arc<Companion>,
    user: String,
    mut conversation: Conversation,
    mut inbox: mpsc::Receiver<SessionCommand>,
    scheduler: InterventionScheduler,
    token: CancellationToken,
) -> Conversation {
    loop {
        let command = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            command = inbox.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };
        match command {
            SessionCommand::Turn { text, respond_to } => {
                let turn = companion.take_turn(&user, &mut conversation, &scheduler, &text);
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        log::debug!("session cancelled in the middle of a turn");
                        break;
                    }
                    outcome = turn => {
                        let _ = respond_to.send(outcome);
                    }
                }
            }
            SessionCommand::Transcript { respond_to } => {
                let _ = respond_to.send(conversation.turns().to_vec());
            }
        }
    }
    conversation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::FALLBACK_REPLY,
        orchestrator::InterventionKind,
        store::MemoryStore,
        testing::{video, FakeImageGenerator, FakeVideoSource, ScriptedCompleter, StallingCompleter},
        types::Sentiment,
    };

    fn settings() -> CompanionSettings {
        CompanionSettings {
            chat_model: "chat-model".to_string(),
            classifier_model: "classifier-model".to_string(),
            max_reply_tokens: 200,
            request_timeout: Duration::from_secs(10),
            recent_window: 20,
            video_limit: 3,
        }
    }

    fn companion(
        completer: Arc<dyn ChatCompleter>,
        videos: Vec<VideoItem>,
        store: Arc<MemoryStore>,
    ) -> Arc<Companion> {
        Arc::new(Companion::new(
            completer,
            Arc::new(FakeVideoSource::with_items(videos)),
            Arc::new(FakeImageGenerator::new()),
            store,
            settings(),
        ))
    }

    fn classification(emotion: &str, intensity: f32) -> Result<String, crate::error::UpstreamError> {
        Ok(format!(
            r#"{{"primaryEmotion":"{}","intensity":{},"sentiment":"negative"}}"#,
            emotion, intensity
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn anxious_turn_schedules_breathing_and_records_mood() {
        let completer = Arc::new(ScriptedCompleter::new(vec![
            classification("anxiety", 0.8),
            Ok("Let's slow down together.".to_string()),
        ]));
        let store = Arc::new(MemoryStore::new());
        let (session, mut delivered) =
            Session::start(companion(completer.clone(), vec![], store.clone()), "ana", "Be kind.");

        let outcome = session.submit("My heart is racing").await.unwrap();
        assert_eq!(outcome.reply, "Let's slow down together.");
        assert_eq!(outcome.analysis.primary_emotion, Emotion::Anxiety);
        assert_eq!(outcome.scheduled.len(), 1);
        assert!(outcome.lead_in.is_some());

        let due = delivered.recv().await.unwrap();
        assert_eq!(due.kind, InterventionKind::Breathing);
        assert_eq!(due.delay, Duration::from_millis(4000));

        let moods = store.get_moods("ana").await.unwrap();
        assert_eq!(moods.len(), 1);
        assert_eq!(moods[0].sentiment, Sentiment::Negative);

        let (chat_messages, chat_options) = completer.requests().remove(1);
        assert_eq!(chat_options.model.as_deref(), Some("chat-model"));
        assert_eq!(chat_messages[0].content, "Be kind.");
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn closing_discards_pending_interventions() {
        let completer = Arc::new(ScriptedCompleter::new(vec![
            classification("stress", 0.9),
            Ok("That's a lot.".to_string()),
        ]));
        let (session, mut delivered) = Session::start(
            companion(completer, vec![], Arc::new(MemoryStore::new())),
            "ana",
            "Be kind.",
        );
        let outcome = session.submit("Deadlines everywhere").await.unwrap();
        assert_eq!(outcome.scheduled[0].kind, InterventionKind::Video);

        let transcript = session.close().await.unwrap();
        assert_eq!(transcript.turns().len(), 3);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(delivered.try_recv().is_err());
    }

    #[tokio::test]
    async fn turns_are_answered_in_order() {
        let completer = Arc::new(ScriptedCompleter::new(vec![
            classification("neutral", 0.1),
            Ok("first".to_string()),
            classification("neutral", 0.1),
            Ok("second".to_string()),
        ]));
        let (session, _delivered) = Session::start(
            companion(completer, vec![], Arc::new(MemoryStore::new())),
            "ana",
            "Be kind.",
        );

        let (first, second) = tokio::join!(session.submit("one"), session.submit("two"));
        assert_eq!(first.unwrap().reply, "first");
        assert_eq!(second.unwrap().reply, "second");

        let transcript = session.transcript().await;
        let contents: Vec<&str> = transcript.iter().map(Turn::content).collect();
        assert_eq!(contents, vec!["Be kind.", "one", "first", "two", "second"]);
    }

    #[tokio::test]
    async fn failed_model_keeps_the_conversation_going() {
        let completer = Arc::new(ScriptedCompleter::new(vec![
            Err(crate::error::UpstreamError::Status(500)),
            Err(crate::error::UpstreamError::Status(500)),
        ]));
        let (session, _delivered) = Session::start(
            companion(completer, vec![], Arc::new(MemoryStore::new())),
            "ana",
            "Be kind.",
        );
        let outcome = session.submit("hello?").await.unwrap();
        assert_eq!(outcome.reply, FALLBACK_REPLY);
        assert_eq!(outcome.analysis, EmotionAnalysis::neutral());
        assert!(outcome.scheduled.is_empty());
    }

    #[tokio::test]
    async fn submit_after_cancel_returns_none() {
        let completer = Arc::new(ScriptedCompleter::new(vec![]));
        let (session, _delivered) = Session::start(
            companion(completer.clone(), vec![], Arc::new(MemoryStore::new())),
            "ana",
            "Be kind.",
        );
        session.cancellation().cancel();

        assert!(session.submit("anyone there?").await.is_none());
        assert_eq!(completer.calls(), 0);
        let transcript = session.close().await.unwrap();
        assert_eq!(transcript.turns().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_a_turn_waiting_on_the_model() {
        let (session, _delivered) = Session::start(
            companion(Arc::new(StallingCompleter), vec![], Arc::new(MemoryStore::new())),
            "ana",
            "Be kind.",
        );
        let token = session.cancellation();
        let started = tokio::time::Instant::now();

        let (outcome, _) = tokio::join!(session.submit("are you there?"), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });

        assert!(outcome.is_none());
        assert!(started.elapsed() < Duration::from_secs(10));
        session.close().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn served_videos_are_not_repeated_next_time() {
        let catalogue: Vec<VideoItem> = (1..=8)
            .map(|n| video(&format!("v{}", n), "Sleep meditation"))
            .collect();
        let store = Arc::new(MemoryStore::new());
        let companion = companion(Arc::new(ScriptedCompleter::new(vec![])), catalogue, store);

        let first = companion.recommend_videos("ana", &Emotion::Stress, 3).await;
        let second = companion.recommend_videos("ana", &Emotion::Stress, 3).await;
        let first_ids: Vec<&str> = first.iter().map(|item| item.id.as_str()).collect();
        let second_ids: Vec<&str> = second.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(first_ids, vec!["v1", "v2", "v3"]);
        assert_eq!(second_ids, vec!["v4", "v5", "v6"]);
    }

    #[tokio::test]
    async fn generated_images_rotate_scenes() {
        let companion = companion(
            Arc::new(ScriptedCompleter::new(vec![])),
            vec![],
            Arc::new(MemoryStore::new()),
        );
        let first = companion.therapeutic_image("ana", &Emotion::Sadness).await;
        let second = companion.therapeutic_image("ana", &Emotion::Sadness).await;
        assert_ne!(first.history_id, second.history_id);
    }

    #[tokio::test]
    async fn mood_stats_read_the_journal() {
        let completer = Arc::new(ScriptedCompleter::new(vec![
            classification("sadness", 0.3),
            Ok("ok".to_string()),
        ]));
        let store = Arc::new(MemoryStore::new());
        let companion = companion(completer, vec![], store);
        let (session, _delivered) = Session::start(Arc::clone(&companion), "ana", "Be kind.");
        session.submit("meh").await.unwrap();

        let stats = companion.mood_stats("ana").await;
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.dominant_emotion, Some(Emotion::Sadness));
    }
}
