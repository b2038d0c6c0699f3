//! In-memory stand-ins for the external collaborators.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    client::{ChatCompleter, CompletionOptions},
    error::UpstreamError,
    sources::{ImageGenerator, ImageSize, VideoSource},
    types::{ChatMessage, VideoItem},
};

pub(crate) fn video(id: &str, title: &str) -> VideoItem {
    VideoItem {
        id: id.to_string(),
        title: title.to_string(),
        channel_title: "Test Channel".to_string(),
        thumbnail_url: format!("https://thumbs.test/{}.jpg", id),
        description: String::new(),
    }
}

/// Answers with queued results, then with a fixed reply once the queue is drained.
pub(crate) struct ScriptedCompleter {
    replies: Mutex<VecDeque<Result<String, UpstreamError>>>,
    requests: Mutex<Vec<(Vec<ChatMessage>, CompletionOptions)>>,
    calls: AtomicUsize,
}

impl ScriptedCompleter {
    pub(crate) fn new(replies: Vec<Result<String, UpstreamError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<(Vec<ChatMessage>, CompletionOptions)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChatCompleter for ScriptedCompleter {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<String, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push((messages, options));
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok("I hear you.".to_string()))
    }
}

/// Never answers in time.
pub(crate) struct StallingCompleter;

#[async_trait]
impl ChatCompleter for StallingCompleter {
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> Result<String, UpstreamError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("too late".to_string())
    }
}

pub(crate) struct FakeVideoSource {
    items: Vec<VideoItem>,
    fail: bool,
    queries: Mutex<Vec<(String, usize)>>,
}

impl FakeVideoSource {
    pub(crate) fn with_items(items: Vec<VideoItem>) -> Self {
        Self {
            items,
            fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::with_items(Vec::new())
        }
    }

    pub(crate) fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl VideoSource for FakeVideoSource {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<VideoItem>, UpstreamError> {
        self.queries.lock().push((query.to_string(), max_results));
        if self.fail {
            return Err(UpstreamError::Status(503));
        }
        Ok(self.items.iter().take(max_results).cloned().collect())
    }
}

/// Never answers in time.
pub(crate) struct StallingVideoSource;

#[async_trait]
impl VideoSource for StallingVideoSource {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<VideoItem>, UpstreamError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Vec::new())
    }
}

pub(crate) struct FakeImageGenerator {
    fail: bool,
    prompts: Mutex<Vec<(String, ImageSize)>>,
}

impl FakeImageGenerator {
    pub(crate) fn new() -> Self {
        Self {
            fail: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub(crate) fn prompts(&self) -> Vec<(String, ImageSize)> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ImageGenerator for FakeImageGenerator {
    async fn generate(&self, prompt: &str, size: ImageSize) -> Result<String, UpstreamError> {
        let mut prompts = self.prompts.lock();
        prompts.push((prompt.to_string(), size));
        if self.fail {
            return Err(UpstreamError::Transport("connection reset".to_string()));
        }
        Ok(format!("https://images.test/{}.png", prompts.len()))
    }
}
