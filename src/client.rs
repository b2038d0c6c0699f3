use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use openai_api_rust::{
    chat::{ChatApi as _, ChatBody},
    OpenAI, Role as OpenAiRole,
};

use crate::{
    error::{with_timeout, UpstreamError},
    sources::Unconfigured,
    types::{AssistantMessage, ChatMessage, Role},
};

pub(crate) static DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Said when the chat model cannot be reached. The conversation goes on.
pub(crate) static FALLBACK_REPLY: &str =
    "I'm here with you. I couldn't put my thoughts together just now, but I'm listening. \
     Would you like to tell me a bit more?";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompletionOptions {
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: i32,
    /// Ask for a single JSON object as the answer.
    pub json: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.7,
            max_tokens: 300,
            json: false,
        }
    }
}

#[async_trait]
pub(crate) trait ChatCompleter: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<String, UpstreamError>;
}

pub(crate) struct OpenAiCompleter {
    openai: Arc<OpenAI>,
    model: String,
}

impl OpenAiCompleter {
    pub(crate) fn new(openai: OpenAI, model: impl Into<String>) -> Self {
        Self {
            openai: Arc::new(openai),
            model: model.into(),
        }
    }
}

fn to_openai_message(message: ChatMessage) -> openai_api_rust::Message {
    let role = match message.role {
        Role::System => OpenAiRole::System,
        Role::User => OpenAiRole::User,
        Role::Assistant => OpenAiRole::Assistant,
    };
    openai_api_rust::Message {
        role,
        content: message.content,
    }
}

#[async_trait]
impl ChatCompleter for OpenAiCompleter {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<String, UpstreamError> {
        let mut messages: Vec<openai_api_rust::Message> =
            messages.into_iter().map(to_openai_message).collect();
        // openai_api_rust has no response_format field, so JSON mode is an instruction.
        if options.json {
            messages.push(openai_api_rust::Message {
                role: OpenAiRole::System,
                content: "Answer with a single JSON object and nothing else.".to_string(),
            });
        }

        let body = ChatBody {
            model: options.model.unwrap_or_else(|| self.model.clone()),
            max_tokens: Some(options.max_tokens),
            temperature: Some(options.temperature),
            top_p: None,
            n: Some(1),
            stream: Some(false),
            stop: None,
            presence_penalty: None,
            frequency_penalty: None,
            logit_bias: None,
            user: None,
            messages,
        };

        // The client is blocking.
        let openai = Arc::clone(&self.openai);
        let completion = tokio::task::spawn_blocking(move || openai.chat_completion_create(&body))
            .await
            .map_err(|err| UpstreamError::Transport(err.to_string()))?
            .map_err(|err| UpstreamError::Transport(format!("{:?}", err)))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(UpstreamError::Empty)?;
        if choice.finish_reason.as_deref() != Some("stop") {
            log::warn!("completion finish reason is {:?}", choice.finish_reason);
        }
        let answer = choice.message.ok_or(UpstreamError::Empty)?;
        if answer.content.trim().is_empty() {
            return Err(UpstreamError::Empty);
        }
        Ok(answer.content)
    }
}

#[async_trait]
impl ChatCompleter for Unconfigured {
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _options: CompletionOptions,
    ) -> Result<String, UpstreamError> {
        Err(UpstreamError::Unconfigured(self.0))
    }
}

/// Produces the companion's reply to `messages`. Any failure becomes
/// `FALLBACK_REPLY`.
pub(crate) async fn get_answer(
    completer: &dyn ChatCompleter,
    messages: Vec<ChatMessage>,
    options: CompletionOptions,
    timeout: Duration,
) -> AssistantMessage {
    let content = match with_timeout(timeout, completer.complete(messages, options)).await {
        Ok(content) => content.trim().to_string(),
        Err(err) => {
            log::warn!("chat reply failed, using fallback: {}", err);
            FALLBACK_REPLY.to_string()
        }
    };
    AssistantMessage {
        content,
        time: Utc::now(),
    }
}
