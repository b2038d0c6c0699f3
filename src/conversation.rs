use chrono::Utc;

use crate::types::{AssistantMessage, ChatMessage, SystemMessage, Turn, UserMessage};

/// Append-only transcript of one session. The first turn is always the
/// system instruction.
#[derive(Debug, Clone)]
pub(crate) struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub(crate) fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::System(SystemMessage {
                content: system_prompt.into(),
                time: Utc::now(),
            })],
        }
    }

    pub(crate) fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::User(UserMessage {
            content: content.into(),
            time: Utc::now(),
        }));
    }

    pub(crate) fn push_assistant(&mut self, message: AssistantMessage) {
        self.turns.push(Turn::Assistant(message));
    }

    pub(crate) fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Messages for the chat model. `hint` is a one-off system note placed
    /// before the latest user message; it is not kept in the transcript.
    pub(crate) fn to_messages(&self, hint: Option<&str>) -> Vec<ChatMessage> {
        let mut messages: Vec<ChatMessage> = self.turns.iter().map(ChatMessage::from).collect();
        if let Some(hint) = hint {
            let at = match self.turns.last() {
                Some(Turn::User(_)) => messages.len() - 1,
                _ => messages.len(),
            };
            messages.insert(
                at,
                ChatMessage::system(format!("Guidance for this reply: {}", hint)),
            );
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn starts_with_system_instruction() {
        let conversation = Conversation::new("Be kind.");
        assert_eq!(conversation.turns().len(), 1);
        assert!(matches!(conversation.turns()[0], Turn::System(_)));
        assert_eq!(conversation.turns()[0].content(), "Be kind.");
    }

    #[test]
    fn hint_goes_before_latest_user_message_only_for_that_call() {
        let mut conversation = Conversation::new("Be kind.");
        conversation.push_user("I'm so tired");
        let messages = conversation.to_messages(Some("Validate the tiredness."));

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::System);
        assert!(messages[1].content.contains("Validate the tiredness."));
        assert_eq!(messages[2], ChatMessage::user("I'm so tired"));
        assert_eq!(conversation.to_messages(None).len(), 2);
        assert_eq!(conversation.turns().len(), 2);
    }
}
