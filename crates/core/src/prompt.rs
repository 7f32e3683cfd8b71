use serde::{Deserialize, Serialize};

use crate::message::{History, Role};

/// Opening line the widget shows before the first user turn.
pub const DEFAULT_GREETING: &str = "こんにちは！何かお困りですか？";

/// Speaker of one prompt entry handed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptRole {
    System,
    User,
    Ai,
}

impl From<Role> for PromptRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Self::User,
            Role::Ai => Self::Ai,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: PromptRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Fixed instructions prepended to every model invocation.
///
/// Loaded once from configuration and never derived from request data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaPrefix {
    system_prompt: String,
    greeting: Option<String>,
}

impl PersonaPrefix {
    /// Collapses every whitespace run of the system prompt into a single space
    /// and drops a blank greeting.
    pub fn new(system_prompt: impl AsRef<str>, greeting: Option<String>) -> Self {
        let system_prompt = system_prompt
            .as_ref()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let greeting = greeting
            .map(|greeting| greeting.trim().to_string())
            .filter(|greeting| !greeting.is_empty());

        Self {
            system_prompt,
            greeting,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn greeting(&self) -> Option<&str> {
        self.greeting.as_deref()
    }

    /// The prefix on its own, equal to `assemble` of an empty history.
    pub fn messages(&self) -> Vec<PromptMessage> {
        let mut messages = vec![PromptMessage::new(
            PromptRole::System,
            self.system_prompt.clone(),
        )];
        if let Some(greeting) = &self.greeting {
            messages.push(PromptMessage::new(PromptRole::Ai, greeting.clone()));
        }
        messages
    }

    /// Prefix followed by every history turn, order untouched.
    pub fn assemble(&self, history: &History) -> Vec<PromptMessage> {
        let mut prompt = self.messages();
        prompt.reserve(history.len());
        prompt.extend(
            history
                .iter()
                .map(|message| PromptMessage::new(message.role.into(), message.text.clone())),
        );
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn persona() -> PersonaPrefix {
        PersonaPrefix::new(
            "You are a support assistant.\n    Answer in Japanese.",
            Some(DEFAULT_GREETING.to_string()),
        )
    }

    #[test]
    fn system_prompt_whitespace_is_normalized() {
        assert_eq!(
            persona().system_prompt(),
            "You are a support assistant. Answer in Japanese."
        );
    }

    #[test]
    fn empty_history_assembles_to_prefix() {
        let persona = persona();

        assert_eq!(persona.assemble(&History::new()), persona.messages());
        assert_eq!(persona.messages().len(), 2);
        assert_eq!(persona.messages()[0].role, PromptRole::System);
    }

    #[test]
    fn history_follows_prefix_unchanged() {
        let persona = persona();
        let history = History::from(vec![
            Message::user("same"),
            Message::user("same"),
            Message::ai("reply"),
            Message::user(""),
        ]);

        let prompt = persona.assemble(&history);

        let prefix_len = persona.messages().len();
        assert_eq!(prompt[..prefix_len], persona.messages()[..]);
        let tail = prompt[prefix_len..]
            .iter()
            .map(|entry| (entry.role, entry.content.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            tail,
            vec![
                (PromptRole::User, "same"),
                (PromptRole::User, "same"),
                (PromptRole::Ai, "reply"),
                (PromptRole::User, ""),
            ]
        );
    }

    #[test]
    fn blank_greeting_is_dropped() {
        let persona = PersonaPrefix::new("system", Some("   ".to_string()));

        assert_eq!(persona.greeting(), None);
        assert_eq!(persona.messages().len(), 1);
    }
}
