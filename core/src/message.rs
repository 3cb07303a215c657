//! Conversation message types, generalized from the teacher workspace's
//! streaming `llm::message` module down to the non-streaming shape this
//! engine needs (a memory engine drives one-shot `chatComplete` calls, not
//! interactive tool-calling turns).

use serde::{Deserialize, Serialize};

/// Conversation participant role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Instructions/context for the model.
    System,
    /// Input from the end user or calling agent.
    User,
    /// A prior model response, replayed as context.
    Assistant,
}

/// A single message in a one-shot or few-shot chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Sender role.
    pub role: Role,
    /// Text content.
    pub content: String,
}

impl Message {
    /// Builds a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Builds a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Builds an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Convenience constructor for a system+user one-shot exchange, mirroring
/// `aither_core::llm::oneshot` used throughout the teacher's `mem0` crate.
#[must_use]
pub fn oneshot(system: impl Into<String>, user: impl Into<String>) -> Vec<Message> {
    vec![Message::system(system), Message::user(user)]
}
