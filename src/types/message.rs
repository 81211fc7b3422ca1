use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Content of the transient assistant message shown while a completion is in
/// flight.  It is never sent to the API and never spoken.
pub const PLACEHOLDER: &str = "...";

/// Author of a message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction prepended to the outbound request.
    System,

    /// The person chatting.
    User,

    /// The model.
    Assistant,
}

impl Role {
    /// The wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(Error::validation(
                format!("unknown message role {s:?}"),
                Some("role".to_string()),
            )),
        }
    }
}

/// One entry in a conversation.
///
/// Messages are immutable once created; the session replaces them rather than
/// editing them in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message.
    pub role: Role,

    /// The text of the message.
    pub content: String,
}

impl Message {
    /// Create a new `Message` with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a message from a role name, rejecting unknown roles.
    pub fn parse(role: &str, content: impl Into<String>) -> Result<Self> {
        Ok(Self::new(role.parse()?, content))
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create the pending-response placeholder.
    pub fn placeholder() -> Self {
        Self::assistant(PLACEHOLDER)
    }

    /// Returns true if this message is the pending-response sentinel.
    pub fn is_placeholder(&self) -> bool {
        self.role == Role::Assistant && self.content == PLACEHOLDER
    }

    /// Returns true if a text-to-speech collaborator may read this message.
    pub fn is_speakable(&self) -> bool {
        self.role == Role::Assistant && !self.is_placeholder() && !self.content.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    #[test]
    fn message_wire_shape() {
        let message = Message::user("Hello");
        assert_eq!(
            to_value(&message).unwrap(),
            json!({"role": "user", "content": "Hello"})
        );
    }

    #[test]
    fn unknown_role_rejected_at_construction() {
        assert!(Message::parse("tool", "x").unwrap_err().is_validation());
        assert!(serde_json::from_value::<Message>(json!({"role": "User", "content": "x"})).is_err());
        assert_eq!(
            Message::parse("assistant", "Hi!").unwrap(),
            Message::assistant("Hi!")
        );
    }

    #[test]
    fn placeholder_is_not_speakable() {
        assert!(Message::placeholder().is_placeholder());
        assert!(!Message::placeholder().is_speakable());
        assert!(!Message::user("Hello").is_speakable());
        assert!(Message::assistant("Hi!").is_speakable());
    }

    #[test]
    fn typed_ellipsis_is_not_placeholder() {
        assert!(!Message::user("...").is_placeholder());
        assert!(!Message::system("...").is_placeholder());
    }
}
