use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Message, Model};

/// Body of a chat-completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// The model to complete with.
    pub model: Model,

    /// Conversation context, oldest first.
    pub messages: Vec<Message>,
}

impl CompletionRequest {
    /// Build a request from a transcript.
    ///
    /// Placeholder messages are dropped.  A non-empty `system_instruction`
    /// becomes the only system message, at index 0; system messages already in
    /// the transcript are not forwarded.
    pub fn from_transcript(
        model: Model,
        system_instruction: Option<&str>,
        transcript: &[Message],
    ) -> Self {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        if let Some(instruction) = system_instruction.filter(|s| !s.is_empty()) {
            messages.push(Message::system(instruction));
        }
        messages.extend(
            transcript
                .iter()
                .filter(|m| !m.is_placeholder() && m.role != crate::types::Role::System)
                .cloned(),
        );
        Self { model, messages }
    }
}

/// The part of a completion the chat core acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    /// Text of `choices[0].message.content`.
    pub assistant_content: String,

    /// `usage.total_tokens`.
    pub total_tokens: u64,
}

impl CompletionResponse {
    /// Parse a completion from its JSON body.
    pub fn from_json(body: &str) -> Result<Self> {
        let completion: ChatCompletion = serde_json::from_str(body).map_err(|e| {
            Error::malformed_response(
                format!("Failed to parse completion: {}", e),
                Some(Box::new(e)),
            )
        })?;
        Self::try_from(completion)
    }
}

impl TryFrom<ChatCompletion> for CompletionResponse {
    type Error = Error;

    fn try_from(completion: ChatCompletion) -> Result<Self> {
        let assistant_content = completion
            .choices
            .and_then(|choices| choices.into_iter().next())
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or_else(|| Error::malformed_response("missing choices[0].message.content", None))?;
        let total_tokens = completion
            .usage
            .and_then(|usage| usage.total_tokens)
            .ok_or_else(|| Error::malformed_response("missing usage.total_tokens", None))?;
        Ok(Self {
            assistant_content,
            total_tokens,
        })
    }
}

/// Wire shape of a chat-completion response.
///
/// Everything is optional so that a partial body turns into a
/// [`Error::MalformedResponse`] rather than a serde failure deep in a field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletion {
    /// Completion identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Object type, usually `chat.completion`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,

    /// Unix timestamp of creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,

    /// The model that produced the completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Candidate replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Choice>>,

    /// Token accounting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<CompletionUsage>,
}

/// One candidate reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Choice {
    /// Position in `choices`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,

    /// The reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChoiceMessage>,

    /// Why generation stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Reply message inside a [`Choice`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChoiceMessage {
    /// Role reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Reply text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Token usage reported with a completion.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionUsage {
    /// Tokens in the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,

    /// Tokens in the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,

    /// Billable total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KnownModel, Role};
    use serde_json::{json, to_value};

    #[test]
    fn request_body_shape() {
        let request = CompletionRequest::from_transcript(
            Model::Known(KnownModel::Gpt35Turbo),
            Some("Be brief."),
            &[Message::user("Hello"), Message::placeholder()],
        );
        assert_eq!(
            to_value(&request).unwrap(),
            json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "Hello"}
                ]
            })
        );
    }

    #[test]
    fn empty_instruction_adds_no_system_message() {
        let request = CompletionRequest::from_transcript(
            Model::default(),
            Some(""),
            &[Message::user("Hello")],
        );
        assert_eq!(request.messages, vec![Message::user("Hello")]);

        let request = CompletionRequest::from_transcript(Model::default(), None, &[]);
        assert!(request.messages.is_empty());
    }

    #[test]
    fn typed_ellipsis_is_sent() {
        let request = CompletionRequest::from_transcript(
            Model::default(),
            None,
            &[Message::user("..."), Message::placeholder()],
        );
        assert_eq!(request.messages, vec![Message::user("...")]);
    }

    #[test]
    fn at_most_one_system_message() {
        let transcript = vec![
            Message::system("stale"),
            Message::user("Hello"),
            Message::assistant("Hi!"),
            Message::user("Again"),
            Message::placeholder(),
        ];
        let request =
            CompletionRequest::from_transcript(Model::default(), Some("fresh"), &transcript);
        let systems: Vec<_> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .collect();
        assert_eq!(systems, vec![&Message::system("fresh")]);
        assert_eq!(request.messages[0], Message::system("fresh"));
        assert!(request.messages.iter().all(|m| !m.is_placeholder()));
        assert_eq!(request.messages.len(), 4);
    }

    #[test]
    fn parses_full_completion() {
        let body = json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1677652288,
            "model": "gpt-3.5-turbo-0613",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "\n\nHello there, how may I assist you today?"
                },
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 9,
                "completion_tokens": 12,
                "total_tokens": 21
            }
        })
        .to_string();
        let response = CompletionResponse::from_json(&body).unwrap();
        assert_eq!(
            response.assistant_content,
            "\n\nHello there, how may I assist you today?"
        );
        assert_eq!(response.total_tokens, 21);
    }

    #[test]
    fn missing_fields_are_malformed() {
        let no_choices = json!({"usage": {"total_tokens": 5}}).to_string();
        assert!(
            CompletionResponse::from_json(&no_choices)
                .unwrap_err()
                .is_malformed_response()
        );

        let empty_choices = json!({"choices": [], "usage": {"total_tokens": 5}}).to_string();
        assert!(
            CompletionResponse::from_json(&empty_choices)
                .unwrap_err()
                .is_malformed_response()
        );

        let no_usage = json!({"choices": [{"message": {"content": "Hi!"}}]}).to_string();
        assert!(
            CompletionResponse::from_json(&no_usage)
                .unwrap_err()
                .is_malformed_response()
        );

        let wrong_type = json!({"choices": "nope", "usage": {"total_tokens": 5}}).to_string();
        let err = CompletionResponse::from_json(&wrong_type).unwrap_err();
        assert!(err.is_malformed_response());
        assert!(err.is_request_failed());

        assert!(
            CompletionResponse::from_json("<html>bad gateway</html>")
                .unwrap_err()
                .is_malformed_response()
        );
    }
}
