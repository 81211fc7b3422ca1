//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which owns the visible
//! transcript and drives one completion round trip at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::chat::config::ChatConfig;
use crate::client::CompletionClient;
use crate::error::{Error, Result};
use crate::observability::{SESSION_BUSY_REJECTIONS, SESSION_COMPLETIONS, SESSION_ROLLBACKS};
use crate::types::{CompletionRequest, Message, Model};

/// A chat session that manages the transcript and completion round trips.
///
/// All methods take `&self` so a renderer or voice collaborator can read the
/// transcript (and see the `"..."` placeholder) while a completion is in
/// flight.  At most one completion runs at a time; a second concurrent
/// [`ChatSession::request_completion`] fails with [`Error::Busy`].
pub struct ChatSession {
    client: Arc<dyn CompletionClient>,
    model: Model,
    timeout: Duration,
    state: Mutex<SessionState>,
    in_flight: AtomicBool,
}

#[derive(Default)]
struct SessionState {
    messages: Vec<Message>,
    system_instruction: Option<String>,
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    /// The model used for the session.
    pub model: Model,
    /// The number of messages in the transcript.
    pub message_count: usize,
    /// The system instruction, if any.
    pub system_instruction: Option<String>,
    /// Whether a completion is in flight.
    pub pending: bool,
    /// Completion timeout.
    pub timeout: Duration,
}

impl ChatSession {
    /// Creates a new chat session with the given client and configuration.
    pub fn new(client: Arc<dyn CompletionClient>, config: &ChatConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            timeout: config.timeout,
            state: Mutex::new(SessionState {
                messages: Vec::new(),
                system_instruction: config.system_instruction.clone(),
            }),
            in_flight: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // State is plain data; a panic while holding the lock cannot leave it
        // half-updated, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends a user message and returns its index.
    ///
    /// Empty or whitespace-only input is ignored, as is input that arrives
    /// while a completion is in flight (the reply would land behind it).
    pub fn append_user_message(&self, content: &str) -> Option<usize> {
        if content.trim().is_empty() {
            return None;
        }
        if self.is_pending() {
            tracing::debug!("ignoring user message while a completion is pending");
            return None;
        }
        let mut state = self.lock();
        state.messages.push(Message::user(content));
        Some(state.messages.len() - 1)
    }

    /// Requests a completion for the current transcript.
    ///
    /// On success the assistant reply is appended and the reported
    /// `total_tokens` returned so the caller can update the usage ledger.  On
    /// any failure the transcript is left exactly as it was before the call.
    ///
    /// # Errors
    ///
    /// [`Error::Busy`] if another completion is in flight; otherwise any
    /// error for which [`Error::is_request_failed`] holds.
    pub async fn request_completion(&self) -> Result<u64> {
        self.request_completion_with_cancel(&CancellationToken::new())
            .await
    }

    /// Like [`ChatSession::request_completion`], but also gives up with
    /// [`Error::Abort`] as soon as `cancel` fires.
    pub async fn request_completion_with_cancel(&self, cancel: &CancellationToken) -> Result<u64> {
        let pending = self.begin()?;
        let request = self.build_request();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::abort("completion cancelled")),
            result = tokio::time::timeout(self.timeout, self.client.complete(&request)) => {
                match result {
                    Ok(result) => result,
                    Err(_) => Err(Error::timeout(
                        "completion did not finish in time",
                        Some(self.timeout.as_secs_f64()),
                    )),
                }
            }
        };

        match outcome {
            Ok(response) => {
                pending.commit(Message::assistant(response.assistant_content));
                SESSION_COMPLETIONS.click();
                Ok(response.total_tokens)
            }
            Err(err) => {
                drop(pending);
                tracing::info!(error = %err, "completion failed; transcript rolled back");
                Err(err)
            }
        }
    }

    fn begin(&self) -> Result<PendingCompletion<'_>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            SESSION_BUSY_REJECTIONS.click();
            return Err(Error::busy("a completion is already in flight"));
        }
        self.lock().messages.push(Message::placeholder());
        Ok(PendingCompletion {
            session: self,
            committed: false,
        })
    }

    /// Builds the outbound request for the current transcript.
    pub fn build_request(&self) -> CompletionRequest {
        let state = self.lock();
        CompletionRequest::from_transcript(
            self.model.clone(),
            state.system_instruction.as_deref(),
            &state.messages,
        )
    }

    /// Clears the transcript.
    ///
    /// While a completion is in flight the placeholder survives, so its reply
    /// still has a slot to land in.
    pub fn clear(&self) {
        let pending = self.is_pending();
        let mut state = self.lock();
        state.messages.clear();
        if pending {
            state.messages.push(Message::placeholder());
        }
    }

    /// Returns a copy of the transcript, placeholder included.
    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    /// Returns the last message in the transcript, if any.
    pub fn last_message(&self) -> Option<Message> {
        self.lock().messages.last().cloned()
    }

    /// Returns the number of messages in the transcript.
    pub fn message_count(&self) -> usize {
        self.lock().messages.len()
    }

    /// Returns true while a completion is in flight.
    pub fn is_pending(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Returns the model used for completions.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Sets or clears the system instruction.
    pub fn set_system_instruction(&self, instruction: Option<String>) {
        self.lock().system_instruction = instruction;
    }

    /// Returns the current system instruction, if any.
    pub fn system_instruction(&self) -> Option<String> {
        self.lock().system_instruction.clone()
    }

    /// Replaces the transcript, dropping any placeholders in `messages`.
    ///
    /// # Errors
    ///
    /// [`Error::Busy`] while a completion is in flight.
    pub fn replace_messages(&self, messages: Vec<Message>) -> Result<()> {
        if self.is_pending() {
            return Err(Error::busy("cannot replace the transcript mid-completion"));
        }
        self.lock().messages = messages.into_iter().filter(|m| !m.is_placeholder()).collect();
        Ok(())
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        let state = self.lock();
        SessionStats {
            model: self.model.clone(),
            message_count: state.messages.len(),
            system_instruction: state.system_instruction.clone(),
            pending: self.is_pending(),
            timeout: self.timeout,
        }
    }
}

/// Guard for one in-flight completion.
///
/// Dropping it without [`PendingCompletion::commit`] removes the placeholder,
/// which covers errors and futures dropped mid-request alike.
struct PendingCompletion<'a> {
    session: &'a ChatSession,
    committed: bool,
}

impl PendingCompletion<'_> {
    fn commit(mut self, reply: Message) {
        let mut state = self.session.lock();
        match state.messages.last_mut() {
            Some(last) if last.is_placeholder() => *last = reply,
            _ => state.messages.push(reply),
        }
        self.committed = true;
    }
}

impl Drop for PendingCompletion<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let mut state = self.session.lock();
            if state.messages.last().is_some_and(Message::is_placeholder) {
                state.messages.pop();
            }
            SESSION_ROLLBACKS.click();
        }
        self.session.in_flight.store(false, Ordering::Release);
    }
}
