//! Voice input and output.
//!
//! Both directions are side channels to the chat session.  Dictation lands in
//! [`PendingInput`], never in the transcript; the user still decides when to
//! send.  Replies are read aloud through a [`Speaker`], where a new utterance
//! flushes whatever is still playing.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;

use crate::error::Result;
use crate::observability::{VOICE_INTERRUPTIONS, VOICE_UTTERANCES};
use crate::types::Message;

/// Locale used when none is configured.
pub const DEFAULT_LOCALE: &str = "en-US";

/// Recognition model used when none is configured.
pub const FREE_FORM_MODEL: &str = "free_form";

/// Parameters for one listening session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenRequest {
    pub locale: String,
    pub language_model: String,
}

impl ListenRequest {
    pub fn new(locale: impl Into<String>, language_model: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            language_model: language_model.into(),
        }
    }
}

impl Default for ListenRequest {
    fn default() -> Self {
        Self::new(DEFAULT_LOCALE, FREE_FORM_MODEL)
    }
}

/// Speech recognition collaborator.
#[async_trait::async_trait]
pub trait SpeechToText: Send + Sync {
    /// Listen once and return the final transcript.
    async fn listen(&self, request: &ListenRequest) -> Result<String>;
}

/// Speech synthesis collaborator.
///
/// `speak` resolves when the utterance has finished playing.  Dropping the
/// future must stop playback; [`Speaker`] relies on that to interrupt.
#[async_trait::async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn speak(&self, utterance: &str) -> Result<()>;
}

/// What the input affordance does when pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    /// Input is empty: start dictation.
    Listen,
    /// Input has text: send it.
    Send,
}

/// The text the user is composing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PendingInput {
    text: String,
}

impl PendingInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn action(&self) -> InputAction {
        if self.text.trim().is_empty() {
            InputAction::Listen
        } else {
            InputAction::Send
        }
    }

    /// Run one listening session and put its transcript in the input.
    ///
    /// On failure the input is left untouched.
    pub async fn dictate(
        &mut self,
        recognizer: &dyn SpeechToText,
        request: &ListenRequest,
    ) -> Result<&str> {
        let transcript = recognizer.listen(request).await?;
        tracing::debug!(locale = %request.locale, chars = transcript.len(), "dictation finished");
        self.text = transcript;
        Ok(&self.text)
    }

    /// Take the text for sending, leaving the input empty.
    ///
    /// Returns `None` for blank input, which is left as is.
    pub fn take(&mut self) -> Option<String> {
        if self.text.trim().is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.text))
        }
    }
}

/// Plays utterances one at a time, newest wins.
pub struct Speaker {
    tts: Arc<dyn TextToSpeech>,
    current: Mutex<Option<JoinHandle<()>>>,
}

impl Speaker {
    pub fn new(tts: Arc<dyn TextToSpeech>) -> Self {
        Self {
            tts,
            current: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start speaking `utterance`, cutting off anything still playing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn speak(&self, utterance: impl Into<String>) {
        let utterance = utterance.into();
        let tts = Arc::clone(&self.tts);
        let mut current = self.lock();
        Self::interrupt(&mut current);
        VOICE_UTTERANCES.click();
        *current = Some(tokio::spawn(async move {
            if let Err(err) = tts.speak(&utterance).await {
                tracing::warn!(error = %err, "text to speech failed");
            }
        }));
    }

    /// Speak `message` if it is a finished assistant reply.
    ///
    /// Returns whether anything was queued.
    pub fn speak_message(&self, message: &Message) -> bool {
        if !message.is_speakable() {
            return false;
        }
        self.speak(message.content.clone());
        true
    }

    /// Stop the current utterance, if any.
    pub fn stop(&self) {
        Self::interrupt(&mut self.lock());
    }

    pub fn is_speaking(&self) -> bool {
        self.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    fn interrupt(current: &mut Option<JoinHandle<()>>) {
        if let Some(handle) = current.take()
            && !handle.is_finished()
        {
            handle.abort();
            VOICE_INTERRUPTIONS.click();
            tracing::debug!("utterance interrupted");
        }
    }
}

impl Drop for Speaker {
    fn drop(&mut self) {
        self.stop();
    }
}
