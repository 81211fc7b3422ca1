//! Suspend and resume.
//!
//! A [`SessionSnapshot`] carries the transcript and the usage count across a
//! restart.  It is plain JSON so `/save` and `/load` can use the same format.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chat::ChatSession;
use crate::error::{Error, Result};
use crate::ledger::{LedgerSnapshot, UsageLedger};
use crate::types::Message;

/// Current on-disk format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// The transcript and usage count at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub token_usage: u64,
}

impl SessionSnapshot {
    /// Capture `session` and `ledger`.  The placeholder of an in-flight
    /// completion is left out.
    pub fn capture(session: &ChatSession, ledger: &UsageLedger) -> Self {
        let usage = ledger.serialize();
        Self {
            version: SNAPSHOT_VERSION,
            messages: session
                .messages()
                .into_iter()
                .filter(|m| !m.is_placeholder())
                .collect(),
            system_instruction: session.system_instruction(),
            user_id: usage.user_id,
            token_usage: usage.token_usage,
        }
    }

    /// Put the snapshot back into `session` and `ledger`.
    ///
    /// The ledger resumes persisting for the captured user; see
    /// [`UsageLedger::restore`].
    ///
    /// # Errors
    ///
    /// [`Error::Busy`] if `session` has a completion in flight; nothing is
    /// changed in that case.
    pub fn restore_into(self, session: &ChatSession, ledger: &UsageLedger) -> Result<()> {
        session.replace_messages(self.messages)?;
        session.set_system_instruction(self.system_instruction);
        ledger.restore(LedgerSnapshot {
            user_id: self.user_id,
            token_usage: self.token_usage,
        });
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a snapshot, rejecting versions this build does not understand.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(json)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::validation(
                format!("unsupported snapshot version {}", snapshot.version),
                Some("version".to_string()),
            ));
        }
        Ok(snapshot)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        tokio::fs::write(path, self.to_json()?)
            .await
            .map_err(|err| Error::io(format!("failed to write {}", path.display()), err))
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
        Self::from_json(&json)
    }
}

impl ChatSession {
    /// Shorthand for [`SessionSnapshot::capture`].
    pub fn snapshot(&self, ledger: &UsageLedger) -> SessionSnapshot {
        SessionSnapshot::capture(self, ledger)
    }

    /// Shorthand for [`SessionSnapshot::restore_into`].
    pub fn restore(&self, snapshot: SessionSnapshot, ledger: &UsageLedger) -> Result<()> {
        snapshot.restore_into(self, ledger)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chat::ChatConfig;
    use crate::client::CompletionClient;
    use crate::ledger::{CostRate, MemoryUsageStore};
    use crate::types::{CompletionRequest, CompletionResponse};

    struct Echo;

    #[async_trait::async_trait]
    impl CompletionClient for Echo {
        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
            let last = request.messages.last().map(|m| m.content.clone());
            Ok(CompletionResponse {
                assistant_content: last.unwrap_or_default(),
                total_tokens: 7,
            })
        }
    }

    fn fresh() -> (ChatSession, UsageLedger) {
        let config = ChatConfig::new().with_system_instruction("Be brief.");
        let session = ChatSession::new(Arc::new(Echo), &config);
        let ledger = UsageLedger::new(Arc::new(MemoryUsageStore::new()), CostRate::default());
        (session, ledger)
    }

    #[tokio::test]
    async fn suspend_and_resume() {
        let (session, ledger) = fresh();
        session.append_user_message("Hello");
        ledger.add(session.request_completion().await.unwrap());

        let json = session.snapshot(&ledger).to_json().unwrap();

        let (resumed, resumed_ledger) = fresh();
        resumed.set_system_instruction(None);
        resumed
            .restore(SessionSnapshot::from_json(&json).unwrap(), &resumed_ledger)
            .unwrap();
        assert_eq!(resumed.messages(), session.messages());
        assert_eq!(resumed.system_instruction().as_deref(), Some("Be brief."));
        assert_eq!(resumed_ledger.token_usage(), 7);
    }

    #[test]
    fn unknown_version_rejected() {
        let err = SessionSnapshot::from_json(r#"{"version": 9, "messages": [], "token_usage": 0}"#)
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn reads_minimal_document() {
        let snapshot = SessionSnapshot::from_json(
            r#"{"version": 1, "messages": [{"role": "user", "content": "Hi"}], "token_usage": 12}"#,
        )
        .unwrap();
        assert_eq!(snapshot.messages, vec![Message::user("Hi")]);
        assert_eq!(snapshot.system_instruction, None);
        assert_eq!(snapshot.user_id, None);
        assert_eq!(snapshot.token_usage, 12);
    }

    #[tokio::test]
    async fn resumed_session_keeps_counting_for_user() {
        let store = Arc::new(MemoryUsageStore::new());
        let session = ChatSession::new(Arc::new(Echo), &ChatConfig::new());
        let ledger = UsageLedger::new(store.clone(), CostRate::default());
        ledger.load("alice").await.unwrap();
        session.append_user_message("Hello");
        ledger.add(session.request_completion().await.unwrap());
        let json = session.snapshot(&ledger).to_json().unwrap();
        ledger.flush().await;

        let resumed = ChatSession::new(Arc::new(Echo), &ChatConfig::new());
        let resumed_ledger = UsageLedger::new(store.clone(), CostRate::default());
        resumed
            .restore(SessionSnapshot::from_json(&json).unwrap(), &resumed_ledger)
            .unwrap();
        assert_eq!(resumed_ledger.user_id().as_deref(), Some("alice"));

        resumed.append_user_message("Again");
        resumed_ledger.add(resumed.request_completion().await.unwrap());
        resumed_ledger.flush().await;
        assert_eq!(store.value("users/alice/token_usage"), Some(14));
        assert_eq!(resumed_ledger.load("alice").await.unwrap(), 14);
    }

    #[tokio::test]
    async fn save_and_load_file() {
        let (session, ledger) = fresh();
        session.append_user_message("Hello");
        ledger.add(3);
        let path = std::env::temp_dir().join(format!("converso-snapshot-{}.json", std::process::id()));

        session.snapshot(&ledger).save(&path).await.unwrap();
        let loaded = SessionSnapshot::load(&path).await.unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded.messages, vec![Message::user("Hello")]);
        assert_eq!(loaded.token_usage, 3);
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = SessionSnapshot::load("/nonexistent/converso/snapshot.json")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
