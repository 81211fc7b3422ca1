// Public modules
pub mod auth;
pub mod chat;
pub mod client;
pub mod error;
pub mod ledger;
pub mod observability;
pub mod render;
pub mod snapshot;
pub mod types;
pub mod voice;

// Re-exports
pub use auth::{AuthMode, AuthProvider, EmailPolicy, LocalAuth, User};
pub use chat::ChatSession;
pub use client::{CompletionClient, OpenAi};
pub use error::{Error, Result};
pub use ledger::{CostRate, FileUsageStore, MemoryUsageStore, UsageLedger, UsageStore};
pub use observability::register_biometrics;
pub use snapshot::SessionSnapshot;
pub use types::*;
pub use voice::{ListenRequest, PendingInput, Speaker, SpeechToText, TextToSpeech};
