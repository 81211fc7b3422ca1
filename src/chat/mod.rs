//! Chat session and the terminal front end built on it.
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: transcript, placeholder lifecycle and completion round trips
//! - [`commands`]: slash command parsing for the REPL

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, ChatConfigFile};
pub use session::{ChatSession, SessionStats};
