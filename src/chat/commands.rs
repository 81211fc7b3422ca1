//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the chat session without sending messages
//! to the API.

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the API.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Clear the conversation history.
    Clear,

    /// Set or clear the system instruction.
    /// `None` clears the current instruction.
    System(Option<String>),

    /// Show token usage and estimated cost.
    Usage,

    /// Dictate the next message.
    Listen,

    /// Turn reading replies aloud on or off.
    Speak(bool),

    /// Stop the utterance currently playing.
    Hush,

    /// Save the transcript and usage to a snapshot file.
    Save(String),

    /// Restore the transcript from a snapshot file.
    Load(String),

    /// Display session statistics.
    Stats,

    /// Sign out and exit.
    SignOut,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command,
/// or `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use converso::chat::{ChatCommand, parse_command};
/// assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
/// assert_eq!(parse_command("/speak on"), Some(ChatCommand::Speak(true)));
/// assert!(parse_command("Hello!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    if !input.starts_with('/') {
        return None;
    }

    let mut parts = input[1..].splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "clear" => ChatCommand::Clear,
        "system" => ChatCommand::System(argument.map(|s| s.to_string())),
        "usage" | "cost" => ChatCommand::Usage,
        "listen" | "mic" => ChatCommand::Listen,
        "speak" => match argument.and_then(parse_on_off) {
            Some(on) => ChatCommand::Speak(on),
            None => ChatCommand::Invalid("/speak expects 'on' or 'off'".to_string()),
        },
        "hush" | "stop" => ChatCommand::Hush,
        "save" => match argument {
            Some(path) => ChatCommand::Save(path.to_string()),
            None => ChatCommand::Invalid("/save requires a file path".to_string()),
        },
        "load" => match argument {
            Some(path) => ChatCommand::Load(path.to_string()),
            None => ChatCommand::Invalid("/load requires a file path".to_string()),
        },
        "stats" | "status" => ChatCommand::Stats,
        "signout" | "logout" => ChatCommand::SignOut,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("unknown command /{command}; try /help")),
    };
    Some(result)
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Returns the help text listing all available commands.
pub fn help_text() -> &'static str {
    "\
Commands:
  /clear            Clear the conversation
  /system [text]    Set custom instructions (no text clears them)
  /usage            Show token usage and estimated cost
  /listen           Dictate the next message
  /speak on|off     Read assistant replies aloud
  /hush             Stop the reply currently being read
  /save <path>      Save transcript and usage to a file
  /load <path>      Restore a saved transcript
  /stats            Show session statistics
  /signout          Sign out and exit
  /help             Show this help
  /quit             Exit"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse_command("Hello"), None);
        assert_eq!(parse_command("  what is 1/2?"), None);
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("/clear"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/QUIT"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/usage"), Some(ChatCommand::Usage));
        assert_eq!(parse_command("/mic"), Some(ChatCommand::Listen));
        assert_eq!(parse_command("/signout"), Some(ChatCommand::SignOut));
        assert_eq!(
            parse_command("/system  Answer in French. "),
            Some(ChatCommand::System(Some("Answer in French.".to_string())))
        );
        assert_eq!(parse_command("/system"), Some(ChatCommand::System(None)));
        assert_eq!(
            parse_command("/save chat.json"),
            Some(ChatCommand::Save("chat.json".to_string()))
        );
    }

    #[test]
    fn invalid_arguments() {
        assert!(matches!(
            parse_command("/speak maybe"),
            Some(ChatCommand::Invalid(_))
        ));
        assert!(matches!(parse_command("/load"), Some(ChatCommand::Invalid(_))));
        assert!(matches!(parse_command("/bogus"), Some(ChatCommand::Invalid(_))));
    }
}
