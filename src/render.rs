//! Output rendering for the chat application.
//!
//! The session owns the transcript; a [`Renderer`] only draws it.  The plain
//! text implementation styles roles with ANSI escape codes and draws the
//! typing placeholder so the reply can overwrite it in place.

use std::io::{self, Stdout, Write};

use crate::types::{Message, Role};

/// ANSI escape code for dim text (placeholder and system instructions).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (assistant label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (user label).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for yellow text (usage header).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for red text (errors).
const ANSI_RED: &str = "\x1b[31m";

/// Return to column zero and erase the line.
const ANSI_CLEAR_LINE: &str = "\r\x1b[2K";

/// Trait for rendering chat output.
pub trait Renderer: Send {
    /// Print one transcript entry.
    fn print_message(&mut self, message: &Message);

    /// Show the typing placeholder until the next message or error.
    fn print_pending(&mut self);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Print the usage header, e.g. the text of `UsageLedger::usage_display`.
    fn print_usage(&mut self, usage: &str);

    /// Print a whole transcript, skipping the placeholder.
    fn print_transcript(&mut self, messages: &[Message]) {
        for message in messages.iter().filter(|m| !m.is_placeholder()) {
            self.print_message(message);
        }
    }
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    pending_shown: bool,
}

impl PlainTextRenderer<Stdout> {
    /// Creates a new PlainTextRenderer on stdout with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer on stdout with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer that writes to `out`.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            pending_shown: false,
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_color {
            format!("{color}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn clear_pending(&mut self) {
        if self.pending_shown {
            let erase = if self.use_color { ANSI_CLEAR_LINE } else { "\n" };
            let _ = write!(self.out, "{erase}");
            self.pending_shown = false;
        }
    }

    fn write_line(&mut self, line: &str) {
        self.clear_pending();
        let _ = writeln!(self.out, "{line}");
        let _ = self.out.flush();
    }
}

impl Default for PlainTextRenderer<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn print_message(&mut self, message: &Message) {
        if message.is_placeholder() {
            self.print_pending();
            return;
        }
        let line = match message.role {
            Role::User => format!("{} {}", self.paint(ANSI_GREEN, "you>"), message.content),
            Role::Assistant => format!("{} {}", self.paint(ANSI_CYAN, "bot>"), message.content),
            Role::System => self.paint(ANSI_DIM, &format!("[system] {}", message.content)),
        };
        self.write_line(&line);
    }

    fn print_pending(&mut self) {
        if self.pending_shown {
            return;
        }
        let dots = self.paint(ANSI_DIM, &format!("bot> {}", crate::types::PLACEHOLDER));
        let _ = write!(self.out, "{dots}");
        let _ = self.out.flush();
        self.pending_shown = true;
    }

    fn print_error(&mut self, error: &str) {
        let line = self.paint(ANSI_RED, &format!("Error: {error}"));
        self.write_line(&line);
    }

    fn print_info(&mut self, info: &str) {
        self.write_line(info);
    }

    fn print_usage(&mut self, usage: &str) {
        let painted = self.paint(ANSI_YELLOW, usage);
        self.write_line(&painted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> PlainTextRenderer<Vec<u8>> {
        PlainTextRenderer::with_writer(Vec::new(), false)
    }

    fn output(renderer: PlainTextRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
    }

    #[test]
    fn transcript_skips_placeholder() {
        let mut renderer = plain();
        renderer.print_transcript(&[
            Message::user("Hello"),
            Message::assistant("Hi!"),
            Message::placeholder(),
        ]);
        assert_eq!(output(renderer), "you> Hello\nbot> Hi!\n");
    }

    #[test]
    fn reply_replaces_pending_line() {
        let mut renderer = plain();
        renderer.print_pending();
        renderer.print_pending();
        renderer.print_message(&Message::assistant("Hi!"));
        assert_eq!(output(renderer), "bot> ...\nbot> Hi!\n");
    }

    #[test]
    fn colored_pending_is_erased() {
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), true);
        renderer.print_pending();
        renderer.print_error("timed out");
        let text = String::from_utf8(renderer.into_inner()).unwrap();
        assert!(text.contains(ANSI_CLEAR_LINE));
        assert!(text.ends_with(&format!("{ANSI_RED}Error: timed out{ANSI_RESET}\n")));
    }

    #[test]
    fn usage_is_printed_verbatim() {
        let mut renderer = plain();
        renderer.print_usage("Usage: 5 tokens\nCost: $0.00");
        assert_eq!(output(renderer), "Usage: 5 tokens\nCost: $0.00\n");
    }
}
