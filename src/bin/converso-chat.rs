//! Interactive chat client with per-user token accounting.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage; the key comes from $CONVERSO_API_KEY or $OPENAI_API_KEY
//! converso-chat
//!
//! # Pick a model and custom instructions
//! converso-chat --model gpt-4o --system "Answer in French."
//!
//! # Read replies aloud (needs `espeak` on $PATH)
//! converso-chat --speak
//! ```
//!
//! Set `RUST_LOG=converso=debug` to see request and ledger events on stderr.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use converso::auth::{AuthMode, AuthProvider, LocalAuth, User, authenticate};
use converso::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, PlainTextRenderer, Renderer, help_text,
    parse_command,
};
use converso::snapshot::SessionSnapshot;
use converso::voice::{ListenRequest, PendingInput, Speaker, SpeechToText, TextToSpeech};
use converso::{Error, FileUsageStore, OpenAi, UsageLedger};

/// Speaks through an external synthesizer; dropping the future kills it.
struct CommandSpeech {
    program: String,
}

#[async_trait::async_trait]
impl TextToSpeech for CommandSpeech {
    async fn speak(&self, utterance: &str) -> converso::Result<()> {
        let status = Command::new(&self.program)
            .arg(utterance)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|err| Error::speech(format!("cannot run {}: {err}", self.program)))?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::speech(format!("{} exited with {status}", self.program)))
        }
    }
}

/// Terminal stand-in for a recognizer: the user types what they would say.
struct TypedDictation;

#[async_trait::async_trait]
impl SpeechToText for TypedDictation {
    async fn listen(&self, request: &ListenRequest) -> converso::Result<String> {
        eprint!("(listening, {}) ", request.locale);
        let line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await
        .map_err(|err| Error::speech(format!("listener stopped: {err}")))?
        .map_err(|err| Error::speech(format!("cannot read microphone: {err}")))?;
        Ok(line.trim().to_string())
    }
}

fn default_usage_store() -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
    home.join(".converso").join("usage.json")
}

/// Swap in a fresh token for the next completion and return it.
fn arm(cancel: &Mutex<CancellationToken>) -> CancellationToken {
    let mut current = cancel.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *current = CancellationToken::new();
    current.clone()
}

async fn sign_in(
    rl: &mut DefaultEditor,
    auth: &dyn AuthProvider,
    config: &ChatConfig,
    renderer: &mut dyn Renderer,
) -> Result<Option<User>, Box<dyn std::error::Error>> {
    loop {
        let mode = match rl.readline("sign in or sign up? [in/up] ") {
            Ok(answer) => match answer.trim().to_lowercase().as_str() {
                "in" | "i" => AuthMode::SignIn,
                "up" | "u" => AuthMode::SignUp,
                _ => continue,
            },
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let email = match rl.readline("email: ") {
            Ok(email) => email.trim().to_string(),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let password = match rl.readline("password: ") {
            Ok(password) => password,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match authenticate(auth, config.email_policy, mode, &email, &password).await {
            Ok(user) => return Ok(Some(user)),
            Err(Error::Validation { message, .. }) => renderer.print_error(&message),
            Err(err) => renderer.print_error(&err.to_string()),
        }
    }
}

async fn send(
    session: &ChatSession,
    ledger: &UsageLedger,
    renderer: &mut dyn Renderer,
    speaker: Option<&Speaker>,
    cancel: &Mutex<CancellationToken>,
    text: &str,
) {
    if session.append_user_message(text).is_none() {
        return;
    }
    renderer.print_pending();
    let token = arm(cancel);
    match session.request_completion_with_cancel(&token).await {
        Ok(tokens) => {
            ledger.add(tokens);
            if let Some(reply) = session.last_message() {
                renderer.print_message(&reply);
                if let Some(speaker) = speaker {
                    speaker.speak_message(&reply);
                }
            }
        }
        Err(err) if err.is_abort() => renderer.print_info("[cancelled]"),
        Err(err) if err.is_retryable() => {
            renderer.print_error(&format!("{err}; press up and enter to try again"))
        }
        Err(err) => renderer.print_error(&err.to_string()),
    }
    if let Some(err) = ledger.take_write_error() {
        tracing::warn!(error = %err, "usage not saved");
    }
}

/// Main entry point for the converso-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "converso=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("converso-chat [OPTIONS]");
    let config = ChatConfig::from_args(args)?;
    let mut renderer = PlainTextRenderer::with_color(config.use_color);

    let client = OpenAi::with_options(
        config.api_key.clone(),
        config.base_url.clone(),
        Some(config.timeout),
    )?;
    let session = ChatSession::new(Arc::new(client), &config);
    let store_path = config.usage_store.clone().unwrap_or_else(default_usage_store);
    let ledger = UsageLedger::new(Arc::new(FileUsageStore::new(store_path)), config.cost_rate);
    let auth = LocalAuth::new();
    let speaker = Speaker::new(Arc::new(CommandSpeech {
        program: "espeak".to_string(),
    }));
    let mut speaking = config.speak_replies;
    let mut input = PendingInput::new();
    let mut rl = DefaultEditor::new()?;

    let cancel = Arc::new(Mutex::new(CancellationToken::new()));
    let cancel_handler = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        cancel_handler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .cancel();
    })?;

    let Some(user) = sign_in(&mut rl, &auth, &config, &mut renderer).await? else {
        return Ok(());
    };
    if let Err(err) = ledger.load(&user.id).await {
        renderer.print_error(&format!("{err}; usage will not be saved this session"));
    }

    println!("Converso (model: {}, signed in as {})", session.model(), user.email);
    println!("Type /help for commands, /quit to exit\n");
    renderer.print_usage(&ledger.usage_display());

    loop {
        let draft = input.text().to_string();
        let readline = rl.readline_with_initial("you> ", (draft.as_str(), ""));
        input.set_text("");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::SignOut => {
                            auth.sign_out();
                            ledger.flush().await;
                            ledger.reset();
                            session.clear();
                            println!("Signed out.");
                            break;
                        }
                        ChatCommand::Clear => {
                            session.clear();
                            renderer.print_info("Conversation cleared.");
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::System(instruction) => {
                            session.set_system_instruction(instruction.clone());
                            match instruction {
                                Some(text) => renderer
                                    .print_info(&format!("Custom instructions set to: {text}")),
                                None => renderer.print_info("Custom instructions cleared."),
                            }
                        }
                        ChatCommand::Usage => renderer.print_usage(&ledger.usage_display()),
                        ChatCommand::Listen => {
                            match input.dictate(&TypedDictation, &ListenRequest::default()).await
                            {
                                Ok(_) => renderer.print_info("Edit the dictated text and press enter to send."),
                                Err(err) => renderer.print_error(&err.to_string()),
                            }
                        }
                        ChatCommand::Speak(on) => {
                            speaking = on;
                            if !on {
                                speaker.stop();
                            }
                            renderer.print_info(if on {
                                "Replies will be read aloud."
                            } else {
                                "Replies will not be read aloud."
                            });
                        }
                        ChatCommand::Hush => speaker.stop(),
                        ChatCommand::Save(path) => {
                            match session.snapshot(&ledger).save(&path).await {
                                Ok(()) => renderer.print_info(&format!("Saved to {path}")),
                                Err(err) => renderer.print_error(&err.to_string()),
                            }
                        }
                        ChatCommand::Load(path) => match SessionSnapshot::load(&path).await {
                            // The ledger loaded from the store stays authoritative; only the
                            // conversation comes from the file.
                            Ok(snapshot) => {
                                match session.replace_messages(snapshot.messages) {
                                    Ok(()) => {
                                        session.set_system_instruction(snapshot.system_instruction);
                                        renderer.print_transcript(&session.messages());
                                        renderer.print_info(&format!("Loaded {path}"));
                                    }
                                    Err(err) => renderer.print_error(&err.to_string()),
                                }
                            }
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::Stats => {
                            let stats = session.stats();
                            println!("    Session Statistics:");
                            println!("      Model: {}", stats.model);
                            println!("      Messages: {}", stats.message_count);
                            println!(
                                "      Custom instructions: {}",
                                stats.system_instruction.as_deref().unwrap_or("(none)")
                            );
                            println!("      Timeout: {}s", stats.timeout.as_secs());
                            println!("      Tokens: {}", ledger.token_usage());
                            println!("      Estimated cost: {}", ledger.cost_display());
                        }
                        ChatCommand::Invalid(message) => renderer.print_error(&message),
                    }
                    continue;
                }

                let speaker = speaking.then_some(&speaker);
                send(&session, &ledger, &mut renderer, speaker, &cancel, line).await;
            }
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    speaker.stop();
    ledger.flush().await;
    Ok(())
}
