//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg`, an optional YAML
//! config file, and the resolved [`ChatConfig`] the rest of the crate reads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::auth::EmailPolicy;
use crate::client::DEFAULT_TIMEOUT;
use crate::error::{Error, Result};
use crate::ledger::CostRate;
use crate::types::Model;

/// Command-line arguments for the converso-chat tool.
#[derive(CommandLine, Debug, Default, Eq, PartialEq)]
pub struct ChatArgs {
    /// YAML file with default settings.
    #[arrrg(optional, "YAML config file; command-line values override it", "PATH")]
    pub config: Option<String>,

    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: gpt-3.5-turbo)", "MODEL")]
    pub model: Option<String>,

    /// System instruction prepended to every request.
    #[arrrg(optional, "Custom instructions for the assistant", "TEXT")]
    pub system: Option<String>,

    /// API key for the completion endpoint.
    #[arrrg(optional, "API key (default: $CONVERSO_API_KEY or $OPENAI_API_KEY)", "KEY")]
    pub api_key: Option<String>,

    /// Base URL of the completion endpoint.
    #[arrrg(optional, "API base URL (default: https://api.openai.com/v1/)", "URL")]
    pub base_url: Option<String>,

    /// Completion timeout in seconds.
    #[arrrg(optional, "Request timeout in seconds (default: 20)", "SECS")]
    pub timeout_secs: Option<u64>,

    /// Price of one token.
    #[arrrg(optional, "Cost per token in dollars (default: 0.000002)", "DOLLARS")]
    pub cost_per_token: Option<String>,

    /// Require a well-formed email at sign-in.
    #[arrrg(flag, "Require emails to contain '@' and '.'")]
    pub strict_email: bool,

    /// Where token usage is persisted.
    #[arrrg(optional, "Usage store file (default: ~/.converso/usage.json)", "PATH")]
    pub usage_store: Option<String>,

    /// Read assistant replies aloud.
    #[arrrg(flag, "Speak assistant replies")]
    pub speak: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Settings that may come from a YAML file.
///
/// Every field is optional; anything missing falls back to the defaults of
/// [`ChatConfig::new`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_per_token: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_email: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_store: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speak: Option<bool>,
}

impl ChatConfigFile {
    /// Load settings from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Save settings to a YAML file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path.as_ref(), content)
            .map_err(|err| Error::io("failed to write config file", err))
    }
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after merging the
/// config file and command-line arguments over the defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// The model to use for generating responses.
    pub model: Model,

    /// Optional instruction sent as a leading system message.
    pub system_instruction: Option<String>,

    /// API key; `None` defers to the environment.
    pub api_key: Option<String>,

    /// Base URL override for the completion endpoint.
    pub base_url: Option<String>,

    /// Bound on one completion round trip.
    pub timeout: Duration,

    /// Price used for the cost estimate.
    pub cost_rate: CostRate,

    /// How strictly emails are checked before sign-in.
    pub email_policy: EmailPolicy,

    /// Path of the usage store; `None` means the default location.
    pub usage_store: Option<PathBuf>,

    /// Whether assistant replies are read aloud.
    pub speak_replies: bool,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Model: gpt-3.5-turbo
    /// - Timeout: 20 seconds
    /// - Cost: $0.000002 per token
    /// - Email policy: non-empty
    /// - Speech: off
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            model: Model::default(),
            system_instruction: None,
            api_key: None,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            cost_rate: CostRate::default(),
            email_policy: EmailPolicy::default(),
            usage_store: None,
            speak_replies: false,
            use_color: true,
        }
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Sets the system instruction.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the completion timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the cost rate.
    pub fn with_cost_rate(mut self, cost_rate: CostRate) -> Self {
        self.cost_rate = cost_rate;
        self
    }

    /// Sets the email policy.
    pub fn with_email_policy(mut self, email_policy: EmailPolicy) -> Self {
        self.email_policy = email_policy;
        self
    }

    /// Enables reading replies aloud.
    pub fn with_speech(mut self, speak_replies: bool) -> Self {
        self.speak_replies = speak_replies;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Overlays the values present in a config file.
    pub fn merge_file(mut self, file: ChatConfigFile) -> Result<Self> {
        if let Some(model) = file.model {
            self.model = Model::from(model);
        }
        if file.system.is_some() {
            self.system_instruction = file.system;
        }
        if file.api_key.is_some() {
            self.api_key = file.api_key;
        }
        if file.base_url.is_some() {
            self.base_url = file.base_url;
        }
        if let Some(secs) = file.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(cost) = file.cost_per_token {
            self.cost_rate = cost_rate(cost)?;
        }
        if let Some(strict) = file.strict_email {
            self.email_policy = EmailPolicy::from_strict(strict);
        }
        if file.usage_store.is_some() {
            self.usage_store = file.usage_store;
        }
        if let Some(speak) = file.speak {
            self.speak_replies = speak;
        }
        Ok(self)
    }

    /// Overlays command-line arguments, which take precedence over everything.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if `--cost-per-token` is not a non-negative number.
    pub fn merge_args(mut self, args: ChatArgs) -> Result<Self> {
        if let Some(model) = args.model {
            self.model = Model::from(model);
        }
        if args.system.is_some() {
            self.system_instruction = args.system;
        }
        if args.api_key.is_some() {
            self.api_key = args.api_key;
        }
        if args.base_url.is_some() {
            self.base_url = args.base_url;
        }
        if let Some(secs) = args.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(cost) = args.cost_per_token {
            let dollars = cost.trim().parse::<f64>().map_err(|_| {
                Error::validation(
                    format!("cost per token is not a number: {cost}"),
                    Some("cost-per-token".to_string()),
                )
            })?;
            self.cost_rate = cost_rate(dollars)?;
        }
        if args.strict_email {
            self.email_policy = EmailPolicy::Format;
        }
        if let Some(path) = args.usage_store {
            self.usage_store = Some(PathBuf::from(path));
        }
        if args.speak {
            self.speak_replies = true;
        }
        if args.no_color {
            self.use_color = false;
        }
        Ok(self)
    }

    /// Resolves arguments, reading the config file they name if any.
    pub fn from_args(mut args: ChatArgs) -> Result<Self> {
        let mut config = ChatConfig::new();
        if let Some(path) = args.config.take() {
            config = config.merge_file(ChatConfigFile::from_file(path)?)?;
        }
        config.merge_args(args)
    }
}

fn cost_rate(dollars: f64) -> Result<CostRate> {
    if dollars.is_finite() && dollars >= 0.0 {
        Ok(CostRate::per_token(dollars))
    } else {
        Err(Error::validation(
            format!("cost per token must be a non-negative number, got {dollars}"),
            Some("cost-per-token".to_string()),
        ))
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<ChatArgs> for ChatConfig {
    type Error = Error;

    fn try_from(args: ChatArgs) -> Result<Self> {
        ChatConfig::new().merge_args(args)
    }
}
