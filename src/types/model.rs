use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of the chat-completion model.
///
/// This can be a predefined model or a custom string for models the crate
/// does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Model {
    /// Known model versions
    Known(KnownModel),

    /// Custom model identifier
    Custom(String),
}

/// Known chat-completion models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownModel {
    /// GPT-3.5 Turbo, the model the chat client has always used.
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,

    /// GPT-4
    #[serde(rename = "gpt-4")]
    Gpt4,

    /// GPT-4o
    #[serde(rename = "gpt-4o")]
    Gpt4o,

    /// GPT-4o mini
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
}

impl KnownModel {
    fn as_str(&self) -> &'static str {
        match self {
            KnownModel::Gpt35Turbo => "gpt-3.5-turbo",
            KnownModel::Gpt4 => "gpt-4",
            KnownModel::Gpt4o => "gpt-4o",
            KnownModel::Gpt4oMini => "gpt-4o-mini",
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::Known(KnownModel::Gpt35Turbo)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Known(known_model) => write!(f, "{}", known_model),
            Model::Custom(custom) => write!(f, "{}", custom),
        }
    }
}

impl fmt::Display for KnownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KnownModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gpt-3.5-turbo" => Ok(KnownModel::Gpt35Turbo),
            "gpt-4" => Ok(KnownModel::Gpt4),
            "gpt-4o" => Ok(KnownModel::Gpt4o),
            "gpt-4o-mini" => Ok(KnownModel::Gpt4oMini),
            _ => Err(format!("unknown model {s}")),
        }
    }
}

impl FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<KnownModel>().map(Model::Known)
    }
}

impl From<KnownModel> for Model {
    fn from(model: KnownModel) -> Self {
        Model::Known(model)
    }
}

impl From<String> for Model {
    fn from(model: String) -> Self {
        model.parse().unwrap_or(Model::Custom(model))
    }
}

impl From<&str> for Model {
    fn from(model: &str) -> Self {
        Model::from(model.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_gpt35_turbo() {
        let json = serde_json::to_string(&Model::default()).unwrap();
        assert_eq!(json, r#""gpt-3.5-turbo""#);
    }

    #[test]
    fn known_and_custom_round_trip() {
        let model: Model = serde_json::from_str(r#""gpt-4o""#).unwrap();
        assert_eq!(model, Model::Known(KnownModel::Gpt4o));

        let model: Model = serde_json::from_str(r#""my-finetune""#).unwrap();
        assert_eq!(model, Model::Custom("my-finetune".to_string()));
        assert_eq!(model.to_string(), "my-finetune");
    }

    #[test]
    fn from_str_falls_back_to_custom() {
        assert_eq!(Model::from("gpt-4"), Model::Known(KnownModel::Gpt4));
        assert_eq!(
            Model::from("local-llama"),
            Model::Custom("local-llama".to_string())
        );
        assert!("local-llama".parse::<Model>().is_err());
    }
}
