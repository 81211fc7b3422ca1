// Public modules
pub mod completion;
pub mod message;
pub mod model;

// Re-exports
pub use completion::{
    ChatCompletion, Choice, ChoiceMessage, CompletionRequest, CompletionResponse, CompletionUsage,
};
pub use message::{Message, PLACEHOLDER, Role};
pub use model::{KnownModel, Model};
