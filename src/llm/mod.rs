pub mod client;
pub mod error;
pub mod types;

pub use client::{CompletionClient, OpenAiClient, Provider};
pub use error::CompletionError;
pub use types::{ChatRequest, Message};
