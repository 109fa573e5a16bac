//! Grounded answer generation with external LLMs (OpenAI/Anthropic/Groq).
//!
//! The generator formats retrieved chunks into a context-only prompt and
//! returns the model's reply together with the chunks it was shown.

pub mod config;
pub mod generator;
pub mod prompt;
pub mod providers;
pub mod types;

pub use config::LLMConfig;
pub use generator::AnswerGenerator;
pub use providers::{CompletionProvider, HttpCompletionProvider};
pub use types::*;
