//! Retrieval: embed a question and find the closest chunks in the index.

pub mod retriever;
pub mod types;

pub use retriever::Retriever;
pub use types::*;
