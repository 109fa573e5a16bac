//! Pipeline runtime: owns the live index and coordinates load, chunk,
//! embed, persist, retrieve and answer.
//!
//! Builds are serialised and swapped in only after they are persisted;
//! concurrent questions are bounded by the configured provider concurrency.

pub mod pipeline;
pub mod types;

pub use pipeline::Pipeline;
pub use types::*;
