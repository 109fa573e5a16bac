//! AcadBot Core: shared error taxonomy and configuration.

pub mod config;
pub mod error;

pub use config::{AcadbotConfig, DataPaths, RagSettings};
pub use error::{Error, ProviderFailure, Result};
