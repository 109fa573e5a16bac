//! AcadBot Store: vector index, exact cosine search, SQLite persistence.

pub mod builder;
pub mod embedding;
pub mod index;
pub mod schema;
pub mod shared;
pub mod sqlite;
pub mod types;

pub use builder::{BuildParams, IndexBuilder};
pub use index::VectorIndex;
pub use shared::SharedIndex;
pub use sqlite::IndexStore;
pub use types::*;
