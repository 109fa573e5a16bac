//! AcadBot server: HTTP API over the retrieval/answering pipeline.

pub mod error;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
