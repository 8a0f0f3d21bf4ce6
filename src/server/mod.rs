//! The HTTP surface: axum router, handlers, shared state, and the API error
//! envelope.
//!
//! The route set mirrors the service's public contract — multipart upload,
//! explicit process/continue triggers, one-second status polling, artifact
//! and PPTX downloads, and job cleanup — with the static frontend mounted
//! under `/static`.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;
