//! HTTP API surface.

pub mod error;
pub mod routes;
pub mod types;

pub use routes::{build_router, AppState};
