//! HTTP surface: accepts job requests and acknowledges them immediately.

pub mod api;
pub mod server;

pub use api::{ApiError, AppState, SharedState};
pub use server::{build_router, serve, start_server};
