//! HTTP surface over the MCP client.

pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use routes::router;
pub use server::{serve, serve_listener};
pub use state::AppState;
