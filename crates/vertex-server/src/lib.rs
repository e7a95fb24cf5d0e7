//! Vertex HTTP surface: shared state, routes, caller-facing errors.

pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
