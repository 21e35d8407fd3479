// HTTP server: router, handlers and shared application state.

pub mod handler;
pub mod state;

pub use handler::{router, ReviewServer};
pub use state::AppState;
