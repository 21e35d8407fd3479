// Review sync engine: cached object-store access, reconciliation and promotion.

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod server;
pub mod store;

pub use error::{ReviewError, Result};
