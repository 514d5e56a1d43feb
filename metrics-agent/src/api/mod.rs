//! Read-only HTTP status API.
//!
//! Exposes the engine's health verdict and per-plugin state. Handlers only
//! query the engine; nothing here mutates it.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, ApiServerConfig, AppState};
