//! HTTP API: the vector search endpoint and a health check.
pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{ApiServer, AppContext, router};
