//! HTTP surface: CLI gateway routes per backend plus the Anthropic- and
//! Google-compatible chat endpoints.

pub mod error;
pub mod gateway;
pub mod generate;
pub mod messages;
pub mod server;
pub mod sse;

pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
