pub mod chat;
pub mod config;
pub mod errors;
pub mod exec;
pub mod ids;
pub mod security;
pub mod session;

pub use errors::GatewayError;
