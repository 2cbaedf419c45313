pub mod error;
pub mod file;
pub mod sessions;

pub use error::StoreError;
pub use sessions::SessionStore;
