//! Shared infrastructure for the LaborLedger service
//!
//! Configuration, error types, the TTL cache and SQLite storage used by
//! every ledger service.

pub mod cache;
pub mod config;
pub mod error;
pub mod storage;

// Re-export the common handles for convenience
pub use cache::TtlCache;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use storage::Storage;
