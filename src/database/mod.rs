//! Database Module
//!
//! Connection management and the ambient transaction scope shared by every
//! store.

pub mod connection;
pub mod transaction;

// Re-export commonly used types
pub use connection::{DatabaseConfig, DatabasePool};
pub use transaction::{DbConn, TransactionManager};
