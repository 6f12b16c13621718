//! Data Models Module
//!
//! Entity rows, request inputs and operation results used throughout the
//! auth core.

pub mod auth;
pub mod organization;
pub mod requests;
pub mod user;

// Re-export commonly used types
pub use auth::*;
pub use organization::Organization;
pub use requests::*;
pub use user::User;
