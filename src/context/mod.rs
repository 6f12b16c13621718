//! Ambient Request Context
//!
//! Per-request values made available to nested components without explicit
//! parameter passing.

pub mod session;

pub use session::{SessionContext, SessionIdentity};
