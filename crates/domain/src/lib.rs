//! Shared domain types for Herald.
//!
//! Everything the session orchestrator and the gateway agree on lives here:
//! configuration, the error taxonomy, recipient normalization, session-key
//! validation and the abstract [`transport::Transport`] capability.

pub mod config;
pub mod error;
pub mod recipient;
pub mod session_key;
pub mod transport;

pub use error::{Error, Result};
