//! Session orchestration for Herald.
//!
//! A session is one authenticated transport connection plus the broadcast
//! loop that drives sends through it. The [`SessionRegistry`] owns every
//! session's lifetime; each session runs as two cooperating tasks: the
//! machine (connection lifecycle and reconnects) and the broadcast loop
//! (rate-limited sends).

pub mod broadcast;
pub mod credentials;
pub mod log_sink;
pub mod machine;
pub mod reconnect;
pub mod registry;
pub mod testing;

pub use broadcast::Pacing;
pub use credentials::CredentialStore;
pub use log_sink::{LogEntry, LogSink};
pub use reconnect::{ReconnectDecision, ReconnectPolicy};
pub use registry::{
    SessionConfig, SessionContext, SessionHandle, SessionRegistry, SessionState, SessionStatus,
};
