//! Herald gateway: HTTP control plane, CLI and transport implementations
//! around the session orchestrator in `hd-sessions`.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod state;
pub mod transport;
