//! The abstract connection capability a session drives.
//!
//! A [`Transport`] knows how to open one authenticated connection for a
//! session key. The connection reports lifecycle events on the channel the
//! caller hands it and exposes sends through a [`TransportHandle`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// Opaque credential files for one session, keyed by file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialState {
    pub files: BTreeMap<String, Vec<u8>>,
}

impl CredentialState {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Identifier the transport assigned to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Events a live connection reports to its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is authenticated and ready to send.
    Open,
    /// The connection ended. `code` is the transport's status code, if any.
    Close { code: Option<u16> },
    /// The account is not paired yet; an operator must complete pairing.
    PairingChallenge { code: String },
    /// The transport rotated its credentials; persist them.
    CredentialsUpdated(CredentialState),
    Incoming { from: String, id: String },
    Receipt { id: String, status: String },
}

pub type EventSender = mpsc::Sender<TransportEvent>;

/// One open connection. Dropping it does not close it; call [`close`](Self::close).
#[async_trait]
pub trait TransportHandle: Send + Sync {
    async fn send(&self, address: &str, text: &str) -> Result<MessageId>;

    async fn logout(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Factory for connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs (`bridge`, `dry_run`, ...).
    fn name(&self) -> &str;

    /// Open a connection for `key`. Events are delivered on `events` until
    /// the connection closes; a `Close` event is always the last one sent.
    async fn connect(
        &self,
        key: &str,
        credentials: CredentialState,
        events: EventSender,
    ) -> Result<Arc<dyn TransportHandle>>;
}
